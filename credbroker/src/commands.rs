use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::server::EC2_METADATA_IP;

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    /// Profile to activate at startup
    #[arg(short, long, env = "CREDBROKER_PROFILE")]
    pub profile: Option<String>,

    /// Directory for cached session credentials (defaults to the user cache dir)
    #[arg(long, env = "CREDBROKER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Do not cache session credentials on disk
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// Path to the named-profile file
    #[arg(short, long, env = "CREDBROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to serve the metadata protocol on
    #[arg(long, default_value_t = EC2_METADATA_IP)]
    pub bind_address: Ipv4Addr,

    /// Port to serve the metadata protocol on
    #[arg(long, default_value = "80")]
    pub port: u16,

    /// Assume the bind address is already configured; skip alias and privilege handling
    #[arg(long, env = "CREDBROKER_SKIP_NETWORK_SETUP")]
    pub skip_network_setup: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RolesCommand {
    /// AWS profile whose identity is used to read IAM policies
    #[arg(short, long, env = "AWS_PROFILE", default_value = "default")]
    pub profile: String,

    /// IAM user to inspect (defaults to the caller's own user name)
    #[arg(short, long)]
    pub user: Option<String>,
}
