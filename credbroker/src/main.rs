use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::str::FromStr;
use tracing::{info, Level};

mod broker;
mod commands;
mod common;
mod discovery;
mod server;

use commands::{RolesCommand, ServeCommand};

#[derive(Parser)]
#[command(
    name = "credbroker",
    about = "Credential Broker - EC2 metadata service for local AWS role credentials",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve role credentials on the EC2 metadata address
    Serve(ServeCommand),
    /// List the roles the caller may assume, according to its IAM policies
    Roles(RolesCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { &cli.log_level };
    let level = Level::from_str(log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Serve(serve_cmd) => {
            print_banner();
            info!("Starting Credential Broker metadata service");
            server::run(serve_cmd).await?;
        }
        Commands::Roles(roles_cmd) => {
            discovery::run(roles_cmd).await?;
        }
    }

    Ok(())
}

fn print_banner() {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout);
    let _ = writeln!(stdout, "🔑 Credential Broker");
    let _ = writeln!(stdout);
    let _ = stdout.flush();
}
