use anyhow::{Context, Result};
use aws_sdk_sts::Client as StsClient;
use tracing::info;

use crate::broker::provider::load_sdk_config;
use crate::commands::RolesCommand;
use crate::common::Principal;
use iam::IamPolicySource;

pub mod iam;
pub mod policy;

pub use iam::discover_roles;
pub use policy::RoleSet;

/// Print every role the caller's IAM policies allow it to assume
pub async fn run(args: RolesCommand) -> Result<()> {
    let config = load_sdk_config(&args.profile).await;

    let user = match args.user {
        Some(user) => user,
        None => {
            let identity = StsClient::new(&config)
                .get_caller_identity()
                .send()
                .await
                .context("Failed to resolve caller identity")?;
            let principal = Principal::from_arn(
                identity.account().unwrap_or_default(),
                identity.arn().unwrap_or_default(),
            );
            info!("Resolved caller {} ({})", principal.user_name, principal.arn);
            principal.user_name
        }
    };

    let source = IamPolicySource::new(aws_sdk_iam::Client::new(&config));
    let roles = discover_roles(&source, &user)
        .await
        .with_context(|| format!("Failed to discover roles for {}", user))?;

    if roles.is_empty() {
        info!("No assumable roles found for {}", user);
    }
    for role in roles.iter() {
        println!("{}", role);
    }

    Ok(())
}
