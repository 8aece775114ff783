use async_trait::async_trait;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::Client as IamClient;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tracing::{debug, warn};

use super::policy::{extract_roles, RoleSet};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{operation} failed: {message}")]
    Fetch {
        operation: &'static str,
        message: String,
    },
}

impl DiscoveryError {
    fn fetch<E: std::error::Error>(operation: &'static str, err: E) -> Self {
        Self::Fetch {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

/// Supplies the policy documents that apply to a user
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Every inline and attached policy document for `user`, including its groups
    async fn policy_documents(&self, user: &str) -> Result<Vec<String>, DiscoveryError>;
}

/// Merge the assumable roles across all of a user's policy documents.
///
/// Documents that fail to parse are skipped; fetch failures are returned.
pub async fn discover_roles(
    source: &dyn PolicySource,
    user: &str,
) -> Result<RoleSet, DiscoveryError> {
    let documents = source.policy_documents(user).await?;
    debug!("Inspecting {} policy documents for {}", documents.len(), user);

    let mut roles = RoleSet::new();
    for document in &documents {
        match extract_roles(Some(document)) {
            Ok(found) => roles.extend(found),
            Err(e) => warn!("Skipping policy document: {}", e),
        }
    }

    debug!("Found {} assumable roles for {}", roles.len(), user);
    Ok(roles)
}

/// IAM-backed policy source
pub struct IamPolicySource {
    client: IamClient,
}

impl IamPolicySource {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    async fn user_documents(&self, user: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut documents = Vec::new();

        let pages = self
            .client
            .list_user_policies()
            .user_name(user)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(|e| DiscoveryError::fetch("ListUserPolicies", e))?;
        for name in pages.iter().flat_map(|page| page.policy_names()) {
            let output = self
                .client
                .get_user_policy()
                .user_name(user)
                .policy_name(name)
                .send()
                .await
                .map_err(|e| DiscoveryError::fetch("GetUserPolicy", e))?;
            documents.push(decode_document(output.policy_document()));
        }

        let pages = self
            .client
            .list_attached_user_policies()
            .user_name(user)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(|e| DiscoveryError::fetch("ListAttachedUserPolicies", e))?;
        for arn in pages
            .iter()
            .flat_map(|page| page.attached_policies())
            .filter_map(|policy| policy.policy_arn())
        {
            if let Some(document) = self.managed_document(arn).await? {
                documents.push(document);
            }
        }

        Ok(documents)
    }

    async fn group_documents(&self, group: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut documents = Vec::new();

        let pages = self
            .client
            .list_group_policies()
            .group_name(group)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(|e| DiscoveryError::fetch("ListGroupPolicies", e))?;
        for name in pages.iter().flat_map(|page| page.policy_names()) {
            let output = self
                .client
                .get_group_policy()
                .group_name(group)
                .policy_name(name)
                .send()
                .await
                .map_err(|e| DiscoveryError::fetch("GetGroupPolicy", e))?;
            documents.push(decode_document(output.policy_document()));
        }

        let pages = self
            .client
            .list_attached_group_policies()
            .group_name(group)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(|e| DiscoveryError::fetch("ListAttachedGroupPolicies", e))?;
        for arn in pages
            .iter()
            .flat_map(|page| page.attached_policies())
            .filter_map(|policy| policy.policy_arn())
        {
            if let Some(document) = self.managed_document(arn).await? {
                documents.push(document);
            }
        }

        Ok(documents)
    }

    /// Default version of a managed policy
    async fn managed_document(&self, arn: &str) -> Result<Option<String>, DiscoveryError> {
        let policy = self
            .client
            .get_policy()
            .policy_arn(arn)
            .send()
            .await
            .map_err(|e| DiscoveryError::fetch("GetPolicy", e))?;

        let Some(version_id) = policy.policy().and_then(|p| p.default_version_id()) else {
            debug!("Policy {} has no default version", arn);
            return Ok(None);
        };

        let version = self
            .client
            .get_policy_version()
            .policy_arn(arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| DiscoveryError::fetch("GetPolicyVersion", e))?;

        Ok(version
            .policy_version()
            .and_then(|v| v.document())
            .map(decode_document))
    }
}

#[async_trait]
impl PolicySource for IamPolicySource {
    async fn policy_documents(&self, user: &str) -> Result<Vec<String>, DiscoveryError> {
        let mut documents = self.user_documents(user).await?;

        let pages = self
            .client
            .list_groups_for_user()
            .user_name(user)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .map_err(|e| DiscoveryError::fetch("ListGroupsForUser", e))?;
        for group in pages.iter().flat_map(|page| page.groups()) {
            documents.extend(self.group_documents(group.group_name()).await?);
        }

        Ok(documents)
    }
}

/// IAM returns policy documents URL-encoded
fn decode_document(document: &str) -> String {
    match percent_decode_str(document).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => document.to_string(),
    }
}
