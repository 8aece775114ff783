//! Fakes for the broker's collaborators

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::error::ProviderError;
use super::provider::{AssumeRoleRequest, IdentityProvider, SessionTokenRequest};
use crate::common::config::ProfileFile;
use crate::common::{ConfigError, ConfigResolver, Principal, RoleConfig, SessionCredential};

pub const PROFILES: &str = r#"
profiles:
  default: {}
  ops: {}
  mfa-source:
    mfa_serial: arn:aws:iam::123456789012:mfa/alice
  admin:
    role_arn: arn:aws:iam::123456789012:role/Admin
  readonly:
    role_arn: arn:aws:iam::123456789012:role/ReadOnly
  other:
    source_profile: ops
    role_arn: arn:aws:iam::123456789012:role/Other
  mfa:
    source_profile: mfa-source
    role_arn: arn:aws:iam::123456789012:role/Mfa
"#;

/// Resolver over an in-memory profile file
pub struct StaticConfigResolver {
    file: ProfileFile,
}

impl StaticConfigResolver {
    pub fn from_yaml(contents: &str) -> Self {
        Self {
            file: ProfileFile::from_yaml(contents).unwrap(),
        }
    }
}

#[async_trait]
impl ConfigResolver for StaticConfigResolver {
    async fn resolve(&self, profile: &str) -> Result<RoleConfig, ConfigError> {
        self.file.resolve(profile)
    }

    async fn list_profiles(&self, roles_only: bool) -> Vec<String> {
        self.file.profile_names(roles_only)
    }
}

/// Identity provider that counts calls and optionally demands an MFA code
#[derive(Default)]
pub struct FakeIdentityProvider {
    pub identity_calls: AtomicUsize,
    pub session_calls: AtomicUsize,
    pub assume_calls: AtomicUsize,
    mfa_code: Option<String>,
    session_failure: Mutex<Option<ProviderError>>,
    assume_failure: Mutex<Option<ProviderError>>,
    session_name: Mutex<Option<String>>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mfa_code(mut self, code: &str) -> Self {
        self.mfa_code = Some(code.to_string());
        self
    }

    pub fn fail_sessions(&self, err: ProviderError) {
        *self.session_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_assume_role(&self, err: ProviderError) {
        *self.assume_failure.lock().unwrap() = Some(err);
    }

    pub fn last_session_name(&self) -> Option<String> {
        self.session_name.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn caller_identity(&self, _source_profile: &str) -> Result<Principal, ProviderError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Principal::from_arn(
            "123456789012",
            "arn:aws:iam::123456789012:user/alice",
        ))
    }

    async fn session_token(
        &self,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredential, ProviderError> {
        let call = self.session_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(err) = self.session_failure.lock().unwrap().clone() {
            return Err(err);
        }

        if let Some(expected) = &self.mfa_code {
            let supplied = request.token_code.as_ref().map(|c| c.as_str());
            if supplied != Some(expected.as_str()) {
                return Err(ProviderError::new(
                    Some("AccessDenied"),
                    "MultiFactorAuthentication failed with invalid MFA one time pass code.",
                ));
            }
        }

        Ok(SessionCredential {
            access_key_id: format!("ASIASESSION{}", call),
            secret_access_key: "session-secret".to_string(),
            session_token: "session-token".to_string(),
            expiration: Utc::now() + Duration::hours(12),
        })
    }

    async fn assume_role(
        &self,
        _session: &SessionCredential,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError> {
        self.assume_calls.fetch_add(1, Ordering::SeqCst);
        *self.session_name.lock().unwrap() = Some(request.session_name.clone());

        if let Some(err) = self.assume_failure.lock().unwrap().clone() {
            return Err(err);
        }

        Ok(SessionCredential {
            access_key_id: "ASIAROLE".to_string(),
            secret_access_key: "role-secret".to_string(),
            session_token: "role-token".to_string(),
            expiration: Utc::now() + Duration::hours(1),
        })
    }
}
