use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileRegionProvider;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::debug;

use super::error::ProviderError;
use super::mfa::MfaCode;
use crate::common::{Principal, SessionCredential};

/// Lifetime requested for assumed role credentials
pub const ASSUME_ROLE_DEFAULT_DURATION: Duration = Duration::from_secs(60 * 60);
/// Shortest lifetime the provider issues for assumed role credentials
pub const ASSUME_ROLE_MIN_DURATION: Duration = Duration::from_secs(15 * 60);

const ROLE_SESSION_NAME_MAX_LEN: usize = 64;
const FALLBACK_REGION: &str = "us-east-1";

/// GetSessionToken parameters
#[derive(Debug, Clone)]
pub struct SessionTokenRequest {
    pub source_profile: String,
    pub duration: Duration,
    pub mfa_serial: Option<String>,
    pub token_code: Option<MfaCode>,
}

/// AssumeRole parameters
#[derive(Debug, Clone)]
pub struct AssumeRoleRequest {
    pub source_profile: String,
    pub role_arn: String,
    pub external_id: Option<String>,
    pub session_name: String,
    pub duration: Duration,
}

/// Client for the cloud provider's identity service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identify the caller behind a source profile's long-lived credentials
    async fn caller_identity(&self, source_profile: &str) -> Result<Principal, ProviderError>;

    /// Exchange a source profile's long-lived credentials for a session token
    async fn session_token(
        &self,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredential, ProviderError>;

    /// Assume a role using a session credential. The returned credential
    /// carries the provider's real expiration.
    async fn assume_role(
        &self,
        session: &SessionCredential,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError>;
}

/// STS-backed identity provider using the SDK's shared config per source profile
#[derive(Clone, Default)]
pub struct StsIdentityProvider {
    configs: Arc<RwLock<HashMap<String, SdkConfig>>>,
}

impl StsIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sdk_config(&self, profile: &str) -> SdkConfig {
        {
            let configs = self.configs.read().await;
            if let Some(config) = configs.get(profile) {
                return config.clone();
            }
        }

        debug!("Loading SDK config for profile {}", profile);
        let config = load_sdk_config(profile).await;

        let mut configs = self.configs.write().await;
        configs.insert(profile.to_string(), config.clone());
        config
    }
}

#[async_trait]
impl IdentityProvider for StsIdentityProvider {
    async fn caller_identity(&self, source_profile: &str) -> Result<Principal, ProviderError> {
        let config = self.sdk_config(source_profile).await;
        let output = StsClient::new(&config)
            .get_caller_identity()
            .send()
            .await
            .map_err(provider_error)?;

        Ok(Principal::from_arn(
            output.account().unwrap_or_default(),
            output.arn().unwrap_or_default(),
        ))
    }

    async fn session_token(
        &self,
        request: &SessionTokenRequest,
    ) -> Result<SessionCredential, ProviderError> {
        let config = self.sdk_config(&request.source_profile).await;
        let output = StsClient::new(&config)
            .get_session_token()
            .duration_seconds(duration_seconds(request.duration))
            .set_serial_number(request.mfa_serial.clone())
            .set_token_code(request.token_code.as_ref().map(|c| c.as_str().to_string()))
            .send()
            .await
            .map_err(provider_error)?;

        let credentials = output
            .credentials()
            .ok_or_else(|| ProviderError::new(None, "GetSessionToken returned no credentials"))?;
        convert_credentials(credentials)
    }

    async fn assume_role(
        &self,
        session: &SessionCredential,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError> {
        let base = self.sdk_config(&request.source_profile).await;
        let session_credentials = aws_credential_types::Credentials::new(
            session.access_key_id.clone(),
            session.secret_access_key.clone(),
            Some(session.session_token.clone()),
            Some(SystemTime::from(session.expiration)),
            "credbroker-session",
        );
        let config = aws_sdk_sts::config::Builder::from(&base)
            .credentials_provider(session_credentials)
            .build();

        let output = StsClient::from_conf(config)
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(duration_seconds(request.duration))
            .set_external_id(request.external_id.clone())
            .send()
            .await
            .map_err(provider_error)?;

        let credentials = output
            .credentials()
            .ok_or_else(|| ProviderError::new(None, "AssumeRole returned no credentials"))?;
        convert_credentials(credentials)
    }
}

/// Shared SDK config for a named profile. The region comes from the profile,
/// then the default chain, then `us-east-1`.
pub async fn load_sdk_config(profile: &str) -> SdkConfig {
    let region = RegionProviderChain::first_try(
        ProfileFileRegionProvider::builder()
            .profile_name(profile)
            .build(),
    )
    .or_default_provider()
    .or_else(FALLBACK_REGION);

    aws_config::defaults(BehaviorVersion::latest())
        .profile_name(profile)
        .region(region)
        .load()
        .await
}

/// Role session names are limited to `[\w+=,.@-]{2,64}`
pub fn role_session_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| Regex::new(r"[^\w+=,.@-]").expect("static pattern is valid"));

    let mut sanitized: String = re
        .replace_all(name, "-")
        .chars()
        .take(ROLE_SESSION_NAME_MAX_LEN)
        .collect();
    if sanitized.len() < 2 {
        sanitized = "credbroker".to_string();
    }
    sanitized
}

fn duration_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn provider_error<E>(err: E) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    ProviderError { code, message }
}

fn convert_credentials(
    credentials: &aws_sdk_sts::types::Credentials,
) -> Result<SessionCredential, ProviderError> {
    let expiration = credentials.expiration();
    let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .ok_or_else(|| ProviderError::new(None, "Credential expiration out of range"))?;

    Ok(SessionCredential {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiration,
    })
}
