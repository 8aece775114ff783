use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Resolved identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// AWS account ID
    pub account_id: String,

    /// User or role ARN
    pub arn: String,

    /// Display name, used as the role session name
    pub user_name: String,
}

impl Principal {
    /// Build a principal from a caller ARN, taking the last path segment as the display name
    pub fn from_arn(account_id: impl Into<String>, arn: impl Into<String>) -> Self {
        let arn = arn.into();
        let user_name = arn
            .rsplit(&['/', ':'][..])
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            account_id: account_id.into(),
            arn,
            user_name,
        }
    }
}

/// Role configuration produced by the profile resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    /// Name of the profile holding the long-lived credentials
    pub source_profile: String,

    /// ARN of the role to assume
    pub role_arn: String,

    /// Serial number (or ARN) of the MFA device, if the source profile requires one
    pub mfa_serial: Option<String>,

    /// External ID passed when assuming the role
    pub external_id: Option<String>,

    /// Requested lifetime of the session token
    pub session_duration: std::time::Duration,
}

/// Base credentials obtained from GetSessionToken, cached on disk
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl SessionCredential {
    /// True if the credential expires before `now + window`
    pub fn expires_within(&self, window: Duration) -> bool {
        Utc::now() + window >= self.expiration
    }
}

// Keep secrets out of debug logs
impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Temporary credentials for the assumed role, handed out once per request
#[derive(Clone)]
pub struct RoleCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub last_updated: DateTime<Utc>,
    /// Reported expiration, clamped rather than the provider's real value
    pub expiration: DateTime<Utc>,
}

impl std::fmt::Debug for RoleCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleCredential")
            .field("access_key_id", &self.access_key_id)
            .field("last_updated", &self.last_updated)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Instance role credential document, in the shape SDKs expect from the metadata service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataCredentials {
    pub code: String,
    pub last_updated: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub token: String,
    pub expiration: String,
}

impl From<RoleCredential> for MetadataCredentials {
    fn from(cred: RoleCredential) -> Self {
        Self {
            code: "Success".to_string(),
            last_updated: cred.last_updated.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            kind: "AWS-HMAC".to_string(),
            access_key_id: cred.access_key_id,
            secret_access_key: cred.secret_access_key,
            token: cred.session_token,
            expiration: cred.expiration.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}
