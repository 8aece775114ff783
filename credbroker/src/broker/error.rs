use thiserror::Error;

use crate::common::ConfigError;

/// Provider error code returned when a request is not permitted
pub const ACCESS_DENIED_CODE: &str = "AccessDenied";
/// Message prefix the provider uses when a supplied MFA code is rejected
pub const MFA_FAILURE_PREFIX: &str = "MultiFactorAuthentication failed";

/// A failed call to the identity provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {message}", .code.as_deref().unwrap_or("Unknown"))]
pub struct ProviderError {
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Access denied because the MFA code was missing, stale or wrong
    pub fn is_mfa_failure(&self) -> bool {
        self.code.as_deref() == Some(ACCESS_DENIED_CODE)
            && self.message.starts_with(MFA_FAILURE_PREFIX)
    }
}

/// Outcomes of the credential broker state machine
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("No profile is active")]
    NoActiveProfile,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("MFA code required")]
    MfaRequired,

    #[error("Failed to resolve profile {profile}: {source}")]
    Resolve {
        profile: String,
        #[source]
        source: ConfigError,
    },

    #[error("Identity provider error: {source}")]
    Provider {
        #[from]
        source: ProviderError,
    },
}

impl BrokerError {
    /// Classify a provider failure, folding MFA rejections into `MfaRequired`
    pub fn from_provider(err: ProviderError) -> Self {
        if err.is_mfa_failure() {
            Self::MfaRequired
        } else {
            Self::Provider { source: err }
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
