use hyper::StatusCode;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::broker::BrokerError;

/// Category of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedRequest,
    NotFound,
    InvalidMfaCode,
    MfaRequired,
    NoActiveProfile,
    ResolveProfile,
    Provider,
    Serialization,
}

/// Error returned by a handler: a short public message plus the HTTP status.
/// `detail` is logged but never sent to the client.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub message: &'static str,
    pub status: StatusCode,
    detail: Option<String>,
}

impl HandlerError {
    pub fn new(kind: ErrorKind, message: &'static str, status: StatusCode) -> Self {
        Self {
            kind,
            message,
            status,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "Not Found", StatusCode::NOT_FOUND)
    }

    pub fn read_failed(err: hyper::Error) -> Self {
        Self::new(
            ErrorKind::MalformedRequest,
            "Error reading request data",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(err)
    }

    pub fn serialization(message: &'static str, err: serde_json::Error) -> Self {
        Self::new(
            ErrorKind::Serialization,
            message,
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(err)
    }

    /// Failure while selecting a profile or establishing its session
    pub fn session(err: BrokerError) -> Self {
        match err {
            BrokerError::InvalidMfaCode => Self::new(
                ErrorKind::InvalidMfaCode,
                "Invalid MFA Code",
                StatusCode::UNAUTHORIZED,
            ),
            BrokerError::MfaRequired => Self::new(
                ErrorKind::MfaRequired,
                "MFA code required",
                StatusCode::UNAUTHORIZED,
            ),
            BrokerError::NoActiveProfile => Self::new(
                ErrorKind::NoActiveProfile,
                "No active profile",
                StatusCode::BAD_REQUEST,
            ),
            BrokerError::Resolve { .. } => Self::new(
                ErrorKind::ResolveProfile,
                "Error resolving profile config",
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .with_detail(err),
            BrokerError::Provider { .. } => Self::new(
                ErrorKind::Provider,
                "Error getting session credentials",
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .with_detail(err),
        }
    }

    /// Any failure while deriving role credentials is a server error
    pub fn role_credentials(err: BrokerError) -> Self {
        let kind = match err {
            BrokerError::MfaRequired => ErrorKind::MfaRequired,
            BrokerError::NoActiveProfile => ErrorKind::NoActiveProfile,
            _ => ErrorKind::Provider,
        };
        Self::new(
            kind,
            "Error getting role credentials",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_detail(err)
    }

    pub fn log(&self) {
        let detail = self.detail.as_deref().unwrap_or(self.message);
        match self.kind {
            ErrorKind::MfaRequired | ErrorKind::InvalidMfaCode | ErrorKind::NotFound => {
                debug!("{}", detail)
            }
            ErrorKind::NoActiveProfile => warn!("{}", detail),
            _ => error!("{}", detail),
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
