//! Error taxonomy shared by the store, the REST client and the webhook path.
//!
//! Background failures (poll errors, malformed device payloads) are logged and
//! absorbed where they happen. Only user-initiated operations bubble these up
//! to the caller, which turns them into an error toast.

use thiserror::Error;

use crate::notification::NotificationType;

/// Failure talking to the notification / plugin backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, timeout, TLS failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Response body did not match the expected shape
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Transport failures and 5xx are worth retrying on the next tick
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status >= 500,
            BackendError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by `NotificationStore` operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("notification {0} not found")]
    NotFound(String),
    /// A shared (single-flight) refresh failed; the backend error is shared behind an Arc
    #[error("refresh failed: {0}")]
    Refresh(String),
    /// Persistence task was cancelled before completing
    #[error("notification task aborted: {0}")]
    Aborted(String),
}

/// A webhook body that cannot be mapped to any device reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedPayload {
    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),
    #[error("missing or invalid field '{field}' for {device_type}")]
    InvalidField {
        device_type: &'static str,
        field: &'static str,
    },
    #[error("invalid webhook envelope: {0}")]
    Envelope(String),
}

/// Startup validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no classifier registered for notification type '{0}'")]
    MissingClassifier(NotificationType),
    #[error("invalid config file {path}: {reason}")]
    InvalidFile { path: String, reason: String },
    #[error("invalid setting {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
