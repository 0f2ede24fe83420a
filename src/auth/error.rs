use serde_json::Value;
use thiserror::Error;

/// Errors raised while persisting or acquiring tokens.
///
/// `PersistenceUnavailable`, `DeviceFlowInitiationFailed` and
/// `TokenAcquisitionFailed` are terminal for the calling operation; none of
/// them tells a transient network failure apart from a permanent rejection.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Encrypted token persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    #[error("Failed to create device flow: {payload}")]
    DeviceFlowInitiationFailed { payload: Value },
    #[error("Failed to acquire token: {payload}")]
    TokenAcquisitionFailed { payload: Value },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Provider diagnostic payload attached to the error, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::DeviceFlowInitiationFailed { payload }
            | Self::TokenAcquisitionFailed { payload } => Some(payload),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
