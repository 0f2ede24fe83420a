//! Top-level error type for sync runs.

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::upload::UploadError;

/// Any failure that aborts a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Remote sync error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Upload requested without a token provider")]
    NoTokenProvider,
}

/// Result alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
