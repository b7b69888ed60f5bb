//! Provider error types.

use thiserror::Error;

/// Result type alias for provider operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors returned by [`crate::CloudApi`] implementations.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no {service} endpoint for region {region}")]
    EndpointNotFound { service: String, region: String },

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl CloudError {
    /// Whether the provider reported the target as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::Api { status: 404, .. })
    }
}
