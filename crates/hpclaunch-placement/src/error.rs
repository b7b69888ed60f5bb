//! Placement error types.
//!
//! None of these escape the allocator loop: every error raised while
//! trying one region becomes a transient outcome for that region.

use thiserror::Error;

use hpclaunch_cloud::CloudError;
use hpclaunch_core::ResourceKind;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("{kind} {name} not found in region {region}")]
    NotFound {
        kind: ResourceKind,
        name: String,
        region: String,
    },

    #[error("failed to read cloud-init script {path}: {source}")]
    UserData {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("region {0} is not configured")]
    UnknownRegion(String),

    #[error("failed to create placement group in {region}: {source}")]
    GroupSetup {
        region: String,
        #[source]
        source: CloudError,
    },

    #[error("provider error: {0}")]
    Cloud(#[from] CloudError),
}
