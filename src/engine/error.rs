use thiserror::Error;

/// Errors raised for invalid arguments to the engine's operations.
///
/// Everything that can go wrong while touching the filesystem is reported
/// through [`LinkResult`](crate::engine::LinkResult) instead.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid manifest path: {0}")]
    InvalidManifestPath(String),
}
