//! Sentinel error types

use blinc_observer::ObserverError;
use thiserror::Error;

/// Sentinel-related errors
#[derive(Error, Debug)]
pub enum SentinelError {
    /// The `configOptions` payload could not be parsed
    #[error("Invalid sentinel config: {0}")]
    Config(#[from] serde_json::Error),

    /// Registering the target with the observer registry failed
    #[error("Failed to observe sentinel target: {0}")]
    Observer(#[from] ObserverError),
}

/// Result type for sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;
