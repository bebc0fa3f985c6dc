//! Observer error types

use thiserror::Error;

use crate::dom::NodeId;

/// Errors raised by the visibility monitor capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The host has no visibility monitor (or it failed to start)
    #[error("Visibility monitor not available: {0}")]
    Unavailable(String),

    /// The monitor refused the requested root/margin/threshold
    #[error("Visibility monitor rejected configuration: {0}")]
    Rejected(String),
}

/// Errors returned by [`ObserverRegistry`](crate::ObserverRegistry) operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObserverError {
    /// The element handle is stale or was never attached to the document
    #[error("Element {0:?} is not attached to the document")]
    InvalidElement(NodeId),

    /// An explicit root node is not attached to the document
    #[error("Root node {0:?} is not attached to the document")]
    InvalidRoot(NodeId),

    /// A root margin offset is NaN or infinite
    #[error("Root margin offsets must be finite, got {0}")]
    InvalidMargin(String),

    /// A threshold ratio is NaN or outside `[0, 1]`
    #[error("Threshold {0} is outside the range [0, 1]")]
    InvalidThreshold(f64),

    /// The element is already observed under the same identity
    #[error("Element {0:?} is already observed with these options")]
    AlreadyObserved(NodeId),

    /// Creating the shared monitor failed; no registration was made
    #[error("Failed to create visibility monitor: {0}")]
    MonitorUnavailable(#[from] MonitorError),
}

/// Result type for observer operations
pub type ObserverResult<T> = std::result::Result<T, ObserverError>;
