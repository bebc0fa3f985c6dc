//! Blinc Sentinel
//!
//! A thin component over [`blinc_observer`]: attach it to an element and it
//! emits `enter`/`exit` events as the element scrolls into and out of view.
//!
//! - [`SentinelProps`] / [`SentinelConfig`] - serde-backed component
//!   properties, parsed from the host's attribute payload
//! - [`Sentinel`] - the component itself, sharing monitors through an
//!   injected [`ObserverRegistry`](blinc_observer::ObserverRegistry)
//! - [`RegistrationTable`] - per-element record of the options used, keyed
//!   by generation-checked node handles

mod config;
mod error;
mod registration;
mod sentinel;

pub use config::{
    ContainerAttributes, SentinelConfig, SentinelProps, ThresholdSetting, ViewportTolerance,
    SENTINEL_CLASS,
};
pub use error::{Result, SentinelError};
pub use registration::{Registration, RegistrationTable};
pub use sentinel::{Sentinel, SentinelEvent, SentinelListener};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{SentinelConfig, SentinelProps};
    pub use crate::error::{Result, SentinelError};
    pub use crate::sentinel::{Sentinel, SentinelEvent};
    pub use blinc_observer::{
        IntersectionEntry, NodeId, ObserverOptions, ObserverRegistry, RootMargin, Threshold,
    };
}
