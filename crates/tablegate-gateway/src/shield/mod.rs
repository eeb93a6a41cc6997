//! Request shield: tiered sliding-window rate limiting with DDoS escalation.
//!
//! This module provides:
//! - Endpoint classification into tier categories
//! - Client identity resolution from proxy headers
//! - The per-client request history store with background sweeping
//! - A coarse count-based DDoS heuristic
//! - The rate limiter that ties them together into an admission decision

pub mod classifier;
pub mod client;
pub mod ddos;
pub mod limiter;
pub mod store;
pub mod sweeper;

pub use classifier::EndpointClassifier;
pub use client::ClientResolver;
pub use ddos::{DDOS_BLOCK_REASON, DdosDetector, DdosVerdict};
pub use limiter::{Decision, Denial, RateLimiter, RequestInfo};
pub use store::{
    BlockRecord, ClientEntry, ClientStore, RequestRecord, ShieldStats, SweepReport, WindowStats,
};
pub use sweeper::spawn_sweeper;

use std::sync::PoisonError;
use std::time::Duration;

use thiserror::Error;

/// Internal shield faults.
///
/// Policy denials are not errors; they are returned as a [`Decision`].
#[derive(Debug, Error)]
pub enum ShieldError {
    /// A thread panicked while holding the client store lock.
    #[error("Client store lock poisoned")]
    StorePoisoned,

    /// A configured duration does not fit the time arithmetic.
    #[error("Duration out of range: {0:?}")]
    DurationOutOfRange(Duration),

    /// Window arithmetic overflowed the representable time range.
    #[error("Time arithmetic overflow")]
    TimeOverflow,

    /// The shield configuration is invalid.
    #[error("Invalid shield policy: {0}")]
    InvalidPolicy(String),
}

impl<T> From<PoisonError<T>> for ShieldError {
    fn from(_: PoisonError<T>) -> Self {
        Self::StorePoisoned
    }
}

/// Convert a configured duration into a signed time delta.
pub(crate) fn to_delta(duration: Duration) -> Result<chrono::TimeDelta, ShieldError> {
    chrono::TimeDelta::from_std(duration).map_err(|_| ShieldError::DurationOutOfRange(duration))
}
