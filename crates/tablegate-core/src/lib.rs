//! # Tablegate Core
//!
//! Core types, configuration, and time source for the tablegate request shield.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - The tier catalog and DDoS policy consumed by the shield
//! - Client identity and endpoint category types
//! - An injectable clock, with a manually driven clock for tests
//! - Localized client-facing messages

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod locale;
pub mod types;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use config::{
    Config, ConfigError, CountingMode, DdosPolicy, ShieldConfig, TierCatalog, TierPolicy,
};
pub use locale::Locale;
pub use types::{ClientKey, TierCategory};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, SharedClock, SystemClock};
    pub use crate::config::{Config, ShieldConfig};
    pub use crate::types::*;
}
