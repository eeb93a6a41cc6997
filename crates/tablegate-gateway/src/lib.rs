//! # Tablegate Gateway
//!
//! HTTP gateway with a request shield in front of the application routes.
//!
//! The shield classifies each request into a tier, counts the client's recent
//! requests in a sliding window, escalates sustained floods into temporary
//! blocks, and answers denied requests with 429 or 403 before they reach a
//! handler.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Operator endpoints under `/admin/shield`.
pub mod admin;
/// Security events.
pub mod events;
/// Admission middleware.
pub mod middleware;
mod server;
/// Rate limiting and DDoS protection.
pub mod shield;

pub use admin::{AdminError, admin_router};
pub use events::{SecurityEvent, SecurityEventBroadcaster, SecurityEventEnvelope};
pub use middleware::{Rejection, admission};
pub use server::{Gateway, GatewayBuilder, GatewayConfig};
pub use shield::{Decision, Denial, RateLimiter, RequestInfo, ShieldError, ShieldStats};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Shield setup error.
    #[error("Shield error: {0}")]
    Shield(#[from] ShieldError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
