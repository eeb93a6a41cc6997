//! Security events raised by the request shield.
//!
//! Every event is logged through `tracing` and broadcast to subscribers, so an
//! external security log or dashboard can follow the shield in real time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tablegate_core::TierCategory;

/// Security events emitted by the shield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// A client exceeded its tier window.
    RateLimitExceeded {
        /// Client key.
        client: String,
        /// Tier of the denied request.
        category: TierCategory,
        /// Path of the denied request.
        endpoint: String,
        /// Requests counted in the window.
        count: usize,
        /// Tier limit.
        limit: u32,
    },

    /// A client's request volume crossed the suspicious threshold.
    SuspiciousActivity {
        /// Client key.
        client: String,
        /// Requests counted in the DDoS window.
        count: usize,
        /// DDoS window length in seconds.
        window_secs: u64,
    },

    /// A client's request volume crossed the block threshold.
    DdosDetected {
        /// Client key.
        client: String,
        /// Requests counted in the DDoS window.
        count: usize,
        /// Whether the client was blocked as a result.
        blocked: bool,
    },

    /// A client was blocked.
    ClientBlocked {
        /// Client key.
        client: String,
        /// Block reason.
        reason: String,
        /// Block expiry.
        until: DateTime<Utc>,
    },

    /// A block was lifted by an operator.
    ClientUnblocked {
        /// Client key.
        client: String,
    },
}

impl SecurityEvent {
    /// Short event name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::SuspiciousActivity { .. } => "suspicious_activity",
            Self::DdosDetected { .. } => "ddos_detected",
            Self::ClientBlocked { .. } => "client_blocked",
            Self::ClientUnblocked { .. } => "client_unblocked",
        }
    }

    fn log(&self) {
        match self {
            Self::RateLimitExceeded {
                client,
                category,
                endpoint,
                count,
                limit,
            } => tracing::warn!(
                event = self.kind(),
                %client,
                %category,
                %endpoint,
                count,
                limit,
                "Rate limit exceeded"
            ),
            Self::SuspiciousActivity {
                client,
                count,
                window_secs,
            } => tracing::warn!(
                event = self.kind(),
                %client,
                count,
                window_secs,
                "Suspicious request volume"
            ),
            Self::DdosDetected {
                client,
                count,
                blocked,
            } => tracing::warn!(event = self.kind(), %client, count, blocked, "DDoS detected"),
            Self::ClientBlocked {
                client,
                reason,
                until,
            } => tracing::warn!(
                event = self.kind(),
                %client,
                %reason,
                until = %until.to_rfc3339(),
                "Client blocked"
            ),
            Self::ClientUnblocked { client } => {
                tracing::info!(event = self.kind(), %client, "Client unblocked");
            }
        }
    }
}

/// A security event with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEventEnvelope {
    /// Event ID.
    pub id: String,
    /// When the shield observed the event.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: SecurityEvent,
}

impl SecurityEventEnvelope {
    /// Create a new event envelope.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, event: SecurityEvent) -> Self {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 8];
        rng.fill_bytes(&mut bytes);

        Self {
            id: hex::encode(bytes),
            timestamp,
            event,
        }
    }
}

/// Default channel capacity for event broadcasts.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcaster for security events.
#[derive(Clone)]
pub struct SecurityEventBroadcaster {
    sender: broadcast::Sender<SecurityEventEnvelope>,
}

impl SecurityEventBroadcaster {
    /// Create a new event broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event broadcaster with custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Log an event and broadcast it to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, timestamp: DateTime<Utc>, event: SecurityEvent) -> usize {
        event.log();
        // No subscribers is not an error
        self.sender
            .send(SecurityEventEnvelope::new(timestamp, event))
            .unwrap_or(0)
    }

    /// Subscribe to receive events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SecurityEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecurityEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityEventBroadcaster")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
