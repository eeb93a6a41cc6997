//! Count-based DDoS heuristic.
//!
//! Looks at a wider window of the same per-client history the tier limits use.
//! Purely volumetric: it never inspects payloads, and it accepts false positives
//! under legitimate bursts in exchange for simplicity.

use chrono::{DateTime, TimeDelta, Utc};

use tablegate_core::{ClientKey, DdosPolicy};

use super::store::{BlockRecord, ClientStore};
use super::{ShieldError, to_delta};
use crate::events::{SecurityEvent, SecurityEventBroadcaster};

/// Block reason recorded when the heuristic blocks a client.
pub const DDOS_BLOCK_REASON: &str = "DDoS attack detected";

/// Outcome of a DDoS assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdosVerdict {
    /// Volume is within normal bounds.
    Normal,
    /// Volume crossed the suspicious threshold. Monitoring only.
    Suspicious {
        /// Requests observed in the window.
        count: usize,
    },
    /// Volume crossed the block threshold and the client was blocked.
    Blocked {
        /// Requests observed in the window.
        count: usize,
        /// The block that was placed.
        block: BlockRecord,
    },
}

/// Applies a [`DdosPolicy`] to client history.
#[derive(Debug, Clone)]
pub struct DdosDetector {
    policy: DdosPolicy,
    window: TimeDelta,
}

impl DdosDetector {
    /// Create a detector for a policy.
    ///
    /// # Errors
    ///
    /// Returns error if the policy window does not fit the time arithmetic.
    pub fn new(policy: DdosPolicy) -> Result<Self, ShieldError> {
        let window = to_delta(policy.window())?;
        Ok(Self { policy, window })
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> &DdosPolicy {
        &self.policy
    }

    /// Classify an observed request count.
    #[must_use]
    pub fn threshold_for(&self, count: usize) -> Threshold {
        if count >= self.policy.block_threshold as usize {
            Threshold::Block
        } else if count >= self.policy.suspicious_threshold as usize {
            Threshold::Suspicious
        } else {
            Threshold::Normal
        }
    }

    /// Evaluate a client at `now`, counting the in-flight request.
    ///
    /// Requests admitted before the client's last block was released are not
    /// counted, so a released client starts from a clean slate.
    ///
    /// Emits a suspicious-activity event past the first threshold. Past the
    /// second, blocks the client for the policy's block duration and emits a
    /// DDoS event.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the window arithmetic overflows.
    pub fn evaluate(
        &self,
        store: &ClientStore,
        events: &SecurityEventBroadcaster,
        key: &ClientKey,
        now: DateTime<Utc>,
    ) -> Result<DdosVerdict, ShieldError> {
        let since = now
            .checked_sub_signed(self.window)
            .ok_or(ShieldError::TimeOverflow)?;
        let count = store.activity_since(key, since)?.count + 1;

        match self.threshold_for(count) {
            Threshold::Normal => Ok(DdosVerdict::Normal),
            Threshold::Suspicious => {
                events.emit(
                    now,
                    SecurityEvent::SuspiciousActivity {
                        client: key.to_string(),
                        count,
                        window_secs: self.policy.window().as_secs(),
                    },
                );
                Ok(DdosVerdict::Suspicious { count })
            }
            Threshold::Block => {
                let block = store.block(key, DDOS_BLOCK_REASON, self.policy.block_duration())?;
                events.emit(
                    now,
                    SecurityEvent::DdosDetected {
                        client: key.to_string(),
                        count,
                        blocked: true,
                    },
                );
                Ok(DdosVerdict::Blocked { count, block })
            }
        }
    }
}

/// Which threshold a count falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Below both thresholds.
    Normal,
    /// At or above the suspicious threshold.
    Suspicious,
    /// At or above the block threshold.
    Block,
}
