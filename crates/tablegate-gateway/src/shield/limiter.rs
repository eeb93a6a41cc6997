//! Rate limiter orchestration.

use std::time::Duration;

use axum::http::{Request, header::USER_AGENT};
use chrono::{DateTime, TimeDelta, Utc};

use tablegate_core::{ClientKey, CountingMode, SharedClock, ShieldConfig, SystemClock, TierCategory};

use super::classifier::EndpointClassifier;
use super::client::ClientResolver;
use super::ddos::{DdosDetector, DdosVerdict};
use super::store::{BlockRecord, ClientStore, ShieldStats, SweepReport};
use super::{ShieldError, to_delta};
use crate::events::{SecurityEvent, SecurityEventBroadcaster};

/// The parts of a request the shield looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Resolved client identity.
    pub client: ClientKey,
    /// Request path.
    pub path: String,
    /// Client user agent, if sent.
    pub user_agent: Option<String>,
}

impl RequestInfo {
    /// Describe a request from a client.
    #[must_use]
    pub fn new(client: impl Into<ClientKey>, path: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            path: path.into(),
            user_agent: None,
        }
    }

    /// Attach a user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The tier window is exhausted.
    RateLimited,
    /// The client is under an active block.
    Blocked {
        /// Block reason.
        reason: String,
        /// Block expiry.
        until: DateTime<Utc>,
    },
}

/// Admission decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Tier the request was classified into.
    pub category: TierCategory,
    /// Tier limit.
    pub limit: u32,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// When the window (or block) releases.
    pub reset_time: DateTime<Utc>,
    /// Client-facing message on denial.
    pub message: Option<String>,
    /// Denial cause, `None` when allowed.
    pub denial: Option<Denial>,
}

impl Decision {
    /// Whole seconds from `now` until `reset_time`, rounded up.
    #[must_use]
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = (self.reset_time - now).num_milliseconds().max(0);
        u64::try_from(ms).unwrap_or(0).div_ceil(1000)
    }

    /// Whether the denial is an active block.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self.denial, Some(Denial::Blocked { .. }))
    }
}

/// Tiered sliding-window rate limiter with DDoS escalation.
///
/// Constructed once per process and shared as `Arc<RateLimiter>` with the
/// admission middleware, the admin API and the sweeper.
pub struct RateLimiter {
    config: ShieldConfig,
    clock: SharedClock,
    events: SecurityEventBroadcaster,
    store: ClientStore,
    classifier: EndpointClassifier,
    resolver: ClientResolver,
    ddos: DdosDetector,
    windows: [TimeDelta; 4],
}

impl RateLimiter {
    /// Create a rate limiter.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(
        config: ShieldConfig,
        clock: SharedClock,
        events: SecurityEventBroadcaster,
    ) -> Result<Self, ShieldError> {
        config
            .validate()
            .map_err(|e| ShieldError::InvalidPolicy(e.to_string()))?;

        let mut windows = [TimeDelta::zero(); 4];
        for (slot, category) in windows.iter_mut().zip(TierCategory::ALL) {
            *slot = to_delta(config.tiers.get(category).window())?;
        }

        let store = ClientStore::new(clock.clone(), events.clone(), config.retention())?;
        let ddos = DdosDetector::new(config.ddos.clone())?;
        let resolver = ClientResolver::new(config.client_headers.iter().cloned());

        Ok(Self {
            config,
            clock,
            events,
            store,
            classifier: EndpointClassifier::new(),
            resolver,
            ddos,
            windows,
        })
    }

    /// Create a rate limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn with_config(config: ShieldConfig) -> Result<Self, ShieldError> {
        Self::new(config, SystemClock::shared(), SecurityEventBroadcaster::new())
    }

    /// Extract the shield-relevant parts of an HTTP request.
    #[must_use]
    pub fn inspect<B>(&self, request: &Request<B>) -> RequestInfo {
        RequestInfo {
            client: self.resolver.resolve_request(request),
            path: request.uri().path().to_string(),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// Blocked clients are denied without charging their window. Otherwise the
    /// DDoS heuristic runs first (it may block outright), then the tier window.
    /// Only admitted requests are recorded.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault. Policy denials are `Ok`.
    pub fn check(&self, request: &RequestInfo) -> Result<Decision, ShieldError> {
        let now = self.clock.now();
        let key = &request.client;
        let category = self.classifier.classify(&request.path);
        let limit = self.config.tiers.get(category).max;

        if let Some(block) = self.store.block_info(key)? {
            tracing::debug!(client = %key, path = %request.path, "Request from blocked client");
            return Ok(self.blocked(category, limit, &block));
        }

        let window = self.window(category);
        let window_start = now
            .checked_sub_signed(window)
            .ok_or(ShieldError::TimeOverflow)?;
        let filter = match self.config.counting {
            CountingMode::Pooled => None,
            CountingMode::PerTier => Some(category),
        };
        let stats = self.store.window_stats(key, window_start, filter)?;

        if let DdosVerdict::Blocked { block, .. } = self.ddos.evaluate(&self.store, &self.events, key, now)? {
            return Ok(self.blocked(category, limit, &block));
        }

        let reset_from_now = now
            .checked_add_signed(window)
            .ok_or(ShieldError::TimeOverflow)?;
        let count = u32::try_from(stats.count).unwrap_or(u32::MAX);

        if count >= limit {
            self.events.emit(
                now,
                SecurityEvent::RateLimitExceeded {
                    client: key.to_string(),
                    category,
                    endpoint: request.path.clone(),
                    count: stats.count,
                    limit,
                },
            );
            return Ok(Decision {
                allowed: false,
                category,
                limit,
                remaining: 0,
                reset_time: reset_from_now,
                message: Some(self.config.tier_message(category).into_owned()),
                denial: Some(Denial::RateLimited),
            });
        }

        self.store.append(
            key,
            &request.path,
            category,
            request.user_agent.as_deref(),
        )?;

        let reset_time = match stats.oldest {
            Some(oldest) => oldest
                .checked_add_signed(window)
                .ok_or(ShieldError::TimeOverflow)?,
            None => reset_from_now,
        };

        Ok(Decision {
            allowed: true,
            category,
            limit,
            remaining: limit - count - 1,
            reset_time,
            message: None,
            denial: None,
        })
    }

    fn blocked(&self, category: TierCategory, limit: u32, block: &BlockRecord) -> Decision {
        Decision {
            allowed: false,
            category,
            limit,
            remaining: 0,
            reset_time: block.until,
            message: Some(self.config.locale.blocked_message(&block.reason, block.until)),
            denial: Some(Denial::Blocked {
                reason: block.reason.clone(),
                until: block.until,
            }),
        }
    }

    fn window(&self, category: TierCategory) -> TimeDelta {
        let index = match category {
            TierCategory::General => 0,
            TierCategory::Availability => 1,
            TierCategory::Booking => 2,
            TierCategory::Quote => 3,
        };
        self.windows[index]
    }

    /// Block an address manually.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault.
    pub fn block_ip(
        &self,
        ip: &str,
        reason: &str,
        duration: Duration,
    ) -> Result<BlockRecord, ShieldError> {
        self.store.block(&ClientKey::new(ip), reason, duration)
    }

    /// Lift a block. Returns whether an active block was lifted.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault.
    pub fn unblock_ip(&self, ip: &str) -> Result<bool, ShieldError> {
        self.store.unblock(&ClientKey::new(ip))
    }

    /// Forget all clients and blocks. Returns how many clients were dropped.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault.
    pub fn clear_all(&self) -> Result<usize, ShieldError> {
        let cleared = self.store.clear_all()?;
        tracing::info!(cleared, "Shield state cleared");
        Ok(cleared)
    }

    /// Monitoring snapshot.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault.
    pub fn get_stats(&self) -> Result<ShieldStats, ShieldError> {
        self.store.stats()
    }

    /// Run one sweep of the client store.
    ///
    /// # Errors
    ///
    /// Returns error on an internal fault.
    pub fn sweep(&self) -> Result<SweepReport, ShieldError> {
        self.store.sweep()
    }

    /// The shield configuration.
    #[must_use]
    pub const fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// The client store.
    #[must_use]
    pub const fn store(&self) -> &ClientStore {
        &self.store
    }

    /// The security event broadcaster.
    #[must_use]
    pub const fn events(&self) -> &SecurityEventBroadcaster {
        &self.events
    }

    /// Current time on the shield's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.config.enabled)
            .field("counting", &self.config.counting)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
