//! Per-client request history and block records.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use tablegate_core::{ClientKey, SharedClock, TierCategory};

use super::{ShieldError, to_delta};
use crate::events::{SecurityEvent, SecurityEventBroadcaster};

/// Window used for the `recentRequests` figure in [`ShieldStats`].
const STATS_RECENT_WINDOW: Duration = Duration::from_secs(60);

/// One admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// When the request was admitted.
    pub timestamp: DateTime<Utc>,
    /// Request path.
    pub endpoint: String,
    /// Tier the request was classified into.
    pub category: TierCategory,
    /// Client user agent, if sent.
    pub user_agent: Option<String>,
}

/// An active or expired block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block expiry.
    pub until: DateTime<Utc>,
    /// Why the client was blocked.
    pub reason: String,
}

impl BlockRecord {
    /// Whether the block is still in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }
}

/// Everything the store knows about one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEntry {
    /// Admitted requests, oldest first.
    pub requests: VecDeque<RequestRecord>,
    /// Current block, if any.
    pub block: Option<BlockRecord>,
    /// Release time of the most recent block. Requests admitted before it are
    /// left out of [`ClientStore::activity_since`].
    pub released_at: Option<DateTime<Utc>>,
}

impl ClientEntry {
    fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.block.is_none()
    }

    /// Drop the block if it has expired. Returns whether one was dropped.
    fn clear_expired_block(&mut self, now: DateTime<Utc>) -> bool {
        if self.block.as_ref().is_some_and(|b| !b.is_active(now)) {
            self.block = None;
            true
        } else {
            false
        }
    }

    fn window_stats(&self, since: DateTime<Utc>, category: Option<TierCategory>) -> WindowStats {
        let mut stats = WindowStats::default();
        for record in self.requests.iter().rev().take_while(|r| r.timestamp > since) {
            if category.is_none_or(|c| record.category == c) {
                stats.count += 1;
                stats.oldest = Some(record.timestamp);
            }
        }
        stats
    }

    fn activity_since(&self, since: DateTime<Utc>) -> WindowStats {
        let mut stats = WindowStats::default();
        for record in self.requests.iter().rev().take_while(|r| r.timestamp > since) {
            if self.released_at.is_some_and(|released| record.timestamp < released) {
                break;
            }
            stats.count += 1;
            stats.oldest = Some(record.timestamp);
        }
        stats
    }
}

/// Requests counted within a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    /// Number of requests strictly after the window start.
    pub count: usize,
    /// Timestamp of the oldest counted request.
    pub oldest: Option<DateTime<Utc>>,
}

/// Monitoring snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldStats {
    /// Clients with an entry in the store.
    #[serde(rename = "totalTrackedIPs")]
    pub total_tracked_ips: usize,
    /// Clients under an active block.
    #[serde(rename = "blockedIPs")]
    pub blocked_ips: usize,
    /// Requests admitted across all clients in the last minute.
    #[serde(rename = "recentRequests")]
    pub recent_requests: usize,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Request records dropped for being older than the retention horizon.
    pub pruned_records: usize,
    /// Expired blocks dropped.
    pub expired_blocks: usize,
    /// Entries removed because nothing was left in them.
    pub removed_clients: usize,
}

/// In-memory store of client history.
///
/// All operations take one coarse lock. Critical sections are short and never
/// span an `.await`.
pub struct ClientStore {
    clock: SharedClock,
    events: SecurityEventBroadcaster,
    retention: TimeDelta,
    entries: Mutex<HashMap<ClientKey, ClientEntry>>,
}

impl ClientStore {
    /// Create a store keeping request records for `retention`.
    ///
    /// # Errors
    ///
    /// Returns error if `retention` does not fit the time arithmetic.
    pub fn new(
        clock: SharedClock,
        events: SecurityEventBroadcaster,
        retention: Duration,
    ) -> Result<Self, ShieldError> {
        Ok(Self {
            clock,
            events,
            retention: to_delta(retention)?,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Snapshot of a client's entry, creating an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn get_or_create(&self, key: &ClientKey) -> Result<ClientEntry, ShieldError> {
        let mut entries = self.entries.lock()?;
        Ok(entries.entry(key.clone()).or_default().clone())
    }

    /// Record an admitted request at the current time.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn append(
        &self,
        key: &ClientKey,
        endpoint: &str,
        category: TierCategory,
        user_agent: Option<&str>,
    ) -> Result<(), ShieldError> {
        let record = RequestRecord {
            timestamp: self.clock.now(),
            endpoint: endpoint.to_string(),
            category,
            user_agent: user_agent.map(str::to_string),
        };
        let mut entries = self.entries.lock()?;
        entries.entry(key.clone()).or_default().requests.push_back(record);
        Ok(())
    }

    /// Block a client for `duration`, replacing any existing block.
    ///
    /// # Errors
    ///
    /// Returns error if `duration` is zero, the lock is poisoned, or the
    /// expiry overflows.
    pub fn block(
        &self,
        key: &ClientKey,
        reason: &str,
        duration: Duration,
    ) -> Result<BlockRecord, ShieldError> {
        if duration.is_zero() {
            return Err(ShieldError::DurationOutOfRange(duration));
        }
        let now = self.clock.now();
        let until = now
            .checked_add_signed(to_delta(duration)?)
            .ok_or(ShieldError::TimeOverflow)?;
        let record = BlockRecord {
            until,
            reason: reason.to_string(),
        };

        {
            let mut entries = self.entries.lock()?;
            let entry = entries.entry(key.clone()).or_default();
            entry.block = Some(record.clone());
            entry.released_at = Some(until);
        }

        self.events.emit(
            now,
            SecurityEvent::ClientBlocked {
                client: key.to_string(),
                reason: record.reason.clone(),
                until,
            },
        );
        Ok(record)
    }

    /// Lift a client's block. Returns whether an active block was lifted.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn unblock(&self, key: &ClientKey) -> Result<bool, ShieldError> {
        let now = self.clock.now();
        let lifted = {
            let mut entries = self.entries.lock()?;
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            let lifted = entry.block.take().is_some_and(|b| b.is_active(now));
            if lifted {
                entry.released_at = Some(now);
            }
            if entry.is_empty() {
                entries.remove(key);
            }
            lifted
        };

        if lifted {
            self.events.emit(
                now,
                SecurityEvent::ClientUnblocked {
                    client: key.to_string(),
                },
            );
        }
        Ok(lifted)
    }

    /// Whether a client is under an active block.
    ///
    /// Clears an expired block as a side effect.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn is_blocked(&self, key: &ClientKey) -> Result<bool, ShieldError> {
        Ok(self.block_info(key)?.is_some())
    }

    /// The client's active block, if any.
    ///
    /// Clears an expired block as a side effect.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn block_info(&self, key: &ClientKey) -> Result<Option<BlockRecord>, ShieldError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock()?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };

        if entry.clear_expired_block(now) {
            tracing::debug!(client = %key, "Block expired");
            if entry.is_empty() {
                entries.remove(key);
            }
            return Ok(None);
        }
        Ok(entry.block.clone())
    }

    /// Count a client's requests after `since`, optionally of one category only.
    ///
    /// A client without an entry has no history.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn window_stats(
        &self,
        key: &ClientKey,
        since: DateTime<Utc>,
        category: Option<TierCategory>,
    ) -> Result<WindowStats, ShieldError> {
        let entries = self.entries.lock()?;
        Ok(entries
            .get(key)
            .map(|entry| entry.window_stats(since, category))
            .unwrap_or_default())
    }

    /// Count a client's requests after `since` that were admitted after its
    /// last block was released.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn activity_since(
        &self,
        key: &ClientKey,
        since: DateTime<Utc>,
    ) -> Result<WindowStats, ShieldError> {
        let entries = self.entries.lock()?;
        Ok(entries
            .get(key)
            .map(|entry| entry.activity_since(since))
            .unwrap_or_default())
    }

    /// Drop stale records, expired blocks, and empty entries.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or the horizon overflows.
    pub fn sweep(&self) -> Result<SweepReport, ShieldError> {
        let now = self.clock.now();
        let horizon = now
            .checked_sub_signed(self.retention)
            .ok_or(ShieldError::TimeOverflow)?;
        let mut report = SweepReport::default();

        let mut entries = self.entries.lock()?;
        entries.retain(|_, entry| {
            while entry
                .requests
                .front()
                .is_some_and(|r| r.timestamp <= horizon)
            {
                entry.requests.pop_front();
                report.pruned_records += 1;
            }
            if entry.clear_expired_block(now) {
                report.expired_blocks += 1;
            }
            let keep = !entry.is_empty();
            if !keep {
                report.removed_clients += 1;
            }
            keep
        });

        Ok(report)
    }

    /// Monitoring snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or the window overflows.
    pub fn stats(&self) -> Result<ShieldStats, ShieldError> {
        let now = self.clock.now();
        let since = now
            .checked_sub_signed(to_delta(STATS_RECENT_WINDOW)?)
            .ok_or(ShieldError::TimeOverflow)?;

        let entries = self.entries.lock()?;
        Ok(ShieldStats {
            total_tracked_ips: entries.len(),
            blocked_ips: entries
                .values()
                .filter(|e| e.block.as_ref().is_some_and(|b| b.is_active(now)))
                .count(),
            recent_requests: entries
                .values()
                .map(|e| e.window_stats(since, None).count)
                .sum(),
        })
    }

    /// Forget every client. Returns how many entries were dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn clear_all(&self) -> Result<usize, ShieldError> {
        let mut entries = self.entries.lock()?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    /// Number of tracked clients.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, ShieldError> {
        Ok(self.entries.lock()?.len())
    }

    /// Whether any client is tracked.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, ShieldError> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for ClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStore")
            .field("retention", &self.retention)
            .field("clients", &self.len().ok())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_core::{Clock, MockClock};

    const RETENTION: Duration = Duration::from_secs(300);

    fn store() -> (ClientStore, MockClock) {
        let clock = MockClock::starting_now();
        let store =
            ClientStore::new(clock.shared(), SecurityEventBroadcaster::new(), RETENTION).unwrap();
        (store, clock)
    }

    fn key(ip: &str) -> ClientKey {
        ClientKey::new(ip)
    }

    #[test]
    fn test_get_or_create_is_lazy() {
        let (store, _) = store();
        assert!(store.is_empty().unwrap());

        let entry = store.get_or_create(&key("1.2.3.4")).unwrap();
        assert!(entry.requests.is_empty());
        assert!(entry.block.is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_append_keeps_order() {
        let (store, clock) = store();
        let client = key("1.2.3.4");

        store.append(&client, "/api/menu", TierCategory::General, Some("curl/8")).unwrap();
        clock.advance_ms(10);
        store.append(&client, "/api/bookings", TierCategory::Booking, None).unwrap();

        let entry = store.get_or_create(&client).unwrap();
        assert_eq!(entry.requests.len(), 2);
        assert!(entry.requests[0].timestamp < entry.requests[1].timestamp);
        assert_eq!(entry.requests[0].user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.requests[1].category, TierCategory::Booking);
    }

    #[test]
    fn test_window_is_half_open() {
        let (store, clock) = store();
        let client = key("1.2.3.4");
        let first = clock.now();

        store.append(&client, "/", TierCategory::General, None).unwrap();
        clock.advance_ms(500);
        store.append(&client, "/", TierCategory::General, None).unwrap();

        // A record exactly at the window start is excluded
        let stats = store.window_stats(&client, first, None).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.oldest, Some(first + TimeDelta::milliseconds(500)));

        let stats = store
            .window_stats(&client, first - TimeDelta::milliseconds(1), None)
            .unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.oldest, Some(first));
    }

    #[test]
    fn test_window_stats_category_filter() {
        let (store, clock) = store();
        let client = key("1.2.3.4");
        let start = clock.now() - TimeDelta::seconds(1);

        store.append(&client, "/api/availability", TierCategory::Availability, None).unwrap();
        store.append(&client, "/api/bookings", TierCategory::Booking, None).unwrap();
        store.append(&client, "/api/availability", TierCategory::Availability, None).unwrap();

        assert_eq!(store.window_stats(&client, start, None).unwrap().count, 3);
        assert_eq!(
            store
                .window_stats(&client, start, Some(TierCategory::Availability))
                .unwrap()
                .count,
            2
        );
        assert_eq!(
            store
                .window_stats(&client, start, Some(TierCategory::Quote))
                .unwrap(),
            WindowStats::default()
        );
    }

    #[test]
    fn test_missing_entry_has_no_history() {
        let (store, clock) = store();
        let stats = store.window_stats(&key("9.9.9.9"), clock.now(), None).unwrap();
        assert_eq!(stats, WindowStats::default());
        assert!(!store.is_blocked(&key("9.9.9.9")).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_zero_duration_block_rejected() {
        let (store, _) = store();
        let mut events = store.events.subscribe();
        let client = key("1.2.3.4");

        let result = store.block(&client, "manual", Duration::ZERO);
        assert!(matches!(result, Err(ShieldError::DurationOutOfRange(d)) if d.is_zero()));
        assert!(store.is_empty().unwrap());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_activity_starts_after_block_release() {
        let (store, clock) = store();
        let client = key("1.2.3.4");
        let since = clock.now() - TimeDelta::seconds(1);

        for _ in 0..3 {
            store.append(&client, "/", TierCategory::General, None).unwrap();
        }
        let block = store.block(&client, "manual", Duration::from_secs(10)).unwrap();
        assert_eq!(store.activity_since(&client, since).unwrap().count, 0);
        // Plain window counts still see the earlier requests
        assert_eq!(store.window_stats(&client, since, None).unwrap().count, 3);

        clock.set(block.until);
        store.append(&client, "/", TierCategory::General, None).unwrap();
        let stats = store.activity_since(&client, since).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.oldest, Some(block.until));
    }

    #[test]
    fn test_unblock_releases_early() {
        let (store, clock) = store();
        let client = key("1.2.3.4");
        let since = clock.now() - TimeDelta::seconds(1);

        store.append(&client, "/", TierCategory::General, None).unwrap();
        store.block(&client, "manual", Duration::from_secs(600)).unwrap();
        clock.advance_ms(100);
        assert!(store.unblock(&client).unwrap());

        let entry = store.get_or_create(&client).unwrap();
        assert_eq!(entry.released_at, Some(clock.now()));
        store.append(&client, "/", TierCategory::General, None).unwrap();
        assert_eq!(store.activity_since(&client, since).unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_block_overwrites_and_emits() {
        let (store, clock) = store();
        let mut events = store.events.subscribe();
        let client = key("1.2.3.4");

        store.block(&client, "first", Duration::from_secs(60)).unwrap();
        let second = store.block(&client, "second", Duration::from_secs(120)).unwrap();

        assert_eq!(second.until, clock.now() + TimeDelta::seconds(120));
        assert_eq!(store.block_info(&client).unwrap(), Some(second));

        let envelope = events.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            SecurityEvent::ClientBlocked { ref reason, .. } if reason == "first"
        ));
    }

    #[test]
    fn test_expired_block_is_cleared_lazily() {
        let (store, clock) = store();
        let client = key("1.2.3.4");

        store.block(&client, "manual", Duration::from_secs(60)).unwrap();
        assert!(store.is_blocked(&client).unwrap());

        clock.advance(TimeDelta::seconds(60));
        assert!(!store.is_blocked(&client).unwrap());
        // The entry only held the block, so it is gone entirely
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_unblock() {
        let (store, _) = store();
        let client = key("1.2.3.4");

        assert!(!store.unblock(&client).unwrap());
        store.block(&client, "manual", Duration::from_secs(60)).unwrap();
        assert!(store.unblock(&client).unwrap());
        assert!(!store.is_blocked(&client).unwrap());
    }

    #[test]
    fn test_sweep_removes_quiet_clients() {
        let (store, clock) = store();
        let quiet = key("1.1.1.1");
        let blocked = key("2.2.2.2");

        store.append(&quiet, "/", TierCategory::General, None).unwrap();
        store.append(&blocked, "/", TierCategory::General, None).unwrap();
        store.block(&blocked, "manual", Duration::from_secs(3600)).unwrap();

        clock.advance(TimeDelta::seconds(301));
        let report = store.sweep().unwrap();

        assert_eq!(report.pruned_records, 2);
        assert_eq!(report.removed_clients, 1);
        assert_eq!(report.expired_blocks, 0);

        // The blocked client is retained with an empty history
        assert_eq!(store.len().unwrap(), 1);
        let entry = store.get_or_create(&blocked).unwrap();
        assert!(entry.requests.is_empty());
        assert!(entry.block.is_some());
    }

    #[test]
    fn test_sweep_keeps_recent_records() {
        let (store, clock) = store();
        let client = key("1.1.1.1");

        store.append(&client, "/", TierCategory::General, None).unwrap();
        clock.advance(TimeDelta::seconds(200));
        store.append(&client, "/", TierCategory::General, None).unwrap();
        clock.advance(TimeDelta::seconds(150));

        let report = store.sweep().unwrap();
        assert_eq!(report.pruned_records, 1);
        assert_eq!(store.get_or_create(&client).unwrap().requests.len(), 1);
    }

    #[test]
    fn test_sweep_drops_expired_blocks() {
        let (store, clock) = store();
        let client = key("1.1.1.1");

        store.block(&client, "manual", Duration::from_secs(10)).unwrap();
        clock.advance(TimeDelta::seconds(11));

        let report = store.sweep().unwrap();
        assert_eq!(report.expired_blocks, 1);
        assert_eq!(report.removed_clients, 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_stats_and_clear() {
        let (store, clock) = store();

        store.append(&key("1.1.1.1"), "/", TierCategory::General, None).unwrap();
        clock.advance(TimeDelta::seconds(90));
        store.append(&key("1.1.1.1"), "/", TierCategory::General, None).unwrap();
        store.append(&key("2.2.2.2"), "/", TierCategory::General, None).unwrap();
        store.block(&key("3.3.3.3"), "manual", Duration::from_secs(60)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_tracked_ips, 3);
        assert_eq!(stats.blocked_ips, 1);
        assert_eq!(stats.recent_requests, 2);

        assert_eq!(store.clear_all().unwrap(), 3);
        assert_eq!(store.stats().unwrap(), ShieldStats::default());
    }

    #[test]
    fn test_stats_serialization() {
        let stats = ShieldStats {
            total_tracked_ips: 3,
            blocked_ips: 1,
            recent_requests: 7,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["totalTrackedIPs"], 3);
        assert_eq!(json["blockedIPs"], 1);
        assert_eq!(json["recentRequests"], 7);
    }
}
