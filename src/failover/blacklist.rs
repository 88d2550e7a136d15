//! Process-wide record of recently failed hosts.
//!
//! # Responsibilities
//! - Remember when each host last failed
//! - Let reconnection searches skip recently failed hosts
//! - Expire entries after the configured timeout
//!
//! # Design Decisions
//! - Concurrent map, no external locking for add/prune/read
//! - Pruning removes an entry only if its timestamp is still the one observed,
//!   so a host refreshed in the meantime stays blacklisted

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::failover::clock::MonotonicClock;
use crate::observability::metrics;
use crate::protocol::HostAddress;

/// Shared blacklist: host → last failure time in monotonic milliseconds.
#[derive(Debug, Clone)]
pub struct BlacklistRegistry {
    entries: Arc<DashMap<HostAddress, u64>>,
    clock: MonotonicClock,
}

impl BlacklistRegistry {
    pub fn new(clock: MonotonicClock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Record a failure of `host` now. Racing writers keep the newest time.
    pub fn add(&self, host: &HostAddress) {
        let now = self.clock.now_millis();
        self.entries
            .entry(host.clone())
            .and_modify(|ts| *ts = (*ts).max(now))
            .or_insert(now);
        metrics::record_blacklist_size(self.entries.len());
    }

    /// Remove every entry older than `ttl`. Returns the number removed.
    pub fn prune(&self, ttl: Duration) -> usize {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expire_before = self.clock.now_millis().saturating_sub(ttl_millis);

        // Collect first: removing while iterating a DashMap shard deadlocks.
        let stale: Vec<(HostAddress, u64)> = self
            .entries
            .iter()
            .filter(|entry| *entry.value() < expire_before)
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let mut removed = 0;
        for (host, observed) in stale {
            if self.remove_if_unchanged(&host, observed) {
                tracing::trace!(host = %host, "Host removed from blacklist");
                removed += 1;
            }
        }
        if removed > 0 {
            metrics::record_blacklist_size(self.entries.len());
        }
        removed
    }

    /// Compare-and-remove: drop `host` only if its timestamp is still `observed`.
    pub(crate) fn remove_if_unchanged(&self, host: &HostAddress, observed: u64) -> bool {
        self.entries
            .remove_if(host, |_, ts| *ts == observed)
            .is_some()
    }

    pub fn contains(&self, host: &HostAddress) -> bool {
        self.entries.contains_key(host)
    }

    /// Time of the last recorded failure of `host`.
    pub fn last_failure(&self, host: &HostAddress) -> Option<u64> {
        self.entries.get(host).map(|entry| *entry.value())
    }

    pub fn hosts(&self) -> Vec<HostAddress> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::record_blacklist_size(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostAddress {
        HostAddress::primary(name, 3306)
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_refreshes_timestamp() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&host("a"));
        assert_eq!(blacklist.last_failure(&host("a")), Some(0));

        tokio::time::advance(Duration::from_millis(40)).await;
        blacklist.add(&host("a"));
        assert_eq!(blacklist.len(), 1);
        assert_eq!(blacklist.last_failure(&host("a")), Some(40));
    }

    #[test]
    fn test_concurrent_add_single_entry() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                let blacklist = blacklist.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        blacklist.add(&host("a"));
                    }
                });
            }
        });

        assert_eq!(blacklist.len(), 1);
        // Newest write wins: a later add can only move the timestamp forward.
        let before = blacklist.last_failure(&host("a")).unwrap();
        blacklist.add(&host("a"));
        assert!(blacklist.last_failure(&host("a")).unwrap() >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_removes_only_stale() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&host("old"));
        tokio::time::advance(Duration::from_secs(30)).await;
        blacklist.add(&host("fresh"));
        tokio::time::advance(Duration::from_secs(25)).await;

        let removed = blacklist.prune(Duration::from_secs(50));
        assert_eq!(removed, 1);
        assert!(!blacklist.contains(&host("old")));
        assert!(blacklist.contains(&host("fresh")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_entry_survives_compare_and_remove() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&host("a"));
        let observed = blacklist.last_failure(&host("a")).unwrap();

        // Refreshed between the prune scan and the removal.
        tokio::time::advance(Duration::from_secs(5)).await;
        blacklist.add(&host("a"));

        assert!(!blacklist.remove_if_unchanged(&host("a"), observed));
        assert!(blacklist.contains(&host("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_with_huge_ttl_keeps_everything() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&host("a"));
        tokio::time::advance(Duration::from_secs(1)).await;

        // 2^64 + 5 milliseconds: must not wrap around to 5ms.
        let ttl = Duration::new(18_446_744_073_709_551, 621_000_000);
        assert_eq!(blacklist.prune(ttl), 0);
        assert!(blacklist.contains(&host("a")));
    }

    #[test]
    fn test_clear() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&host("a"));
        blacklist.add(&host("b"));
        blacklist.clear();
        assert!(blacklist.is_empty());
    }
}
