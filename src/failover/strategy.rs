//! Primary-selection strategies, one per host topology.
//!
//! # Responsibilities
//! - Decide which hosts are eligible for a reconnection attempt
//! - Decide whether the session can live without a primary
//! - Run the inline failover for a failed operation
//!
//! # Design Decisions
//! - Closed set of variants chosen from configuration at construction
//! - Blacklisted hosts are tried last, never dropped, so a fully failed
//!   cluster is still polled

use crate::config::{DriverConfig, Topology};
use crate::failover::blacklist::BlacklistRegistry;
use crate::failover::error::FailoverResult;
use crate::failover::listener::FailoverListener;
use crate::failover::types::{HandleErrorResult, SearchFilter};
use crate::protocol::{HostAddress, Operation};

/// One primary in use at a time; every configured host can take over.
#[derive(Debug, Clone)]
pub struct SingleHostStrategy {
    hosts: Vec<HostAddress>,
}

impl SingleHostStrategy {
    pub fn new(hosts: Vec<HostAddress>) -> Self {
        Self { hosts }
    }

    fn eligible(&self, _filter: SearchFilter, _read_only: bool) -> Vec<HostAddress> {
        self.hosts.clone()
    }
}

/// Primaries and replicas. Read-only sessions may run on a replica.
#[derive(Debug, Clone)]
pub struct MultiHostStrategy {
    hosts: Vec<HostAddress>,
}

impl MultiHostStrategy {
    pub fn new(hosts: Vec<HostAddress>) -> Self {
        Self { hosts }
    }

    fn eligible(&self, filter: SearchFilter, read_only: bool) -> Vec<HostAddress> {
        if !filter.failed_host_only {
            return self.hosts.clone();
        }
        // Primaries first, replicas only when the session accepts them.
        let mut hosts: Vec<HostAddress> =
            self.hosts.iter().filter(|h| h.is_primary()).cloned().collect();
        if read_only {
            hosts.extend(self.hosts.iter().filter(|h| !h.is_primary()).cloned());
        }
        hosts
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    SingleHost(SingleHostStrategy),
    MultiHost(MultiHostStrategy),
}

impl Strategy {
    pub fn from_config(config: &DriverConfig) -> Self {
        let hosts = config.hosts.clone();
        match config.topology {
            Topology::SingleHost => Strategy::SingleHost(SingleHostStrategy::new(hosts)),
            Topology::MultiHost => Strategy::MultiHost(MultiHostStrategy::new(hosts)),
        }
    }

    pub fn hosts(&self) -> &[HostAddress] {
        match self {
            Strategy::SingleHost(s) => &s.hosts,
            Strategy::MultiHost(s) => &s.hosts,
        }
    }

    /// Whether the session is unusable without a primary.
    pub fn requires_primary(&self, read_only: bool) -> bool {
        match self {
            Strategy::SingleHost(_) => true,
            Strategy::MultiHost(_) => !read_only,
        }
    }

    /// Hosts to try, in order: non-blacklisted first, then blacklisted.
    pub fn candidates(
        &self,
        blacklist: &BlacklistRegistry,
        filter: SearchFilter,
        read_only: bool,
    ) -> Vec<HostAddress> {
        let eligible = match self {
            Strategy::SingleHost(s) => s.eligible(filter, read_only),
            Strategy::MultiHost(s) => s.eligible(filter, read_only),
        };
        let (blacklisted, mut available): (Vec<_>, Vec<_>) =
            eligible.into_iter().partition(|h| blacklist.contains(h));
        available.extend(blacklisted);
        available
    }

    /// Inline failover after the current connection failed.
    ///
    /// Closes the failed connection and searches for a new primary. On
    /// success the in-flight operation is replayed unless a transaction was
    /// open; on failure the background loop takes over and the caller keeps
    /// its original error.
    pub async fn primary_fail(
        &self,
        listener: &FailoverListener,
        operation: Option<&Operation>,
    ) -> FailoverResult<HandleErrorResult> {
        let current = listener.current_protocol();
        let in_transaction = current.as_ref().is_some_and(|p| p.in_transaction());
        if let Some(protocol) = current.filter(|p| !p.is_closed()) {
            protocol.close().await;
        }

        match listener
            .reconnect_failed_connection(SearchFilter::new(true, false))
            .await
        {
            Ok(()) => {
                listener.handle_fail_loop().await;
                if in_transaction {
                    tracing::debug!(
                        listener = %listener.id(),
                        "Reconnected during a transaction, operation not replayed"
                    );
                    return Ok(HandleErrorResult::must_throw());
                }
                listener.relaunch_operation(operation).await
            }
            Err(e) => {
                tracing::warn!(
                    listener = %listener.id(),
                    error = %e,
                    "Inline failover failed, handing over to the reconnection loop"
                );
                listener.arm_fail_loop_if_idle(false);
                Ok(HandleErrorResult::must_throw())
            }
        }
    }

    /// Apply a read-only switch to the connection topology.
    ///
    /// Only a multi-host session on a replica has to move: back to a primary
    /// when read-write is requested.
    pub async fn switch_read_only(
        &self,
        listener: &FailoverListener,
        read_only: bool,
    ) -> FailoverResult<()> {
        let Strategy::MultiHost(_) = self else {
            return Ok(());
        };
        let on_replica = listener.current_host().is_some_and(|h| !h.is_primary());
        if read_only || !on_replica {
            return Ok(());
        }

        tracing::info!(listener = %listener.id(), "Read-write requested on a replica, moving to a primary");
        listener.set_master_host_fail();
        let result = listener
            .reconnect_failed_connection(SearchFilter::new(true, false))
            .await;
        listener.handle_fail_loop().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::clock::MonotonicClock;

    fn cluster() -> Vec<HostAddress> {
        vec![
            HostAddress::primary("p1", 3306),
            HostAddress::replica("r1", 3306),
            HostAddress::primary("p2", 3306),
        ]
    }

    #[test]
    fn test_requires_primary() {
        let single = Strategy::SingleHost(SingleHostStrategy::new(cluster()));
        assert!(single.requires_primary(true));
        assert!(single.requires_primary(false));

        let multi = Strategy::MultiHost(MultiHostStrategy::new(cluster()));
        assert!(!multi.requires_primary(true));
        assert!(multi.requires_primary(false));
    }

    #[test]
    fn test_blacklisted_hosts_go_last() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        blacklist.add(&HostAddress::primary("p1", 3306));

        let single = Strategy::SingleHost(SingleHostStrategy::new(cluster()));
        let candidates = single.candidates(&blacklist, SearchFilter::new(true, false), false);
        assert_eq!(
            candidates,
            vec![
                HostAddress::replica("r1", 3306),
                HostAddress::primary("p2", 3306),
                HostAddress::primary("p1", 3306),
            ]
        );
    }

    #[test]
    fn test_multi_host_filters_replicas() {
        let blacklist = BlacklistRegistry::new(MonotonicClock::new());
        let multi = Strategy::MultiHost(MultiHostStrategy::new(cluster()));

        let read_write = multi.candidates(&blacklist, SearchFilter::new(true, false), false);
        assert!(read_write.iter().all(|h| h.is_primary()));
        assert_eq!(read_write.len(), 2);

        let read_only = multi.candidates(&blacklist, SearchFilter::new(true, false), true);
        assert_eq!(read_only.last(), Some(&HostAddress::replica("r1", 3306)));

        let any = multi.candidates(&blacklist, SearchFilter::new(false, false), false);
        assert_eq!(any, cluster());
    }

    #[test]
    fn test_from_config() {
        let config = DriverConfig {
            hosts: cluster(),
            topology: Topology::MultiHost,
            ..Default::default()
        };
        let strategy = Strategy::from_config(&config);
        assert!(matches!(strategy, Strategy::MultiHost(_)));
        assert_eq!(strategy.hosts().len(), 3);
    }
}
