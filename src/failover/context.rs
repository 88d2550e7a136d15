//! Process-wide failover state shared by every listener.

use crate::failover::blacklist::BlacklistRegistry;
use crate::failover::clock::MonotonicClock;
use crate::failover::scheduler::SchedulerPool;

/// Blacklist, scheduler and clock shared by all listeners of a process.
///
/// Construct one at startup, hand clones to each listener, and call
/// [`FailoverContext::shutdown`] when the process stops using the driver.
#[derive(Debug, Clone)]
pub struct FailoverContext {
    blacklist: BlacklistRegistry,
    scheduler: SchedulerPool,
    clock: MonotonicClock,
}

impl FailoverContext {
    /// Must be called within a Tokio runtime.
    pub fn new() -> Self {
        let clock = MonotonicClock::new();
        Self {
            blacklist: BlacklistRegistry::new(clock),
            scheduler: SchedulerPool::new(),
            clock,
        }
    }

    pub fn blacklist(&self) -> &BlacklistRegistry {
        &self.blacklist
    }

    pub fn scheduler(&self) -> &SchedulerPool {
        &self.scheduler
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    /// Forget every failed host, for all listeners.
    pub fn clear_blacklist(&self) {
        self.blacklist.clear();
        tracing::info!("Blacklist cleared");
    }

    /// Stop every reconnection loop and the scheduler's resize worker.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.blacklist.clear();
    }
}
