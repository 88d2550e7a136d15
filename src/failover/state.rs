//! Atomic failure state of one listener.
//!
//! Every transition is a single compare-and-swap so concurrent callers agree
//! on who performed it. The fail flag and its timestamp share one word:
//! zero means not failed.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct ListenerState {
    master_host_fail_timestamp: AtomicU64,
    current_connection_attempts: AtomicU32,
    is_looping: AtomicBool,
    explicit_closed: AtomicBool,
    current_read_only_asked: AtomicBool,
}

impl ListenerState {
    /// State of a listener that has no connection yet.
    pub(crate) fn new_failed(now: u64) -> Self {
        Self {
            master_host_fail_timestamp: AtomicU64::new(now.max(1)),
            current_connection_attempts: AtomicU32::new(0),
            is_looping: AtomicBool::new(false),
            explicit_closed: AtomicBool::new(false),
            current_read_only_asked: AtomicBool::new(false),
        }
    }

    /// Healthy → failed. Returns true for the caller that made the transition.
    pub(crate) fn mark_failed(&self, now: u64) -> bool {
        if self
            .master_host_fail_timestamp
            .compare_exchange(0, now.max(1), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.current_connection_attempts.store(0, Ordering::SeqCst);
        true
    }

    /// Failed → healthy. Returns true for the caller that made the transition.
    pub(crate) fn mark_recovered(&self) -> bool {
        self.master_host_fail_timestamp.swap(0, Ordering::SeqCst) != 0
    }

    pub(crate) fn has_host_fail(&self) -> bool {
        self.fail_timestamp() != 0
    }

    pub(crate) fn fail_timestamp(&self) -> u64 {
        self.master_host_fail_timestamp.load(Ordering::SeqCst)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.current_connection_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn record_attempt(&self) -> u32 {
        self.current_connection_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.is_looping.load(Ordering::SeqCst)
    }

    /// Not looping → looping. True for the caller that must register the loop.
    pub(crate) fn start_looping(&self) -> bool {
        self.is_looping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Looping → not looping. True for the caller that must deregister the loop.
    pub(crate) fn stop_looping(&self) -> bool {
        self.is_looping
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns true the first time only.
    pub(crate) fn close(&self) -> bool {
        !self.explicit_closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_explicitly_closed(&self) -> bool {
        self.explicit_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn read_only(&self) -> bool {
        self.current_read_only_asked.load(Ordering::SeqCst)
    }

    /// Record the requested mode and return the previous one.
    pub(crate) fn set_read_only(&self, read_only: bool) -> bool {
        self.current_read_only_asked.swap(read_only, Ordering::SeqCst)
    }
}
