//! Background reconnection loop.
//!
//! # Responsibilities
//! - While a listener is marked failed, retry reconnection every tick
//! - Stop itself once reconnected or closed
//!
//! # State Transitions (run marker)
//! ```text
//! Idle → Active: a tick starts (rejected if already Active or Terminated)
//! Active → Idle: the tick finishes
//! Idle → Terminated: await_termination() settles
//! ```
//!
//! # Design Decisions
//! - Errors never reach the scheduler; only explicit stop conditions end the loop
//! - At most one tick per listener in flight, whatever the pool does

use std::future::Future;
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::Weak;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::failover::error::{FailoverError, FailoverResult};
use crate::failover::listener::FailoverListener;
use crate::failover::scheduler::ScheduledTask;

const TERMINATED: i8 = -1;
const IDLE: i8 = 0;
const ACTIVE: i8 = 1;

/// Periodic reconnection task bound to one listener.
pub struct FailLoop {
    listener: Weak<FailoverListener>,
    run_state: AtomicI8,
    settled: Notify,
}

/// Returns the marker to idle when a tick ends, even by panic.
struct ActiveGuard<'a> {
    run_loop: &'a FailLoop,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let _ = self.run_loop.run_state.compare_exchange(
            ACTIVE,
            IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.run_loop.settled.notify_waiters();
    }
}

impl FailLoop {
    pub(crate) fn new(listener: Weak<FailoverListener>) -> Self {
        Self {
            listener,
            run_state: AtomicI8::new(IDLE),
            settled: Notify::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == TERMINATED
    }

    pub fn is_running(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == ACTIVE
    }

    /// Request disarm, then wait until no tick is running and mark the loop
    /// terminated. If `cancelled` resolves first the loop is marked terminated
    /// immediately.
    pub async fn await_termination<F>(&self, cancelled: F)
    where
        F: Future<Output = ()>,
    {
        if let Some(listener) = self.listener.upgrade() {
            listener.disarm_fail_loop().await;
        }

        tokio::pin!(cancelled);
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match self.run_state.compare_exchange(
                IDLE,
                TERMINATED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) | Err(TERMINATED) => return,
                Err(_) => {}
            }

            tokio::select! {
                _ = &mut settled => {}
                _ = &mut cancelled => {
                    self.run_state.store(TERMINATED, Ordering::Release);
                    return;
                }
            }
        }
    }

    async fn tick(&self) {
        let Some(listener) = self.listener.upgrade() else {
            return;
        };

        if listener.is_explicitly_closed() || !listener.has_host_fail() {
            listener.disarm_fail_loop().await;
            return;
        }

        if listener.requires_primary() {
            match self.attempt(&listener).await {
                Ok(()) => {
                    tracing::info!(
                        listener = %listener.id(),
                        host = ?listener.current_host().map(|h| h.to_string()),
                        "Reconnected from fail loop"
                    );
                    listener.disarm_fail_loop().await;
                }
                Err(e) => {
                    tracing::debug!(
                        listener = %listener.id(),
                        attempts = listener.connection_attempts(),
                        error = %e,
                        "Fail loop reconnection attempt failed"
                    );
                }
            }
        } else if listener.connection_attempts() > listener.options().retries_all_down {
            tracing::warn!(
                listener = %listener.id(),
                attempts = listener.connection_attempts(),
                "Stopping fail loop after too many attempts"
            );
            listener.disarm_fail_loop().await;
        }
    }

    async fn attempt(&self, listener: &FailoverListener) -> FailoverResult<()> {
        let attempts = listener.connection_attempts();
        let max = listener.options().failover_loop_retries;
        if attempts >= max {
            return Err(FailoverError::TooManyAttempts { attempts, max });
        }
        let filter = listener.filter_for_failed_host().with_unique_attempt();
        listener.reconnect_failed_connection(filter).await
    }
}

#[async_trait]
impl ScheduledTask for FailLoop {
    async fn run(&self) {
        if self
            .run_state
            .compare_exchange(IDLE, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Overlapping tick, or termination already requested.
            return;
        }
        let _guard = ActiveGuard { run_loop: self };
        self.tick().await;
    }
}
