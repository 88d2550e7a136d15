//! Failover listener: the failure state machine of one connection group.
//!
//! # Responsibilities
//! - Own the failure state and the current connection
//! - Run inline failover for failed operations
//! - Arm and disarm the background reconnection loop
//! - Hand session state over to each new connection
//!
//! # State Transitions
//! ```text
//! Healthy → Failed: first caller to flip the fail flag; blacklists the host
//! Failed → Healthy: a reconnection succeeds
//! * → Closed: close(); no more blacklisting or failure handling
//! ```
//!
//! # Design Decisions
//! - Reconnection attempts of one listener are serialized; an attempt that
//!   finds the failure already resolved returns at once
//! - The group lock is only taken for the state handoff. It is not
//!   reentrant: callers must not hold it across `handle_failure`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{DriverConfig, FailoverOptions};
use crate::failover::context::FailoverContext;
use crate::failover::error::{FailoverError, FailoverResult};
use crate::failover::fail_loop::FailLoop;
use crate::failover::replay;
use crate::failover::scheduler::ScheduledTask;
use crate::failover::state::ListenerState;
use crate::failover::strategy::Strategy;
use crate::failover::sync;
use crate::failover::types::{HandleErrorResult, ListenerPhase, ListenerStatus, SearchFilter};
use crate::observability::metrics;
use crate::protocol::{Connector, HostAddress, Operation, Outcome, Protocol, ProtocolError, Query};

/// Delay between two reconnection loop runs, and before the first
/// non-immediate one.
pub const FAIL_LOOP_PERIOD: Duration = Duration::from_millis(250);

struct ActiveConnection {
    protocol: Arc<dyn Protocol>,
    host: HostAddress,
}

pub struct FailoverListener {
    id: Uuid,
    options: FailoverOptions,
    strategy: Strategy,
    connector: Arc<dyn Connector>,
    context: FailoverContext,
    state: ListenerState,
    current: ArcSwapOption<ActiveConnection>,
    lock: Arc<Mutex<()>>,
    reconnect_lock: Mutex<()>,
    fail_loop: Arc<FailLoop>,
    fail_loop_task: Arc<dyn ScheduledTask>,
    released: AtomicBool,
}

impl FailoverListener {
    /// Create a listener and open its first connection.
    pub async fn connect(
        context: &FailoverContext,
        options: FailoverOptions,
        strategy: Strategy,
        connector: Arc<dyn Connector>,
    ) -> FailoverResult<Arc<Self>> {
        let now = context.clock().now_millis();
        let listener = Arc::new_cyclic(|weak| {
            let fail_loop = Arc::new(FailLoop::new(weak.clone()));
            let fail_loop_task: Arc<dyn ScheduledTask> = fail_loop.clone();
            Self {
                id: Uuid::new_v4(),
                options,
                strategy,
                connector,
                context: context.clone(),
                state: ListenerState::new_failed(now),
                current: ArcSwapOption::empty(),
                lock: Arc::new(Mutex::new(())),
                reconnect_lock: Mutex::new(()),
                fail_loop,
                fail_loop_task,
                released: AtomicBool::new(false),
            }
        });
        context.scheduler().acquire();

        if let Err(e) = listener
            .reconnect_failed_connection(SearchFilter::new(true, false))
            .await
        {
            tracing::warn!(listener = %listener.id, error = %e, "Initial connection failed");
            listener.close().await;
            return Err(e);
        }

        tracing::debug!(
            listener = %listener.id,
            host = ?listener.current_host().map(|h| h.to_string()),
            "Listener connected"
        );
        Ok(listener)
    }

    /// Same as [`FailoverListener::connect`], with strategy and options
    /// taken from `config`.
    pub async fn from_config(
        context: &FailoverContext,
        config: &DriverConfig,
        connector: Arc<dyn Connector>,
    ) -> FailoverResult<Arc<Self>> {
        Self::connect(
            context,
            config.failover.clone(),
            Strategy::from_config(config),
            connector,
        )
        .await
    }

    /// Handle a failure of the current connection while `operation` was in
    /// flight.
    pub async fn handle_failure(
        &self,
        operation: Option<&Operation>,
    ) -> FailoverResult<HandleErrorResult> {
        if self.is_explicitly_closed() {
            return Err(FailoverError::ConnectionClosed);
        }

        if self.set_master_host_fail() {
            if let Some(host) = self.current_host() {
                self.add_to_blacklist(&host);
            }
        }

        self.strategy.primary_fail(self, operation).await
    }

    /// Healthy → failed. Returns true only for the caller that made the
    /// transition.
    pub fn set_master_host_fail(&self) -> bool {
        let first = self.state.mark_failed(self.context.clock().now_millis());
        if first {
            let host = self
                .current_host()
                .map(|h| h.to_string())
                .unwrap_or_default();
            tracing::warn!(listener = %self.id, host = %host, "Primary connection failed");
            metrics::record_primary_failure(&host);
        }
        first
    }

    /// Failed → healthy.
    pub fn reset_master_failover_data(&self) {
        self.state.mark_recovered();
    }

    /// Blacklist `host`, unless this listener was explicitly closed.
    pub fn add_to_blacklist(&self, host: &HostAddress) {
        if !self.is_explicitly_closed() {
            self.context.blacklist().add(host);
        }
    }

    /// Drop blacklist entries older than the configured timeout.
    pub fn reset_old_blacklist_hosts(&self) {
        let removed = self
            .context
            .blacklist()
            .prune(self.options.blacklist_timeout());
        if removed > 0 {
            tracing::debug!(listener = %self.id, removed, "Expired blacklist entries");
        }
    }

    /// Register the reconnection loop if it is enabled and not yet registered.
    pub fn arm_fail_loop_if_idle(&self, immediate: bool) {
        if self.options.failover_loop_retries == 0 || self.is_explicitly_closed() {
            return;
        }
        if !self.state.start_looping() {
            return;
        }

        let initial_delay = if immediate { Duration::ZERO } else { FAIL_LOOP_PERIOD };
        self.context
            .scheduler()
            .schedule(self.fail_loop_task.clone(), initial_delay, FAIL_LOOP_PERIOD);
        tracing::debug!(listener = %self.id, immediate, "Reconnection loop armed");

        // close() may have run its disarm before the flag was set.
        if self.is_explicitly_closed() && self.state.stop_looping() {
            self.context.scheduler().cancel(&self.fail_loop_task);
        }
    }

    /// Deregister the reconnection loop. Waits for the registration when it
    /// is still being made.
    pub async fn disarm_fail_loop(&self) {
        if self.state.stop_looping() {
            self.context
                .scheduler()
                .cancel_when_registered(&self.fail_loop_task)
                .await;
            tracing::debug!(listener = %self.id, "Reconnection loop disarmed");
        }
    }

    /// Keep the loop running while failed, stop it otherwise.
    pub async fn handle_fail_loop(&self) {
        if self.has_host_fail() && !self.is_explicitly_closed() {
            self.arm_fail_loop_if_idle(false);
        } else {
            self.disarm_fail_loop().await;
        }
    }

    /// Search `filter`'s candidates for a new connection.
    ///
    /// Hosts refusing the connection are blacklisted. A unique attempt makes
    /// one pass over the candidates, otherwise the list is cycled up to
    /// `retries_all_down` attempts.
    pub async fn reconnect_failed_connection(&self, filter: SearchFilter) -> FailoverResult<()> {
        let _attempt = self.reconnect_lock.lock().await;
        if self.is_explicitly_closed() {
            return Err(FailoverError::ConnectionClosed);
        }
        if !self.has_host_fail() {
            return Ok(());
        }

        self.reset_old_blacklist_hosts();
        let candidates = self
            .strategy
            .candidates(self.context.blacklist(), filter, self.is_read_only());
        let max_attempts = if filter.unique_attempt {
            candidates.len()
        } else {
            candidates.len().max(self.options.retries_all_down as usize)
        };

        for host in candidates.iter().cycle().take(max_attempts) {
            if self.is_explicitly_closed() {
                return Err(FailoverError::ConnectionClosed);
            }
            let attempts = self.state.record_attempt();

            match self.connector.connect(host).await {
                Ok(protocol) => {
                    metrics::record_reconnect_attempt("success");
                    return self.found_active_connection(protocol, host.clone()).await;
                }
                Err(e) => {
                    metrics::record_reconnect_attempt("failure");
                    tracing::debug!(
                        listener = %self.id,
                        host = %host,
                        attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    self.add_to_blacklist(host);
                }
            }
        }

        Err(FailoverError::NoHostAvailable {
            attempts: max_attempts,
        })
    }

    /// Install a newly opened connection: sync session state, swap it in,
    /// close the old one and leave the failed state.
    async fn found_active_connection(
        &self,
        protocol: Arc<dyn Protocol>,
        host: HostAddress,
    ) -> FailoverResult<()> {
        if self.is_explicitly_closed() {
            protocol.close().await;
            return Err(FailoverError::ConnectionClosed);
        }

        let previous = self.current.load_full();
        if let Err(e) = sync::sync_connection(
            &self.lock,
            previous.as_ref().map(|c| c.protocol.as_ref()),
            protocol.as_ref(),
        )
        .await
        {
            protocol.close().await;
            return Err(e.into());
        }
        if self.is_read_only() {
            if let Err(e) = set_session_read_only(protocol.as_ref(), true).await {
                tracing::debug!(listener = %self.id, host = %host, error = %e, "Could not restore read-only session");
            }
        }

        // close() may have run during the handoff; it waits on the
        // reconnect lock before clearing `current`, so this check is final.
        if self.is_explicitly_closed() {
            protocol.close().await;
            return Err(FailoverError::ConnectionClosed);
        }

        let replaced = self
            .current
            .swap(Some(Arc::new(ActiveConnection { protocol, host: host.clone() })));
        if let Some(old) = replaced.filter(|c| !c.protocol.is_closed()) {
            old.protocol.close().await;
        }
        self.reset_master_failover_data();

        tracing::info!(listener = %self.id, host = %host, "Connected to host");
        Ok(())
    }

    /// Replay `operation` on the current connection.
    pub async fn relaunch_operation(
        &self,
        operation: Option<&Operation>,
    ) -> FailoverResult<HandleErrorResult> {
        if self.is_explicitly_closed() {
            return Ok(HandleErrorResult::must_throw());
        }
        match self.current_protocol() {
            Some(protocol) => replay::relaunch_operation(protocol.as_ref(), operation).await,
            None => Ok(HandleErrorResult::must_throw()),
        }
    }

    /// Copy session state between two connections under the group lock.
    pub async fn sync_connection(
        &self,
        from: Option<&dyn Protocol>,
        to: &dyn Protocol,
    ) -> Result<(), ProtocolError> {
        sync::sync_connection(&self.lock, from, to).await
    }

    /// Run `operation` on the current connection, without failure handling.
    pub async fn invoke(&self, operation: &Operation) -> Result<Outcome, ProtocolError> {
        let protocol = self.current_protocol().ok_or(ProtocolError::Closed)?;
        operation.execute(protocol.as_ref()).await
    }

    /// Run `operation`, failing over transparently when the connection is lost.
    pub async fn execute(&self, operation: Operation) -> FailoverResult<Outcome> {
        self.pre_execute().await?;
        match self.invoke(&operation).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_connection_failure() => {
                self.handle_failure(Some(&operation)).await?.into_result(e)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Guard run before each operation: a closed connection is reconnected
    /// when `auto_reconnect` is set, otherwise rejected.
    pub async fn pre_execute(&self) -> FailoverResult<()> {
        if !self.is_closed() {
            return Ok(());
        }
        if self.options.auto_reconnect && !self.is_explicitly_closed() {
            if let Err(e) = self.reconnect().await {
                tracing::warn!(listener = %self.id, error = %e, "Automatic reconnection failed");
            }
            return Ok(());
        }
        Err(FailoverError::ConnectionClosed)
    }

    /// Force a reconnection.
    pub async fn reconnect(&self) -> FailoverResult<()> {
        if self.is_explicitly_closed() {
            return Err(FailoverError::ConnectionClosed);
        }
        let in_transaction = self
            .current_protocol()
            .is_some_and(|p| !p.is_closed() && p.in_transaction());

        self.set_master_host_fail();
        let result = self
            .reconnect_failed_connection(SearchFilter::new(true, false))
            .await;
        self.handle_fail_loop().await;

        match result {
            Ok(()) if in_transaction => Err(self.failover_error(
                ProtocolError::Connection("connection reconnected during a transaction".into()),
                true,
            )),
            Ok(()) => Ok(()),
            Err(FailoverError::ConnectionClosed) => Err(FailoverError::ConnectionClosed),
            Err(e) => Err(self.failover_error(ProtocolError::Connection(e.to_string()), false)),
        }
    }

    /// Switch the session between read-only and read-write.
    pub async fn set_read_only(&self, read_only: bool) -> FailoverResult<()> {
        if self.is_explicitly_closed() {
            return Err(FailoverError::ConnectionClosed);
        }
        if self.state.set_read_only(read_only) == read_only {
            return Ok(());
        }

        self.strategy.switch_read_only(self, read_only).await?;
        if let Some(protocol) = self.current_protocol() {
            set_session_read_only(protocol.as_ref(), read_only).await?;
        }
        Ok(())
    }

    /// Error reported when the current host is lost.
    pub fn failover_error(&self, source: ProtocolError, reconnected: bool) -> FailoverError {
        FailoverError::Failover {
            host: self
                .current_host()
                .map(|h| h.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            reconnected,
            source,
        }
    }

    /// Stop the loop and close the connection, then give the scheduler
    /// capacity back. Idempotent.
    pub async fn close(&self) {
        if !self.state.close() {
            return;
        }
        self.fail_loop
            .await_termination(std::future::pending::<()>())
            .await;

        // Wait out an inline handoff; it sees the closed flag before installing.
        let _attempt = self.reconnect_lock.lock().await;
        if let Some(active) = self.current.swap(None) {
            if !active.protocol.is_closed() {
                active.protocol.close().await;
            }
        }
        self.release();
        tracing::debug!(listener = %self.id, "Listener closed");
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.context.scheduler().release();
        }
    }

    pub fn status(&self) -> ListenerStatus {
        let phase = if self.is_explicitly_closed() {
            ListenerPhase::Closed
        } else if self.has_host_fail() {
            ListenerPhase::Failed
        } else {
            ListenerPhase::Healthy
        };
        ListenerStatus {
            id: self.id,
            phase,
            host: self.current_host().map(|h| h.to_string()),
            master_host_fail_timestamp: self.state.fail_timestamp(),
            connection_attempts: self.connection_attempts(),
            looping: self.is_looping(),
            read_only: self.is_read_only(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &FailoverOptions {
        &self.options
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn context(&self) -> &FailoverContext {
        &self.context
    }

    /// Connection-group lock shared with the calling proxy.
    pub fn lock(&self) -> &Arc<Mutex<()>> {
        &self.lock
    }

    pub fn failover_loop_retries(&self) -> u32 {
        self.options.failover_loop_retries
    }

    pub fn retries_all_down(&self) -> u32 {
        self.options.retries_all_down
    }

    pub fn is_auto_reconnect(&self) -> bool {
        self.options.auto_reconnect
    }

    pub fn blacklist_timeout(&self) -> Duration {
        self.options.blacklist_timeout()
    }

    pub fn current_protocol(&self) -> Option<Arc<dyn Protocol>> {
        self.current.load_full().map(|c| c.protocol.clone())
    }

    pub fn current_host(&self) -> Option<HostAddress> {
        self.current.load_full().map(|c| c.host.clone())
    }

    /// True when there is no usable connection.
    pub fn is_closed(&self) -> bool {
        self.current_protocol().map_or(true, |p| p.is_closed())
    }

    pub fn is_read_only(&self) -> bool {
        self.state.read_only()
    }

    pub fn is_explicitly_closed(&self) -> bool {
        self.state.is_explicitly_closed()
    }

    pub fn has_host_fail(&self) -> bool {
        self.state.has_host_fail()
    }

    pub fn master_host_fail_timestamp(&self) -> u64 {
        self.state.fail_timestamp()
    }

    pub fn connection_attempts(&self) -> u32 {
        self.state.attempts()
    }

    pub fn is_looping(&self) -> bool {
        self.state.is_looping()
    }

    pub fn fail_loop(&self) -> &Arc<FailLoop> {
        &self.fail_loop
    }

    /// Whether the session cannot continue without a primary.
    pub fn requires_primary(&self) -> bool {
        self.strategy.requires_primary(self.is_read_only())
    }

    /// Filter for a background attempt: restricted to the failed kind of
    /// host while the failure lasts.
    pub fn filter_for_failed_host(&self) -> SearchFilter {
        SearchFilter::new(self.has_host_fail(), false)
    }
}

/// Prefer [`FailoverListener::close`]: dropping an open listener closes its
/// connection in a background task, and only when a Tokio runtime is running.
impl Drop for FailoverListener {
    fn drop(&mut self) {
        if self.state.stop_looping() {
            self.context.scheduler().cancel(&self.fail_loop_task);
        }
        if let Some(active) = self.current.swap(None) {
            if !active.protocol.is_closed() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move { active.protocol.close().await });
                    }
                    Err(_) => {
                        tracing::warn!(listener = %self.id, "Listener dropped outside a runtime, connection left open");
                    }
                }
            }
        }
        self.release();
    }
}

async fn set_session_read_only(protocol: &dyn Protocol, read_only: bool) -> Result<(), ProtocolError> {
    if !protocol.version_greater_or_equal(10, 0, 0) {
        return Ok(());
    }
    let mode = if read_only { "READ ONLY" } else { "READ WRITE" };
    protocol
        .execute_query(&Query::new(format!("SET SESSION TRANSACTION {}", mode)))
        .await?;
    Ok(())
}
