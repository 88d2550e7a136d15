//! Shared utilities for integration tests: an in-memory cluster with
//! programmable per-host failures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use driver_failover::config::FailoverOptions;
use driver_failover::protocol::{
    Connector, HostAddress, IsolationLevel, PreparedQuery, Protocol, ProtocolError, Query,
    QueryResult,
};

/// Pauses a connection inside its session handoff.
///
/// `entered` fires when the handoff reaches `set_max_rows`; the call then
/// blocks until `release` is notified.
#[derive(Clone, Default)]
pub struct HandoffGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory connection to one mock host.
pub struct MockProtocol {
    host: HostAddress,
    closed: AtomicBool,
    broken: AtomicBool,
    in_transaction: AtomicBool,
    prepared_replay_fails: bool,
    max_rows: AtomicU64,
    isolation: Mutex<IsolationLevel>,
    catalog: Mutex<Option<String>>,
    autocommit: AtomicBool,
    executed: Mutex<Vec<String>>,
    gate: Option<HandoffGate>,
}

impl MockProtocol {
    pub fn new(host: HostAddress) -> Self {
        Self {
            host,
            closed: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            prepared_replay_fails: false,
            max_rows: AtomicU64::new(0),
            isolation: Mutex::new(IsolationLevel::Default),
            catalog: Mutex::new(None),
            autocommit: AtomicBool::new(true),
            executed: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every later call fails like a dropped socket.
    pub fn break_connection(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn set_in_transaction(&self, value: bool) {
        self.in_transaction.store(value, Ordering::SeqCst);
    }

    /// Statements received, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), ProtocolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::Closed);
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(ProtocolError::Connection("connection reset by peer".into()));
        }
        Ok(())
    }

    fn answer(&self) -> QueryResult {
        QueryResult {
            affected_rows: 0,
            rows: vec![vec![Some(self.host.to_string())]],
        }
    }
}

#[async_trait]
impl Protocol for MockProtocol {
    fn host_address(&self) -> Option<HostAddress> {
        Some(self.host.clone())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    fn version_greater_or_equal(&self, major: u32, _minor: u32, _patch: u32) -> bool {
        major <= 10
    }

    async fn execute_query(&self, query: &Query) -> Result<QueryResult, ProtocolError> {
        self.check()?;
        let sql = query.as_str().to_string();
        match sql.as_str() {
            "set autocommit=0" => self.autocommit.store(false, Ordering::SeqCst),
            "set autocommit=1" => self.autocommit.store(true, Ordering::SeqCst),
            _ => {}
        }
        self.executed.lock().unwrap().push(sql);
        Ok(self.answer())
    }

    async fn execute_prepared_query(&self, query: &PreparedQuery) -> Result<QueryResult, ProtocolError> {
        self.check()?;
        self.executed.lock().unwrap().push(query.sql.clone());
        Ok(self.answer())
    }

    async fn execute_prepared_query_after_failover(
        &self,
        query: &PreparedQuery,
    ) -> Result<QueryResult, ProtocolError> {
        self.check()?;
        if self.prepared_replay_fails {
            return Err(ProtocolError::Server {
                code: 1243,
                sql_state: "HY000".into(),
                message: "Unknown prepared statement handler".into(),
            });
        }
        self.executed
            .lock()
            .unwrap()
            .push(format!("REPREPARE {}", query.sql));
        Ok(self.answer())
    }

    async fn ping(&self) -> Result<(), ProtocolError> {
        self.check()
    }

    fn max_rows(&self) -> u64 {
        self.max_rows.load(Ordering::SeqCst)
    }

    async fn set_max_rows(&self, max_rows: u64) -> Result<(), ProtocolError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.check()?;
        self.max_rows.store(max_rows, Ordering::SeqCst);
        Ok(())
    }

    fn transaction_isolation(&self) -> IsolationLevel {
        *self.isolation.lock().unwrap()
    }

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<(), ProtocolError> {
        self.check()?;
        *self.isolation.lock().unwrap() = level;
        Ok(())
    }

    fn catalog(&self) -> Option<String> {
        self.catalog.lock().unwrap().clone()
    }

    async fn set_catalog(&self, catalog: &str) -> Result<(), ProtocolError> {
        self.check()?;
        *self.catalog.lock().unwrap() = Some(catalog.to_string());
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct HostBehavior {
    down: bool,
    refuse_next: u32,
}

/// Connector over a set of mock hosts.
#[derive(Default)]
pub struct MockCluster {
    behavior: Mutex<HashMap<HostAddress, HostBehavior>>,
    prepared_replay_fails: AtomicBool,
    attempts: Mutex<Vec<HostAddress>>,
    opened: Mutex<Vec<Arc<MockProtocol>>>,
    next_gate: Mutex<Option<HandoffGate>>,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse every connection to `host` until brought back up.
    pub fn set_down(&self, host: &HostAddress, down: bool) {
        self.behavior
            .lock()
            .unwrap()
            .entry(host.clone())
            .or_default()
            .down = down;
    }

    /// Refuse the next `count` connections to `host`.
    pub fn refuse_next(&self, host: &HostAddress, count: u32) {
        self.behavior
            .lock()
            .unwrap()
            .entry(host.clone())
            .or_default()
            .refuse_next = count;
    }

    /// Connections opened from now on fail prepared statement replay.
    pub fn fail_prepared_replay(&self) {
        self.prepared_replay_fails.store(true, Ordering::SeqCst);
    }

    /// The next connection opened blocks in its handoff until released.
    pub fn hold_next_handoff(&self) -> HandoffGate {
        let gate = HandoffGate::default();
        *self.next_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Every connection attempt, successful or not.
    pub fn attempts(&self) -> Vec<HostAddress> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_to(&self, host: &HostAddress) -> usize {
        self.attempts().iter().filter(|h| *h == host).count()
    }

    /// Most recently opened connection.
    pub fn last_connection(&self) -> Arc<MockProtocol> {
        self.opened
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection opened")
    }

    pub fn connections(&self) -> Vec<Arc<MockProtocol>> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockCluster {
    async fn connect(&self, host: &HostAddress) -> Result<Arc<dyn Protocol>, ProtocolError> {
        self.attempts.lock().unwrap().push(host.clone());

        {
            let mut behavior = self.behavior.lock().unwrap();
            let entry = behavior.entry(host.clone()).or_default();
            if entry.down {
                return Err(ProtocolError::Connection(format!("{} refused connection", host)));
            }
            if entry.refuse_next > 0 {
                entry.refuse_next -= 1;
                return Err(ProtocolError::Connection(format!("{} refused connection", host)));
            }
        }

        let mut protocol = MockProtocol::new(host.clone());
        protocol.prepared_replay_fails = self.prepared_replay_fails.load(Ordering::SeqCst);
        protocol.gate = self.next_gate.lock().unwrap().take();
        let protocol = Arc::new(protocol);
        self.opened.lock().unwrap().push(protocol.clone());
        Ok(protocol)
    }
}

pub fn host(name: &str) -> HostAddress {
    HostAddress::primary(name, 3306)
}

pub fn replica(name: &str) -> HostAddress {
    HostAddress::replica(name, 3306)
}

/// Options with small, test-friendly ceilings.
pub fn options(failover_loop_retries: u32, retries_all_down: u32) -> FailoverOptions {
    FailoverOptions {
        failover_loop_retries,
        retries_all_down,
        ..FailoverOptions::default()
    }
}
