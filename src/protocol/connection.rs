//! Connection traits consumed by the failover core.
//!
//! # Responsibilities
//! - Describe what the core needs from a live server connection
//! - Describe how the core opens a connection to a chosen host
//!
//! Implementations live in the wire-protocol layer; tests provide mocks.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::host::HostAddress;
use crate::protocol::query::{PreparedQuery, Query, QueryResult};

/// Errors raised by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Network-level failure talking to the server.
    #[error("Communications link failure: {0}")]
    Connection(String),

    /// The connection was already closed.
    #[error("Connection is closed")]
    Closed,

    /// The server answered with an error.
    #[error("Server error {code} ({sql_state}): {message}")]
    Server {
        code: u16,
        sql_state: String,
        message: String,
    },
}

impl ProtocolError {
    /// True when the error means the connection itself is lost.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ProtocolError::Connection(_) | ProtocolError::Closed)
    }
}

/// Transaction isolation level. `Default` means the server default was never overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn is_default(&self) -> bool {
        *self == IsolationLevel::Default
    }

    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            IsolationLevel::Default => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }
}

/// A live connection to one server.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Address of the server this connection talks to.
    fn host_address(&self) -> Option<HostAddress>;

    fn is_closed(&self) -> bool;

    fn in_transaction(&self) -> bool;

    fn version_greater_or_equal(&self, major: u32, minor: u32, patch: u32) -> bool;

    async fn execute_query(&self, query: &Query) -> Result<QueryResult, ProtocolError>;

    async fn execute_prepared_query(&self, query: &PreparedQuery) -> Result<QueryResult, ProtocolError>;

    /// Re-prepare and execute on a connection that never saw the statement.
    async fn execute_prepared_query_after_failover(
        &self,
        query: &PreparedQuery,
    ) -> Result<QueryResult, ProtocolError>;

    async fn ping(&self) -> Result<(), ProtocolError>;

    fn max_rows(&self) -> u64;

    async fn set_max_rows(&self, max_rows: u64) -> Result<(), ProtocolError>;

    fn transaction_isolation(&self) -> IsolationLevel;

    async fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<(), ProtocolError>;

    /// Currently selected database, if any.
    fn catalog(&self) -> Option<String>;

    async fn set_catalog(&self, catalog: &str) -> Result<(), ProtocolError>;

    fn autocommit(&self) -> bool;

    async fn close(&self);
}

/// Opens connections to hosts chosen by the failover core.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &HostAddress) -> Result<Arc<dyn Protocol>, ProtocolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failure_classification() {
        assert!(ProtocolError::Closed.is_connection_failure());
        assert!(ProtocolError::Connection("reset".into()).is_connection_failure());
        let server = ProtocolError::Server {
            code: 1064,
            sql_state: "42000".into(),
            message: "syntax".into(),
        };
        assert!(!server.is_connection_failure());
    }

    #[test]
    fn test_isolation_sql() {
        assert!(IsolationLevel::Default.is_default());
        assert_eq!(IsolationLevel::Serializable.as_sql(), Some("SERIALIZABLE"));
        assert_eq!(IsolationLevel::Default.as_sql(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::Connection("connection reset".into());
        assert_eq!(err.to_string(), "Communications link failure: connection reset");
    }
}
