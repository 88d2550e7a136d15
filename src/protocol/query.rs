//! Operations issued through a connection.
//!
//! An `Operation` captures the call that was in flight when a failure was
//! detected, together with its arguments, so it can be judged and replayed
//! against a new connection.

use std::fmt;

use crate::protocol::connection::{IsolationLevel, Protocol, ProtocolError};

/// A textual statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bound parameter of a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A server-side prepared statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub parameters: Vec<Parameter>,
    /// Binary result protocol requested.
    pub binary: bool,
}

/// Connection-level calls that are neither queries nor prepared executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Commit,
    Rollback,
    SetCatalog(String),
    SetMaxRows(u64),
    SetTransactionIsolation(IsolationLevel),
}

/// The call in flight when a failure was detected.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Query(Query),
    PreparedQuery(PreparedQuery),
    Other(Command),
}

impl Operation {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Query(_) => "query",
            Operation::PreparedQuery(_) => "prepared_query",
            Operation::Other(_) => "command",
        }
    }

    /// Run the operation on `protocol` through its regular entry points.
    pub async fn execute(&self, protocol: &dyn Protocol) -> Result<Outcome, ProtocolError> {
        match self {
            Operation::Query(query) => protocol.execute_query(query).await.map(Outcome::Rows),
            Operation::PreparedQuery(prepared) => protocol
                .execute_prepared_query(prepared)
                .await
                .map(Outcome::Rows),
            Operation::Other(command) => command.execute(protocol).await,
        }
    }
}

impl Command {
    pub async fn execute(&self, protocol: &dyn Protocol) -> Result<Outcome, ProtocolError> {
        match self {
            Command::Ping => protocol.ping().await?,
            Command::Commit => {
                protocol.execute_query(&Query::new("COMMIT")).await?;
            }
            Command::Rollback => {
                protocol.execute_query(&Query::new("ROLLBACK")).await?;
            }
            Command::SetCatalog(catalog) => protocol.set_catalog(catalog).await?,
            Command::SetMaxRows(max_rows) => protocol.set_max_rows(*max_rows).await?,
            Command::SetTransactionIsolation(level) => {
                protocol.set_transaction_isolation(*level).await?
            }
        }
        Ok(Outcome::Done)
    }
}

/// Rows and counters returned by a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub affected_rows: u64,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Result of executing an `Operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Rows(QueryResult),
    Done,
}
