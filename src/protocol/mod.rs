//! Connection collaborator interfaces.
//!
//! # Data Flow
//! ```text
//! Proxy call (query, prepared statement, command)
//!     → query.rs (tagged Operation value)
//!     → connection.rs (Protocol trait, implemented by the wire layer)
//!     → host.rs (HostAddress of the server behind the connection)
//! ```
//!
//! # Design Decisions
//! - The failover core never speaks the wire protocol itself
//! - Connections are opened through a `Connector` so the core can pick hosts
//! - Operations are plain values, dispatched by pattern matching

pub mod connection;
pub mod host;
pub mod query;

pub use connection::{Connector, IsolationLevel, Protocol, ProtocolError};
pub use host::{HostAddress, HostRole};
pub use query::{Command, Operation, Outcome, Parameter, PreparedQuery, Query, QueryResult};
