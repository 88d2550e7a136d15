//! Failover error definitions.

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors surfaced by the failover core.
#[derive(Debug, Error)]
pub enum FailoverError {
    /// Operation attempted after the listener was explicitly closed.
    #[error("Connection has been closed")]
    ConnectionClosed,

    /// The background loop reached its attempt ceiling.
    #[error("Too many reconnection attempts ({attempts} of {max})")]
    TooManyAttempts { attempts: u32, max: u32 },

    /// The operation is unsafe to re-issue on a new connection.
    #[error("Operation cannot be replayed after failover: {0}")]
    ReplayRejected(String),

    /// Every candidate host refused the connection.
    #[error("No host available after {attempts} connection attempts")]
    NoHostAvailable { attempts: usize },

    /// Communication with the current host failed.
    #[error("Communications link failure with host {host}. Driver has reconnected: {reconnected}")]
    Failover {
        host: String,
        reconnected: bool,
        #[source]
        source: ProtocolError,
    },

    /// Passthrough from the connection collaborator.
    #[error(transparent)]
    Connection(#[from] ProtocolError),
}

/// Result type for failover operations.
pub type FailoverResult<T> = Result<T, FailoverError>;
