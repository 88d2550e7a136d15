//! Failover core of a database client driver.
//!
//! Detects loss of the active host, reconnects to an alternate one and
//! resumes the operation in flight when it is safe to do so.

pub mod config;
pub mod failover;
pub mod lifecycle;
pub mod observability;
pub mod protocol;

pub use config::schema::DriverConfig;
pub use failover::{FailoverContext, FailoverError, FailoverListener, HandleErrorResult};
pub use lifecycle::Shutdown;
