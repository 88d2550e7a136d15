//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Failover components produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Structured logging with listener id and host fields
//! - Metrics are cheap and no-ops without a recorder

pub mod logging;
pub mod metrics;
