//! Failover core.
//!
//! # Data Flow
//! ```text
//! Operation fails on the current connection
//!     → listener.rs (first caller flips the fail flag, blacklists the host)
//!     → strategy.rs (inline search for a new primary)
//!         - success: sync.rs (session handoff) → replay.rs (resume the caller)
//!         - failure: fail_loop.rs armed on the shared scheduler.rs pool
//!     → fail_loop.rs retries every 250ms until reconnected or closed
//! ```
//!
//! # Design Decisions
//! - Blacklist and scheduler are shared through an explicit `FailoverContext`
//! - Every state transition is a single atomic compare-and-swap
//! - Background failures are logged and swallowed; only the caller's own
//!   failure handling can surface an error

pub mod blacklist;
pub mod clock;
pub mod context;
pub mod error;
pub mod fail_loop;
pub mod listener;
pub mod replay;
pub mod scheduler;
mod state;
pub mod strategy;
pub mod sync;
pub mod types;

pub use blacklist::BlacklistRegistry;
pub use clock::MonotonicClock;
pub use context::FailoverContext;
pub use error::{FailoverError, FailoverResult};
pub use fail_loop::FailLoop;
pub use listener::{FailoverListener, FAIL_LOOP_PERIOD};
pub use scheduler::{ScheduledTask, SchedulerPool, TaskId};
pub use strategy::{MultiHostStrategy, SingleHostStrategy, Strategy};
pub use types::{HandleErrorResult, ListenerPhase, ListenerStatus, SearchFilter};
