//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Process start:
//!     FailoverContext::new() → scheduler resize worker spawned
//!
//! Process teardown (shutdown.rs):
//!     FailoverContext::shutdown() → broadcast → resize worker exits
//!                                 → scheduled loops cancelled
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
