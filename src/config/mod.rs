//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DriverConfig (validated, immutable)
//!     → FailoverOptions handed to each FailoverListener
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Option names from connection strings (camelCase) are accepted as aliases

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::DriverConfig;
pub use schema::FailoverOptions;
pub use schema::ObservabilityConfig;
pub use schema::Topology;
