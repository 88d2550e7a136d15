//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports valid, hosts present)
//! - Check the host list fits the topology
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DriverConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{DriverConfig, Topology};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DriverConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.hosts.is_empty() {
        errors.push(ValidationError::new("hosts", "at least one host is required"));
    }

    let mut seen = HashSet::new();
    for (i, host) in config.hosts.iter().enumerate() {
        if host.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("hosts[{}].host", i), "must not be empty"));
        }
        if host.port == 0 {
            errors.push(ValidationError::new(format!("hosts[{}].port", i), "must be non-zero"));
        }
        if !seen.insert((host.host.as_str(), host.port)) {
            errors.push(ValidationError::new(
                format!("hosts[{}]", i),
                format!("duplicate host {}", host),
            ));
        }
    }

    if config.topology == Topology::MultiHost
        && !config.hosts.is_empty()
        && !config.hosts.iter().any(|h| h.is_primary())
    {
        errors.push(ValidationError::new(
            "topology",
            "multi-host topology requires at least one primary host",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
