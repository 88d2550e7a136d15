//! Host addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default server port when a host string carries none.
pub const DEFAULT_PORT: u16 = 3306;

/// Role of a host inside the configured topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    #[default]
    Primary,
    Replica,
}

/// A database server endpoint. Identity is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub role: HostRole,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16, role: HostRole) -> Self {
        Self {
            host: host.into(),
            port,
            role,
        }
    }

    pub fn primary(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, HostRole::Primary)
    }

    pub fn replica(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, HostRole::Replica)
    }

    pub fn is_primary(&self) -> bool {
        self.role == HostRole::Primary
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error returned when a `host[:port]` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid host address '{0}'")]
pub struct ParseHostError(pub String);

impl FromStr for HostAddress {
    type Err = ParseHostError;

    /// Parses `host` or `host:port`. The role defaults to primary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| ParseHostError(s.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ParseHostError(s.to_string()));
        }
        Ok(Self::primary(host, port))
    }
}
