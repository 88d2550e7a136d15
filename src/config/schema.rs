//! Configuration schema definitions.
//!
//! This module defines the configuration structure for a failover-enabled
//! connection group. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::protocol::HostAddress;

/// Root configuration for one logical connection group.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DriverConfig {
    /// Hosts, in preference order. Entries are tables or `host[:port]`
    /// strings.
    #[serde(deserialize_with = "deserialize_hosts")]
    pub hosts: Vec<HostAddress>,

    /// How hosts relate to each other.
    pub topology: Topology,

    /// Failover behaviour.
    pub failover: FailoverOptions,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Address(String),
    Table(HostAddress),
}

fn deserialize_hosts<'de, D>(deserializer: D) -> Result<Vec<HostAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<HostEntry>::deserialize(deserializer)?
        .into_iter()
        .map(|entry| match entry {
            HostEntry::Address(s) => s.parse().map_err(serde::de::Error::custom),
            HostEntry::Table(host) => Ok(host),
        })
        .collect()
}

/// Host topology, selecting the failover strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// One active primary at a time; other hosts are failover candidates.
    #[default]
    SingleHost,
    /// Primaries and replicas; read-only sessions tolerate a missing primary.
    MultiHost,
}

/// Failover options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverOptions {
    /// Background loop attempt ceiling. 0 disables the loop entirely.
    #[serde(alias = "failoverLoopRetries")]
    pub failover_loop_retries: u32,

    /// Attempt ceiling when every host is down (replica-tolerant sessions).
    #[serde(alias = "retriesAllDown")]
    pub retries_all_down: u32,

    /// Seconds before a blacklisted host is eligible again.
    #[serde(alias = "blacklistTimeout", alias = "loadBalanceBlacklistTimeout")]
    pub blacklist_timeout_secs: u64,

    /// Reconnect automatically before executing on a closed connection.
    #[serde(alias = "autoReconnect")]
    pub auto_reconnect: bool,
}

impl FailoverOptions {
    pub fn blacklist_timeout(&self) -> Duration {
        Duration::from_secs(self.blacklist_timeout_secs)
    }
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            failover_loop_retries: 120,
            retries_all_down: 120,
            blacklist_timeout_secs: 50,
            auto_reconnect: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
