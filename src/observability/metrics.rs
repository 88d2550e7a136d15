//! Metrics collection.
//!
//! # Metrics
//! - `failover_primary_failures_total` (counter): failure episodes by host
//! - `failover_reconnect_attempts_total` (counter): attempts by outcome
//! - `failover_replays_total` (counter): replays by operation kind and outcome
//! - `failover_blacklist_size` (gauge): hosts currently blacklisted
//! - `failover_scheduler_workers` (gauge): shared pool capacity
//! - `failover_active_loops` (gauge): registered reconnection loops
//!
//! Nothing is exported unless the embedding application installs a recorder.

use metrics::{counter, gauge};

pub fn record_primary_failure(host: &str) {
    counter!("failover_primary_failures_total", "host" => host.to_string()).increment(1);
}

pub fn record_reconnect_attempt(outcome: &'static str) {
    counter!("failover_reconnect_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_replay(kind: &'static str, outcome: &'static str) {
    counter!("failover_replays_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_blacklist_size(size: usize) {
    gauge!("failover_blacklist_size").set(size as f64);
}

pub fn record_scheduler_workers(size: usize) {
    gauge!("failover_scheduler_workers").set(size as f64);
}

pub fn record_active_loops(count: usize) {
    gauge!("failover_active_loops").set(count as f64);
}
