//! Values exchanged between the listener and its callers.

use serde::Serialize;
use uuid::Uuid;

use crate::failover::error::{FailoverError, FailoverResult};
use crate::protocol::{Outcome, ProtocolError};

/// Eligible targets for one reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFilter {
    /// Only look for the kind of host that failed (a primary).
    pub failed_host_only: bool,
    /// Make a single pass over the candidates instead of cycling.
    pub unique_attempt: bool,
}

impl SearchFilter {
    pub fn new(failed_host_only: bool, unique_attempt: bool) -> Self {
        Self {
            failed_host_only,
            unique_attempt,
        }
    }

    pub fn with_unique_attempt(mut self) -> Self {
        self.unique_attempt = true;
        self
    }
}

/// Outcome of one failure-handling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleErrorResult {
    /// The caller must surface its original error.
    pub must_throw_error: bool,
    /// Result of the replayed operation when it was resumed.
    pub result: Option<Outcome>,
}

impl HandleErrorResult {
    pub fn must_throw() -> Self {
        Self {
            must_throw_error: true,
            result: None,
        }
    }

    pub fn replayed(outcome: Outcome) -> Self {
        Self {
            must_throw_error: false,
            result: Some(outcome),
        }
    }

    /// Resolve the cycle for the caller: the replayed outcome, or the
    /// original error untouched.
    pub fn into_result(self, original: ProtocolError) -> FailoverResult<Outcome> {
        if self.must_throw_error {
            return Err(FailoverError::Connection(original));
        }
        Ok(self.result.unwrap_or(Outcome::Done))
    }
}

/// Listener state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerPhase {
    Healthy,
    Failed,
    Closed,
}

/// Point-in-time view of a listener, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub id: Uuid,
    pub phase: ListenerPhase,
    pub host: Option<String>,
    pub master_host_fail_timestamp: u64,
    pub connection_attempts: u32,
    pub looping: bool,
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QueryResult;

    #[test]
    fn test_unique_attempt_builder() {
        let filter = SearchFilter::new(true, false).with_unique_attempt();
        assert!(filter.failed_host_only);
        assert!(filter.unique_attempt);
    }

    #[test]
    fn test_into_result_passes_original_error() {
        let original = ProtocolError::Connection("reset".into());
        let err = HandleErrorResult::must_throw().into_result(original.clone()).unwrap_err();
        match err {
            FailoverError::Connection(e) => assert_eq!(e, original),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_into_result_returns_replayed_outcome() {
        let outcome = Outcome::Rows(QueryResult {
            affected_rows: 1,
            rows: Vec::new(),
        });
        let resolved = HandleErrorResult::replayed(outcome.clone())
            .into_result(ProtocolError::Closed)
            .unwrap();
        assert_eq!(resolved, outcome);
    }

    #[test]
    fn test_phase_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ListenerPhase::Failed).unwrap(), "\"FAILED\"");
    }
}
