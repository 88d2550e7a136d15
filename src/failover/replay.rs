//! Replay of the operation in flight when the connection failed.
//!
//! # Responsibilities
//! - Decide whether an operation is safe to re-issue on a new connection
//! - Re-issue it and hand the outcome back to the caller
//!
//! # Design Decisions
//! - Statements that crash or kill server sessions are never replayed
//! - Prepared statements are re-prepared: server statement ids die with the
//!   old session; any failure there surfaces the original error instead
//! - Other replay errors propagate to the caller

use crate::failover::error::{FailoverError, FailoverResult};
use crate::failover::types::HandleErrorResult;
use crate::observability::metrics;
use crate::protocol::{Operation, Outcome, Protocol, Query};

/// Reject statements that are unsafe to send twice.
pub fn check_replayable(query: &Query) -> FailoverResult<()> {
    let statement = query.as_str().trim_start().to_uppercase();
    if statement == "ALTER SYSTEM CRASH" || statement.starts_with("KILL") {
        return Err(FailoverError::ReplayRejected(query.to_string()));
    }
    Ok(())
}

/// Re-issue `operation` against `protocol`.
///
/// `Ok(must_throw)` means the caller keeps its original error; `Err` is a
/// failure of the replay itself.
pub async fn relaunch_operation(
    protocol: &dyn Protocol,
    operation: Option<&Operation>,
) -> FailoverResult<HandleErrorResult> {
    let Some(operation) = operation else {
        return Ok(HandleErrorResult::must_throw());
    };
    let kind = operation.kind();

    match operation {
        Operation::Query(query) => {
            if let Err(e) = check_replayable(query) {
                tracing::debug!(error = %e, "Query not replayed");
                metrics::record_replay(kind, "rejected");
                return Ok(HandleErrorResult::must_throw());
            }
            let rows = protocol.execute_query(query).await.inspect_err(|_| {
                metrics::record_replay(kind, "failed");
            })?;
            metrics::record_replay(kind, "replayed");
            Ok(HandleErrorResult::replayed(Outcome::Rows(rows)))
        }
        Operation::PreparedQuery(prepared) => {
            match protocol.execute_prepared_query_after_failover(prepared).await {
                Ok(rows) => {
                    metrics::record_replay(kind, "replayed");
                    Ok(HandleErrorResult::replayed(Outcome::Rows(rows)))
                }
                Err(e) => {
                    tracing::debug!(error = %e, sql = %prepared.sql, "Prepared statement replay failed");
                    metrics::record_replay(kind, "failed");
                    Ok(HandleErrorResult::must_throw())
                }
            }
        }
        Operation::Other(command) => {
            let outcome = command.execute(protocol).await.inspect_err(|_| {
                metrics::record_replay(kind, "failed");
            })?;
            metrics::record_replay(kind, "replayed");
            Ok(HandleErrorResult::replayed(outcome))
        }
    }
}
