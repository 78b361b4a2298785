//! Run reporter: aggregates execution outcomes into a run report.

use serde::Serialize;

use crate::cleanup::{ExecutionResult, ExecutionStatus, PolicyMode};

/// Aggregate of a completed cleanup run.
///
/// This is the engine's external contract: the thin CLI/bot layer
/// serializes it as-is into a log line or chat message. A non-zero
/// `total_failed` is a partial outcome, not a fatal one.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: PolicyMode,
    pub dry_run: bool,
    pub total_scanned: u64,
    pub total_planned: u64,
    pub total_deleted: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    /// Bytes freed by deleted units, or that would be freed by simulated
    /// ones. Failed and skipped units contribute nothing.
    pub bytes_reclaimed: u64,
    pub duration_ms: u64,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    /// Whether any item failed terminally.
    pub fn has_failures(&self) -> bool {
        self.total_failed > 0
    }
}

/// Pure aggregation of execution results into a report. No I/O.
pub fn summarize(
    mode: PolicyMode,
    dry_run: bool,
    total_scanned: usize,
    results: Vec<ExecutionResult>,
) -> RunReport {
    let mut total_deleted = 0u64;
    let mut total_failed = 0u64;
    let mut total_skipped = 0u64;
    let mut bytes_reclaimed = 0u64;

    for result in &results {
        match result.status {
            ExecutionStatus::Deleted => {
                total_deleted += 1;
                bytes_reclaimed += result.item.unit.size_bytes;
            }
            ExecutionStatus::Simulated => {
                bytes_reclaimed += result.item.unit.size_bytes;
            }
            ExecutionStatus::Failed => total_failed += 1,
            ExecutionStatus::Skipped => total_skipped += 1,
        }
    }

    RunReport {
        mode,
        dry_run,
        total_scanned: total_scanned as u64,
        total_planned: results.len() as u64,
        total_deleted,
        total_failed,
        total_skipped,
        bytes_reclaimed,
        duration_ms: 0,
        results,
    }
}
