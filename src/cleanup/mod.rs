//! The cleanup decision-and-execution engine.
//!
//! A run is strictly sequential by stage:
//!
//! 1. **Scan** — enumerate candidate units from the homeserver.
//! 2. **Evaluate** — classify the inventory against the active policy into
//!    an ordered deletion plan.
//! 3. **Execute** — apply the plan with bounded concurrency, honoring
//!    dry-run and isolating per-item failures.
//! 4. **Report** — aggregate outcomes into a [`RunReport`].
//!
//! Scan and evaluation failures are fatal and abort the run; execution
//! failures never are. A run that scanned successfully always yields a
//! report, even when cancelled partway through.

pub mod executor;
pub mod limiter;
pub mod policy;
pub mod report;
pub mod retry;
pub mod scanner;

use std::{fmt, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use executor::execute;
pub use limiter::RateLimiter;
pub use policy::{EvaluationError, evaluate};
pub use report::{RunReport, summarize};
pub use scanner::{ScanError, ScanFilters, scan};

use crate::{
    client::{ClientError, HomeserverClient},
    config::CustodianConfig,
};

/// The cleanup policy driving a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Delete content strictly older than a configured age.
    Retention,
    /// Delete content to reclaim a target amount of storage.
    Pressure,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retention => f.write_str("retention"),
            Self::Pressure => f.write_str("pressure"),
        }
    }
}

/// What kind of homeserver object a unit refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Room,
    Media,
    Event,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room => f.write_str("room"),
            Self::Media => f.write_str("media"),
            Self::Event => f.write_str("event"),
        }
    }
}

/// A candidate for deletion, created fresh by each scan and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupUnit {
    /// Opaque identifier (room id, `mxc://` URI, `room/event` ref).
    pub id: String,
    pub kind: UnitKind,
    /// Best-effort size estimate; 0 when the homeserver reported none.
    pub size_bytes: u64,
    /// Most recent activity. `None` means unknown age: never eligible
    /// under retention, lowest priority under pressure.
    pub last_activity: Option<DateTime<Utc>>,
    /// Never eligible for deletion, regardless of policy.
    pub protected: bool,
}

/// Why a unit was planned for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    RetentionExpired,
    PressureSelected,
}

/// A unit paired with the decision to delete it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionPlanItem {
    pub unit: CleanupUnit,
    pub reason: DeletionReason,
    /// Human-readable explanation: age in days, or rank and bytes freed.
    pub justification: String,
}

/// Outcome of executing one plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The deletion call succeeded.
    Deleted,
    /// Dry-run: the deletion was simulated, no call was made.
    Simulated,
    /// The deletion failed terminally; see the attached error.
    Failed,
    /// The run was cancelled before this item was dispatched.
    Skipped,
}

/// Failure classes for a single plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Transient network failure or timeout; retried before giving up.
    Transient,
    /// Homeserver throttling; retried before giving up.
    RateLimited,
    /// The unit was already gone. Distinguished so callers can tell
    /// "already gone" from "couldn't delete".
    NotFound,
    PermissionDenied,
    Unknown,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::RateLimited => f.write_str("rate_limited"),
            Self::NotFound => f.write_str("not_found"),
            Self::PermissionDenied => f.write_str("permission_denied"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Terminal error for a failed plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl From<ClientError> for ExecutionError {
    fn from(error: ClientError) -> Self {
        let kind = match &error {
            ClientError::Network(_) | ClientError::Timeout(_) => ExecutionErrorKind::Transient,
            ClientError::RateLimited { .. } => ExecutionErrorKind::RateLimited,
            ClientError::NotFound(_) => ExecutionErrorKind::NotFound,
            ClientError::PermissionDenied(_) => ExecutionErrorKind::PermissionDenied,
            ClientError::Unknown(_) => ExecutionErrorKind::Unknown,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// One outcome per plan item, in plan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub item: DeletionPlanItem,
    pub status: ExecutionStatus,
    /// Present iff `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

/// Fatal run failure. Per-item failures are never fatal; they live in the
/// report's results instead.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Run a full cleanup pass: scan, evaluate, execute, report.
///
/// The single entry point of the engine. Synchronous from the caller's
/// perspective regardless of internal concurrency; `cancel` stops new
/// dispatches while letting in-flight calls finish, and a cancelled run
/// still returns its (partial) report.
pub async fn run_cleanup(
    mode: PolicyMode,
    config: &CustodianConfig,
    client: Arc<dyn HomeserverClient>,
    cancel: CancellationToken,
) -> Result<RunReport, CleanupError> {
    let started = Instant::now();
    let run_id = uuid::Uuid::new_v4();
    let dry_run = config.cleanup.dry_run;
    let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(%run_id, mode = %mode, dry_run, "Starting cleanup run{}", dry_run_msg);

    let filters = ScanFilters::from_config(&config.cleanup);
    let units = scan(client.as_ref(), &filters).await?;
    let total_scanned = units.len();

    let plan = evaluate(&units, mode, &config.cleanup, Utc::now())?;
    let planned_bytes: u64 = plan.iter().map(|item| item.unit.size_bytes).sum();
    tracing::info!(
        %run_id,
        planned = plan.len(),
        planned_bytes,
        "Deletion plan computed"
    );

    let limiter = Arc::new(RateLimiter::new(config.execution.min_request_interval()));
    let results = execute(plan, client, dry_run, &config.execution, limiter, cancel).await;

    let mut report = summarize(mode, dry_run, total_scanned, results);
    report.duration_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        %run_id,
        scanned = report.total_scanned,
        planned = report.total_planned,
        deleted = report.total_deleted,
        failed = report.total_failed,
        skipped = report.total_skipped,
        bytes_reclaimed = report.bytes_reclaimed,
        duration_ms = report.duration_ms,
        "Cleanup run complete{}",
        dry_run_msg
    );

    Ok(report)
}
