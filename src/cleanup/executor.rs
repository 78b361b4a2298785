//! Plan executor: applies the deletion plan against the homeserver.
//!
//! The central reliability guarantee lives here: a failure on one item
//! never aborts the run. Every plan item gets exactly one result, and the
//! result sequence is re-sorted to plan order before reporting, no matter
//! how the worker pool interleaved the calls.

use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cleanup::{
        CleanupUnit, DeletionPlanItem, ExecutionError, ExecutionErrorKind, ExecutionResult,
        ExecutionStatus, UnitKind, limiter::RateLimiter, retry::with_retry,
    },
    client::{ClientError, HomeserverClient},
    config::{ExecutionConfig, RetryConfig},
};

/// Execute the plan, producing one result per item in plan order.
///
/// Dry-run marks every item simulated without touching the network.
/// Cancellation stops new dispatches; in-flight calls complete or time
/// out, and undispatched items are recorded as skipped.
pub async fn execute(
    plan: Vec<DeletionPlanItem>,
    client: Arc<dyn HomeserverClient>,
    dry_run: bool,
    config: &ExecutionConfig,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
) -> Vec<ExecutionResult> {
    if dry_run {
        return plan
            .into_iter()
            .map(|item| {
                info!(
                    unit = %item.unit.id,
                    kind = %item.unit.kind,
                    size_bytes = item.unit.size_bytes,
                    "DRY RUN: Would delete unit"
                );
                ExecutionResult {
                    item,
                    status: ExecutionStatus::Simulated,
                    error: None,
                }
            })
            .collect();
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut workers: JoinSet<(usize, ExecutionResult)> = JoinSet::new();
    let mut slots: Vec<Option<ExecutionResult>> = Vec::with_capacity(plan.len());
    slots.resize_with(plan.len(), || None);
    // Copy of the plan so even a crashed worker leaves a result behind.
    let fallback = plan.clone();

    for (index, item) in plan.into_iter().enumerate() {
        if cancel.is_cancelled() {
            slots[index] = Some(skipped(item));
            continue;
        }

        // Wait for a worker slot before dispatching, so cancellation can
        // still skip items that are queued behind the pool.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                slots[index] = Some(skipped(item));
                continue;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    slots[index] = Some(skipped(item));
                    continue;
                }
            },
        };

        let client = Arc::clone(&client);
        let limiter = Arc::clone(&limiter);
        let retry = config.retry.clone();
        let cancel = cancel.clone();
        workers.spawn(async move {
            let _permit = permit;
            limiter.acquire().await;

            let result = match delete_unit(client.as_ref(), &item.unit, &retry, &cancel).await {
                Ok(()) => {
                    info!(
                        unit = %item.unit.id,
                        kind = %item.unit.kind,
                        size_bytes = item.unit.size_bytes,
                        "Deleted unit"
                    );
                    ExecutionResult {
                        item,
                        status: ExecutionStatus::Deleted,
                        error: None,
                    }
                }
                Err(client_error) => {
                    let exec_error = ExecutionError::from(client_error);
                    warn!(
                        unit = %item.unit.id,
                        kind = %item.unit.kind,
                        error = %exec_error,
                        "Failed to delete unit"
                    );
                    ExecutionResult {
                        item,
                        status: ExecutionStatus::Failed,
                        error: Some(exec_error),
                    }
                }
            };
            (index, result)
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(join_error) => error!(error = %join_error, "Executor worker crashed"),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| ExecutionResult {
                item: fallback[index].clone(),
                status: ExecutionStatus::Failed,
                error: Some(ExecutionError {
                    kind: ExecutionErrorKind::Unknown,
                    message: "executor worker crashed".into(),
                }),
            })
        })
        .collect()
}

/// Dispatch the delete call for a unit's kind, with retries.
async fn delete_unit(
    client: &dyn HomeserverClient,
    unit: &CleanupUnit,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    match unit.kind {
        UnitKind::Room => {
            with_retry(retry, "delete_room", cancel, || client.delete_room(&unit.id)).await
        }
        UnitKind::Media => {
            with_retry(retry, "delete_media", cancel, || {
                client.delete_media(&unit.id)
            })
            .await
        }
        UnitKind::Event => {
            with_retry(retry, "redact_event", cancel, || {
                client.redact_event(&unit.id)
            })
            .await
        }
    }
}

fn skipped(item: DeletionPlanItem) -> ExecutionResult {
    debug!(unit = %item.unit.id, "Run cancelled before dispatch, skipping unit");
    ExecutionResult {
        item,
        status: ExecutionStatus::Skipped,
        error: None,
    }
}
