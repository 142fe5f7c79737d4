//! Run a unit of work under a wall-clock budget.
//!
//! Semantic scoring must never hold up keyword results, so it runs on its
//! own task with a hard budget. The timeout policy lives here, separate
//! from scoring logic, so it can be tested in isolation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Spawn `task` and wait at most `budget` for it to finish.
///
/// Returns `None` when the budget expires or the task panics; the spawned
/// task is aborted on expiry rather than left running. Callers substitute
/// their fallback for `None`.
pub async fn run_with_budget<T, F>(budget: Duration, task: F) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(task);
    let abort = handle.abort_handle();

    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(join_err)) => {
            warn!("budgeted task failed: {}", join_err);
            None
        }
        Err(_elapsed) => {
            abort.abort();
            None
        }
    }
}
