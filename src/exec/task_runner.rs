// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::engine::{RuntimeEvent, TaskName, TaskOutcome};
use crate::errors::BuildError;
use crate::registry::{TaskRegistry, TaskRun};

/// Run one task through the registry and report a `TaskCompleted` event.
///
/// Failures are logged here, with task name, file and cause, and reported
/// as [`TaskOutcome::Failed`]; they never propagate further.
pub async fn run_task(
    registry: Arc<TaskRegistry>,
    task: TaskName,
    force: bool,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let outcome = match registry.run_if_stale(&task, force).await {
        Ok(TaskRun::Ran(report)) => TaskOutcome::Success {
            outputs: report.output_paths(),
        },
        Ok(TaskRun::Skipped(_)) => TaskOutcome::Skipped,
        Err(err) => {
            log_failure(&err);
            TaskOutcome::Failed(err.to_string())
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        info!(task = %task, "runtime gone; dropping completion");
    }
}

fn log_failure(err: &BuildError) {
    match err {
        BuildError::Transform(t) => error!(
            task = %t.task,
            path = ?t.path,
            cause = %format!("{:#}", t.cause),
            "task failed"
        ),
        other => error!(error = %other, "task failed"),
    }
}
