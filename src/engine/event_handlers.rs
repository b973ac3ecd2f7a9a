// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::engine::state::{TaskState, TaskStates};
use crate::engine::{RuntimeOptions, TaskName, TaskOutcome, TriggerReason};
use crate::types::ReloadKind;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Hand this task to the executor.
    DispatchTask(TaskName),
    /// Tell connected browsers to refresh.
    Notify {
        kind: ReloadKind,
        paths: Vec<PathBuf>,
    },
    /// Request that the process exits (`exit_when_idle`).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a task trigger event.
///
/// - Idle or failed tasks start running immediately.
/// - A running task records a single pending re-run; further triggers while
///   it is still running are absorbed into that one re-run.
pub fn handle_task_trigger(
    states: &mut TaskStates,
    task: TaskName,
    reason: TriggerReason,
) -> CoreStep {
    let Some(slot) = states.get_mut(&task) else {
        warn!(task = %task, "trigger for unknown task ignored");
        return CoreStep::running(Vec::new());
    };

    match slot.state {
        TaskState::Running => {
            debug!(task = %task, ?reason, "task running; coalescing trigger into one re-run");
            slot.pending_rerun = true;
            CoreStep::running(Vec::new())
        }
        TaskState::Idle | TaskState::Failed => {
            debug!(task = %task, ?reason, "dispatching task");
            slot.state = TaskState::Running;
            CoreStep::running(vec![CoreCommand::DispatchTask(task)])
        }
    }
}

/// Handle a task completion event.
pub fn handle_task_completion(
    states: &mut TaskStates,
    options: &RuntimeOptions,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(slot) = states.get_mut(&task) else {
        warn!(task = %task, "completion for unknown task ignored");
        return CoreStep::running(commands);
    };

    match outcome {
        TaskOutcome::Success { outputs } => {
            slot.state = TaskState::Idle;
            if let Some(kind) = slot.reload {
                commands.push(CoreCommand::Notify {
                    kind,
                    paths: outputs,
                });
            }
        }
        TaskOutcome::Skipped => {
            slot.state = TaskState::Idle;
        }
        TaskOutcome::Failed(message) => {
            error!(task = %task, error = %message, "task failed; keeping watch loop alive");
            slot.state = TaskState::Failed;
        }
    }

    if slot.pending_rerun {
        slot.pending_rerun = false;
        slot.state = TaskState::Running;
        debug!(task = %task, "running coalesced re-run");
        commands.push(CoreCommand::DispatchTask(task));
    }

    let mut keep_running = true;
    if options.exit_when_idle && states.is_idle() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}

/// Forward a direct reload request.
pub fn handle_reload(kind: ReloadKind, paths: Vec<PathBuf>) -> CoreStep {
    CoreStep::running(vec![CoreCommand::Notify { kind, paths }])
}
