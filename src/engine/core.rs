// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated per-task state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - dispatching tasks to the executor
//! - pushing reload notifications
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::engine::event_handlers::{
    handle_reload, handle_task_completion, handle_task_trigger, CoreStep,
};
use crate::engine::state::{TaskSlot, TaskStates};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::registry::TaskRegistry;
use crate::types::ReloadKind;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    states: TaskStates,
    options: RuntimeOptions,
}

impl CoreRuntime {
    /// `tasks` lists every task name with the reload kind sent after a
    /// successful run.
    pub fn new(
        tasks: impl IntoIterator<Item = (String, Option<ReloadKind>)>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            states: TaskStates::new(tasks),
            options,
        }
    }

    pub fn from_registry(registry: &TaskRegistry, options: RuntimeOptions) -> Self {
        Self::new(
            registry
                .tasks()
                .map(|task| (task.name().to_string(), task.reload())),
            options,
        )
    }

    /// No task running and no re-run pending.
    pub fn is_idle(&self) -> bool {
        self.states.is_idle()
    }

    pub fn slot(&self, task: &str) -> Option<&TaskSlot> {
        self.states.get(task)
    }

    /// Tasks whose most recent run failed.
    pub fn failed_tasks(&self) -> Vec<String> {
        self.states.failed()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskTriggered { task, reason } => {
                handle_task_trigger(&mut self.states, task, reason)
            }
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.states, &self.options, task, outcome)
            }
            RuntimeEvent::ReloadRequested { kind, paths } => handle_reload(kind, paths),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
