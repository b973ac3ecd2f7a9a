// src/engine/mod.rs

//! Incremental rebuild engine.
//!
//! This module ties together:
//! - per-task run state (`Idle`, `Running`, `Failed`) with at most one
//!   coalesced re-run per task
//! - the main runtime event loop that reacts to:
//!   - file-watch triggers
//!   - task completion events
//!   - direct reload requests
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;

use crate::types::ReloadKind;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a dispatched task as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The transform ran and wrote these files.
    Success { outputs: Vec<PathBuf> },
    /// Outputs were already up to date.
    Skipped,
    /// The transform failed; the message is already logged.
    Failed(String),
}

/// Why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Manual trigger (`run`, tests).
    Manual,
    /// Triggered due to a filesystem event.
    FileWatch,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no task is running and no re-run is
    /// pending.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from watchers, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task should be (re-)run.
    TaskTriggered {
        task: TaskName,
        reason: TriggerReason,
    },
    /// A dispatched task finished.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// A watch binding without tasks asks browsers to reload.
    ReloadRequested {
        kind: ReloadKind,
        paths: Vec<PathBuf>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod state;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{RunSummary, Runtime};
pub use state::{TaskSlot, TaskState};
