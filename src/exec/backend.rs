// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running tasks
//! itself. This makes it easy to swap in a fake executor in tests.
//!
//! - `RealExecutorBackend` runs tasks through the [`TaskRegistry`] on their
//!   own Tokio tasks and reports `TaskCompleted` back to the runtime.
//! - Tests can provide their own `ExecutorBackend` that, for example,
//!   records which tasks were dispatched and emits completions directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::{RuntimeEvent, TaskName};
use crate::errors::Result;
use crate::registry::TaskRegistry;

use super::task_runner::run_task;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutorBackend: Send {
    /// Start executing `task`. Must not wait for it to finish; completion is
    /// reported as a `RuntimeEvent::TaskCompleted`.
    fn dispatch(
        &mut self,
        task: TaskName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    registry: Arc<TaskRegistry>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    force: bool,
}

impl RealExecutorBackend {
    /// `force` disables the staleness check.
    pub fn new(
        registry: Arc<TaskRegistry>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        force: bool,
    ) -> Self {
        Self {
            registry,
            runtime_tx,
            force,
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(
        &mut self,
        task: TaskName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let registry = Arc::clone(&self.registry);
        let tx = self.runtime_tx.clone();
        let force = self.force;

        Box::pin(async move {
            tokio::spawn(run_task(registry, task, force, tx));
            Ok(())
        })
    }
}
