// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::reload::ReloadNotifier;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// What the runtime saw before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks whose last run failed.
    pub failed: Vec<String>,
}

/// Drives the per-task state machine in response to `RuntimeEvent`s,
/// delegates task execution to an `ExecutorBackend` and reload signals to a
/// [`ReloadNotifier`].
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    notifier: ReloadNotifier,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        notifier: ReloadNotifier,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            notifier,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, notify, exit).
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("rebuild engine started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        let summary = RunSummary {
            failed: self.core.failed_tasks(),
        };
        info!(failed = summary.failed.len(), "runtime exiting");
        Ok(summary)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTask(task) => {
                debug!(task = %task, "dispatching task");
                self.executor.dispatch(task).await?;
            }
            CoreCommand::Notify { kind, paths } => {
                self.notifier.notify(kind, paths);
            }
            CoreCommand::RequestExit => {
                // keep_running is already false; nothing else to do.
                debug!("core issued RequestExit command");
            }
        }
        Ok(())
    }
}
