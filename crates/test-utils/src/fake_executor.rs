use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use assetwatch::engine::{RuntimeEvent, TaskName, TaskOutcome};
use assetwatch::errors::Result;
use assetwatch::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were dispatched
/// - immediately reports `TaskCompleted` for each one, using a per-task
///   scripted outcome (default: success writing `<task>.out`).
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, TaskOutcome>,
    complete: bool,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
            complete: true,
        }
    }

    /// Report `outcome` whenever `task` is dispatched.
    pub fn with_outcome(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task.to_string(), outcome);
        self
    }

    /// Record dispatches but never report completion; the test sends
    /// `TaskCompleted` itself.
    pub fn manual_completion(mut self) -> Self {
        self.complete = false;
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        task: TaskName,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcome = self
            .outcomes
            .get(&task)
            .cloned()
            .unwrap_or_else(|| TaskOutcome::Success {
                outputs: vec![PathBuf::from(format!("{task}.out"))],
            });
        let complete = self.complete;

        Box::pin(async move {
            executed.lock().unwrap().push(task.clone());
            if complete {
                tx.send(RuntimeEvent::TaskCompleted { task, outcome })
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
