// src/engine/state.rs

//! Per-task run state.

use std::collections::BTreeMap;

use crate::types::ReloadKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    /// Last run failed. Accepts triggers like `Idle`.
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskSlot {
    pub state: TaskState,
    /// A trigger arrived while running; run once more afterwards.
    pub pending_rerun: bool,
    pub reload: Option<ReloadKind>,
}

impl TaskSlot {
    pub fn new(reload: Option<ReloadKind>) -> Self {
        Self {
            state: TaskState::Idle,
            pending_rerun: false,
            reload,
        }
    }
}

/// Run state of every known task.
#[derive(Debug, Clone, Default)]
pub struct TaskStates {
    slots: BTreeMap<String, TaskSlot>,
}

impl TaskStates {
    pub fn new(tasks: impl IntoIterator<Item = (String, Option<ReloadKind>)>) -> Self {
        Self {
            slots: tasks
                .into_iter()
                .map(|(name, reload)| (name, TaskSlot::new(reload)))
                .collect(),
        }
    }

    pub fn get(&self, task: &str) -> Option<&TaskSlot> {
        self.slots.get(task)
    }

    pub fn get_mut(&mut self, task: &str) -> Option<&mut TaskSlot> {
        self.slots.get_mut(task)
    }

    /// No task running and none waiting for a re-run.
    pub fn is_idle(&self) -> bool {
        self.slots
            .values()
            .all(|slot| slot.state != TaskState::Running && !slot.pending_rerun)
    }

    pub fn failed(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.state == TaskState::Failed)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
