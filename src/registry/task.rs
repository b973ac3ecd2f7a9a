// src/registry/task.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::{ConfigFile, TaskConfig};
use crate::errors::{BuildError, Result};
use crate::transform::{self, Transform};
use crate::types::ReloadKind;
use crate::watch::patterns::PatternSet;

/// A named, idempotent file transformation.
///
/// Built once when the registry is initialised and never mutated; the engine
/// and pipelines share it through an `Arc`.
#[derive(Clone)]
pub struct Task {
    name: String,
    inputs: PatternSet,
    output_dir: PathBuf,
    transform: Arc<dyn Transform>,
    reload: Option<ReloadKind>,
    use_hash: bool,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("output_dir", &self.output_dir)
            .field("transform", &self.transform.kind())
            .field("reload", &self.reload)
            .field("use_hash", &self.use_hash)
            .finish()
    }
}

impl Task {
    /// A task with the reload kind its transform implies and no hashing.
    pub fn new(
        name: impl Into<String>,
        inputs: PatternSet,
        output_dir: impl Into<PathBuf>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        let reload = if transform.is_stylesheet() {
            Some(ReloadKind::Inject)
        } else {
            Some(ReloadKind::Full)
        };
        Self {
            name: name.into(),
            inputs,
            output_dir: output_dir.into(),
            transform,
            reload,
            use_hash: false,
        }
    }

    pub fn with_reload(mut self, reload: Option<ReloadKind>) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_use_hash(mut self, use_hash: bool) -> Self {
        self.use_hash = use_hash;
        self
    }

    /// Build a task from its `[task.<name>]` section.
    pub fn from_config(name: &str, task: &TaskConfig, cfg: &ConfigFile) -> Result<Self> {
        let exclude = cfg.effective_exclude(task);
        let inputs = PatternSet::new(&task.inputs, &exclude).map_err(|e| {
            BuildError::ConfigError(format!("task '{name}': {e:#}"))
        })?;
        let transform = transform::from_config(name, task)?;
        let reload = task.reload.resolve(transform.is_stylesheet());
        let use_hash = task.effective_use_hash(cfg.default_section().use_hash.unwrap_or(false));

        Ok(Task::new(name, inputs, &task.output, transform)
            .with_reload(reload)
            .with_use_hash(use_hash))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &PatternSet {
        &self.inputs
    }

    /// Output directory relative to the project root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn transform(&self) -> &Arc<dyn Transform> {
        &self.transform
    }

    /// `None` when the task is configured with `reload = "none"`.
    pub fn reload(&self) -> Option<ReloadKind> {
        self.reload
    }

    pub fn use_hash(&self) -> bool {
        self.use_hash
    }
}

/// A file written by a task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: PathBuf,
    /// blake3 hex digest of the file contents.
    pub hash: String,
    pub modified: SystemTime,
}

/// Result of one successful task execution.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: String,
    pub inputs: Vec<PathBuf>,
    pub artifacts: Vec<BuildArtifact>,
}

impl TaskReport {
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}
