// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! [`BuildError`] is what every public operation returns. Task failures are
//! carried as [`TransformError`] (one task) or [`AggregateError`] (several
//! tasks of a parallel group); watcher failures as [`WatchError`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error(
        "output directory {path:?} of task '{task}' overlaps output {other_path:?} of task '{other}'"
    )]
    OutputOverlap {
        task: String,
        path: PathBuf,
        other: String,
        other_path: PathBuf,
    },

    #[error("Cycle detected in pipelines: {0}")]
    PipelineCycle(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Flatten this error into the task failures it represents.
    ///
    /// Used by parallel groups, which collect failures instead of stopping.
    /// Errors that are not tied to a task are attributed to `task`.
    pub fn into_transform_errors(self, task: &str) -> Vec<TransformError> {
        match self {
            BuildError::Transform(err) => vec![err],
            BuildError::Aggregate(agg) => agg.errors,
            other => vec![TransformError::new(task, None, anyhow::Error::new(other))],
        }
    }
}

/// A task's transform failed.
#[derive(Debug)]
pub struct TransformError {
    pub task: String,
    /// The input or output file the transform was working on, when known.
    pub path: Option<PathBuf>,
    pub cause: anyhow::Error,
}

impl TransformError {
    pub fn new(task: impl Into<String>, path: Option<PathBuf>, cause: anyhow::Error) -> Self {
        Self {
            task: task.into(),
            path,
            cause,
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "task '{}' failed on {}: {:#}",
                self.task,
                path.display(),
                self.cause
            ),
            None => write!(f, "task '{}' failed: {:#}", self.task, self.cause),
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

/// Every failure collected from a parallel group.
#[derive(Debug, Default)]
pub struct AggregateError {
    pub errors: Vec<TransformError>,
}

impl AggregateError {
    pub fn new(errors: Vec<TransformError>) -> Self {
        Self { errors }
    }

    /// Names of the failed tasks, in collection order.
    pub fn task_names(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.task.as_str()).collect()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// The filesystem notification layer gave up on a pattern.
#[derive(Error, Debug)]
#[error("watching '{pattern}' failed after {attempts} attempt(s): {source}")]
pub struct WatchError {
    pub pattern: String,
    pub attempts: u32,
    #[source]
    pub source: notify::Error,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BuildError>;
