// src/transform/mod.rs

//! File transforms executed by tasks.
//!
//! A [`Transform`] turns the task's resolved input files into files under
//! its output directory. Built-ins that need no codec are implemented here
//! in Rust; everything else (sass, terser, cwebp, font converters) goes
//! through [`command::CommandTransform`].
//!
//! Transforms must be idempotent: the same inputs produce byte-identical
//! outputs.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{TaskConfig, TransformKind};
use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;

pub mod clean;
pub mod command;
pub mod concat;
pub mod copy;
pub mod css;
pub mod include;
pub mod sprite;

pub use clean::CleanTransform;
pub use command::CommandTransform;
pub use concat::ConcatTransform;
pub use copy::CopyTransform;
pub use css::{BrowserTargets, CssTransform};
pub use include::IncludeTransform;
pub use sprite::SpriteTransform;

/// Everything a transform gets to see for one run.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub task: String,
    /// Project root; relative config paths are resolved against it.
    pub root: PathBuf,
    /// Resolved input files, sorted.
    pub inputs: Vec<PathBuf>,
    /// Output directory (already joined with `root`).
    pub output_dir: PathBuf,
    pub fs: Arc<dyn FileSystem>,
}

/// Why a transform failed, and on which file if known.
#[derive(Debug)]
pub struct TransformFailure {
    pub path: Option<PathBuf>,
    pub cause: anyhow::Error,
}

impl TransformFailure {
    pub fn at(path: impl Into<PathBuf>, cause: anyhow::Error) -> Self {
        Self {
            path: Some(path.into()),
            cause,
        }
    }
}

impl From<anyhow::Error> for TransformFailure {
    fn from(cause: anyhow::Error) -> Self {
        Self { path: None, cause }
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {:#}", path.display(), self.cause),
            None => write!(f, "{:#}", self.cause),
        }
    }
}

/// Attach the file being processed to an `anyhow` error.
pub trait AtPath<T> {
    fn at_path(self, path: &Path) -> std::result::Result<T, TransformFailure>;
}

impl<T> AtPath<T> for anyhow::Result<T> {
    fn at_path(self, path: &Path) -> std::result::Result<T, TransformFailure> {
        self.map_err(|cause| TransformFailure::at(path, cause))
    }
}

/// Paths of the files a run wrote.
pub type TransformResult = std::result::Result<Vec<PathBuf>, TransformFailure>;

pub type TransformFuture<'a> = Pin<Box<dyn Future<Output = TransformResult> + Send + 'a>>;

/// A file transformation bound to a task.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Short name used in logs (`concat`, `css`, ...).
    fn kind(&self) -> &'static str;

    /// Whether the transform produces files under its output directory.
    ///
    /// Only writing transforms claim their output directory in the
    /// registry's ownership map.
    fn writes_outputs(&self) -> bool {
        true
    }

    /// Whether outputs are style sheets that browsers can hot-swap.
    fn is_stylesheet(&self) -> bool {
        false
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a>;
}

/// Build the transform described by a `[task.<name>]` section.
pub fn from_config(name: &str, task: &TaskConfig) -> Result<Arc<dyn Transform>> {
    let missing = |field: &str| {
        BuildError::ConfigError(format!(
            "task '{name}' uses transform '{}' and must set `{field}`",
            task.transform.as_str()
        ))
    };

    let transform: Arc<dyn Transform> = match task.transform {
        TransformKind::Concat => Arc::new(ConcatTransform::new(
            task.file.clone().ok_or_else(|| missing("file"))?,
            task.separator.clone(),
        )),
        TransformKind::Copy => Arc::new(CopyTransform::new(task.base.as_ref().map(PathBuf::from))),
        TransformKind::Clean => Arc::new(CleanTransform),
        TransformKind::Css => Arc::new(CssTransform::new(
            task.file.clone().ok_or_else(|| missing("file"))?,
            BrowserTargets::from_queries(&task.browsers),
        )),
        TransformKind::Include => Arc::new(IncludeTransform::new(
            task.include_paths.iter().map(PathBuf::from).collect(),
        )?),
        TransformKind::Sprite => Arc::new(SpriteTransform::new(
            task.file.clone().ok_or_else(|| missing("file"))?,
        )?),
        TransformKind::Command => Arc::new(CommandTransform::new(
            task.cmd.clone().ok_or_else(|| missing("cmd"))?,
            task.per_file,
        )),
    };

    Ok(transform)
}
