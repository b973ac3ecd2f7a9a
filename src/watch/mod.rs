// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling glob patterns (`patterns`) shared by task inputs and watch
//!   bindings.
//! - Wiring up a cross-platform filesystem watcher (`notify`) per binding
//!   and debouncing its notifications (`detector`, `debounce`).
//! - Content fingerprints for `use_hash` tasks (`hash`).
//!
//! It does **not** know about pipelines or task state; it only turns
//! filesystem changes into [`ChangeEvent`]s.

use std::path::PathBuf;
use std::time::SystemTime;

pub mod bindings;
pub mod debounce;
pub mod detector;
pub mod hash;
pub mod path_utils;
pub mod patterns;

pub use bindings::{tasks_for_path, WatchBinding};
pub use debounce::Debouncer;
pub use detector::ChangeDetector;
pub use hash::{compute_hash_for_paths, FileHashStore, HashStore, MemoryHashStore, HASH_FILE_PATH};
pub use patterns::PatternSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One settled change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub at: SystemTime,
}
