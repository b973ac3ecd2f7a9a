// src/registry/freshness.rs

//! Staleness verdicts.
//!
//! A task must run when it has never produced anything, when it has no
//! inputs at all (`clean`), or when some input is strictly newer than the
//! newest file in its output directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;

use crate::fs::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The task has no input patterns; it always runs.
    NoInputs,
    /// Nothing in the output directory yet.
    Cold,
    /// At least one input is newer than the newest output.
    InputsNewer,
    /// Every input is at most as new as the newest output.
    Fresh,
    /// Inputs were touched but their content hash matches the last run.
    ContentUnchanged,
    /// Mtimes look fresh but inputs were added, renamed or removed since
    /// the last hashed run.
    InputSetChanged,
}

impl Freshness {
    pub fn is_stale(self) -> bool {
        matches!(
            self,
            Freshness::NoInputs
                | Freshness::Cold
                | Freshness::InputsNewer
                | Freshness::InputSetChanged
        )
    }
}

/// Compare input mtimes against the newest output under `output_dir`.
///
/// Files under `output_dir` that are themselves inputs do not count as
/// outputs.
pub fn check(
    fs: &dyn FileSystem,
    has_patterns: bool,
    inputs: &[PathBuf],
    output_dir: &Path,
) -> Result<Freshness> {
    if !has_patterns {
        return Ok(Freshness::NoInputs);
    }

    let excluded: BTreeSet<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    let Some(newest_output) = newest_file(fs, output_dir, &excluded)? else {
        return Ok(Freshness::Cold);
    };

    for input in inputs {
        if fs.modified(input)? > newest_output {
            return Ok(Freshness::InputsNewer);
        }
    }

    Ok(Freshness::Fresh)
}

fn newest_file(
    fs: &dyn FileSystem,
    dir: &Path,
    excluded: &BTreeSet<&Path>,
) -> Result<Option<SystemTime>> {
    if !fs.is_dir(dir) {
        return Ok(None);
    }

    let mut newest: Option<SystemTime> = None;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for path in fs.read_dir(&current)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if !excluded.contains(path.as_path()) {
                let modified = fs.modified(&path)?;
                newest = Some(newest.map_or(modified, |n| n.max(modified)));
            }
        }
    }
    Ok(newest)
}
