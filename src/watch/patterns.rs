// src/watch/patterns.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;
use crate::watch::path_utils::relative_str;

/// Compiled include/exclude glob patterns, relative to the project root.
///
/// Used both for task inputs (which files a transform receives) and for
/// watch bindings (which changes wake which tasks). Callers pass
/// root-relative paths with forward slashes, e.g. `"app/scss/style.scss"`.
#[derive(Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
    /// Literal directories the include patterns can match under.
    bases: Vec<PathBuf>,
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl PatternSet {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building include globset")?;

        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        let bases = minimal_bases(include.iter().map(|p| glob_base(p)));

        Ok(Self {
            patterns: include.to_vec(),
            include_set,
            exclude_set,
            bases,
        })
    }

    /// Include patterns as written in the config.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Directories (relative to the root) that need to be walked or watched
    /// to see every file these patterns can match. Nested bases are folded
    /// into their ancestor.
    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Returns true if the root-relative path is matched by an include
    /// pattern and by no exclude pattern.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Build a GlobSet from simple string patterns.
///
/// `*` does not cross directory separators; use `**` for that.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// The literal directory prefix of a glob pattern.
///
/// - `app/scss/**/*.scss` → `app/scss`
/// - `app/js/main.js` → `app/js` (a fully literal pattern names a file)
/// - `*.html` → `` (the root itself)
pub fn glob_base(pattern: &str) -> PathBuf {
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    let literal_len = components
        .iter()
        .position(|c| c.contains(['*', '?', '[', '{']))
        .unwrap_or(components.len().saturating_sub(1));

    components[..literal_len]
        .iter()
        .filter(|c| **c != ".")
        .collect()
}

fn minimal_bases(bases: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let sorted: BTreeSet<PathBuf> = bases.collect();
    let mut out: Vec<PathBuf> = Vec::new();
    for base in sorted {
        if !out.iter().any(|kept| base.starts_with(kept)) {
            out.push(base);
        }
    }
    out
}

/// Collect all files under `root` matched by `set`, sorted and de-duplicated.
///
/// Only the literal base directories of the patterns are walked, so a
/// pattern like `app/js/*.js` never descends into `node_modules`.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    set: &PatternSet,
) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for base in set.base_dirs() {
        let start = if base.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(base)
        };
        if !fs.is_dir(&start) {
            continue;
        }

        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            for path in fs.read_dir(&dir)? {
                if fs.is_dir(&path) {
                    stack.push(path);
                } else if fs.is_file(&path) {
                    if let Some(rel) = relative_str(root, &path) {
                        if set.matches(&rel) {
                            files.insert(path);
                        }
                    }
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}
