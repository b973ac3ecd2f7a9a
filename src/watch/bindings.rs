// src/watch/bindings.rs

use std::collections::BTreeSet;

use crate::config::ConfigFile;
use crate::errors::{BuildError, Result};
use crate::types::ReloadKind;
use crate::watch::patterns::PatternSet;

/// Globs associated with the tasks a change must re-run, and optionally a
/// reload to send without rebuilding anything.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    patterns: PatternSet,
    tasks: Vec<String>,
    reload: Option<ReloadKind>,
}

impl WatchBinding {
    pub fn new(patterns: PatternSet, tasks: Vec<String>, reload: Option<ReloadKind>) -> Self {
        Self {
            patterns,
            tasks,
            reload,
        }
    }

    /// Every `[[watch]]` entry, with `[default].exclude` applied.
    pub fn from_config(cfg: &ConfigFile) -> Result<Vec<WatchBinding>> {
        cfg.watch_bindings()
            .iter()
            .enumerate()
            .map(|(idx, binding)| {
                let mut exclude = binding.exclude.clone();
                exclude.extend(cfg.default_section().exclude.iter().cloned());
                let patterns = PatternSet::new(&binding.patterns, &exclude).map_err(|e| {
                    BuildError::ConfigError(format!("[[watch]] entry #{}: {e:#}", idx + 1))
                })?;
                Ok(WatchBinding::new(patterns, binding.tasks.clone(), binding.reload))
            })
            .collect()
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn reload(&self) -> Option<ReloadKind> {
        self.reload
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns.matches(rel_path)
    }
}

/// Names of every task bound to a pattern that matches `rel_path`.
pub fn tasks_for_path(bindings: &[WatchBinding], rel_path: &str) -> BTreeSet<String> {
    bindings
        .iter()
        .filter(|b| b.matches(rel_path))
        .flat_map(|b| b.tasks.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(patterns: &[&str], tasks: &[&str]) -> WatchBinding {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        WatchBinding::new(
            PatternSet::new(&patterns, &[]).unwrap(),
            tasks.iter().map(|s| s.to_string()).collect(),
            None,
        )
    }

    #[test]
    fn every_matching_binding_contributes_tasks() {
        let bindings = vec![
            binding(&["app/scss/**/*.scss"], &["styles"]),
            binding(&["app/pages/**/*.html", "app/components/**/*.html"], &["pages"]),
            binding(&["app/**/*.scss"], &["lint", "styles"]),
        ];

        let tasks = tasks_for_path(&bindings, "app/scss/parts/_base.scss");
        assert_eq!(tasks.into_iter().collect::<Vec<_>>(), vec!["lint", "styles"]);

        let tasks = tasks_for_path(&bindings, "app/components/header.html");
        assert_eq!(tasks.into_iter().collect::<Vec<_>>(), vec!["pages"]);

        assert!(tasks_for_path(&bindings, "README.md").is_empty());
    }
}
