// src/pipeline/mod.rs

//! Task composition.
//!
//! A pipeline is an explicit tree of task names. [`PipelineNode::Series`]
//! runs its members one after another and stops at the first failure;
//! [`PipelineNode::Parallel`] runs all members concurrently and reports every
//! failure together.
//!
//! - [`plan`] expands `[pipeline.<name>]` tables into trees.
//! - [`executor`] interprets a tree against a [`TaskRegistry`].
//!
//! [`TaskRegistry`]: crate::registry::TaskRegistry

pub mod executor;
pub mod plan;

use std::collections::BTreeSet;
use std::fmt;

use crate::errors::{BuildError, Result};

pub use executor::{PipelineExecutor, PipelineReport, RunPolicy};
pub use plan::expand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineNode {
    Leaf(String),
    Series(Vec<PipelineNode>),
    Parallel(Vec<PipelineNode>),
}

pub fn leaf(name: impl Into<String>) -> PipelineNode {
    PipelineNode::Leaf(name.into())
}

pub fn series(nodes: impl IntoIterator<Item = PipelineNode>) -> PipelineNode {
    PipelineNode::Series(nodes.into_iter().collect())
}

pub fn parallel(nodes: impl IntoIterator<Item = PipelineNode>) -> PipelineNode {
    PipelineNode::Parallel(nodes.into_iter().collect())
}

impl PipelineNode {
    /// Task names in tree order.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PipelineNode::Leaf(name) => out.push(name),
            PipelineNode::Series(nodes) | PipelineNode::Parallel(nodes) => {
                for node in nodes {
                    node.collect_leaves(out);
                }
            }
        }
    }

    /// Static checks run before anything executes: every leaf names a known
    /// task, no task appears twice, no group is empty.
    pub fn validate(&self, is_task: impl Fn(&str) -> bool) -> Result<()> {
        self.check_groups()?;

        let mut seen = BTreeSet::new();
        for name in self.leaves() {
            if !is_task(name) {
                return Err(BuildError::UnknownTask(name.to_string()));
            }
            if !seen.insert(name) {
                return Err(BuildError::ConfigError(format!(
                    "task '{name}' appears more than once in pipeline {self}"
                )));
            }
        }
        Ok(())
    }

    fn check_groups(&self) -> Result<()> {
        match self {
            PipelineNode::Leaf(_) => Ok(()),
            PipelineNode::Series(nodes) | PipelineNode::Parallel(nodes) => {
                if nodes.is_empty() {
                    return Err(BuildError::ConfigError(format!(
                        "empty {} group in pipeline",
                        self.mode()
                    )));
                }
                nodes.iter().try_for_each(PipelineNode::check_groups)
            }
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            PipelineNode::Leaf(_) => "task",
            PipelineNode::Series(_) => "series",
            PipelineNode::Parallel(_) => "parallel",
        }
    }
}

impl fmt::Display for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineNode::Leaf(name) => write!(f, "{name}"),
            PipelineNode::Series(nodes) | PipelineNode::Parallel(nodes) => {
                write!(f, "{}(", self.mode())?;
                for (idx, node) in nodes.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{node}")?;
                }
                write!(f, ")")
            }
        }
    }
}
