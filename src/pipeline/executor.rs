// src/pipeline/executor.rs

//! Interpreter for [`PipelineNode`] trees.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::errors::{AggregateError, Result, TransformError};
use crate::registry::{TaskRegistry, TaskReport, TaskRun};

use super::PipelineNode;

/// Whether leaves consult the staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPolicy {
    #[default]
    IfStale,
    /// `--force`: run every leaf.
    Always,
}

/// Everything that happened during one pipeline execution.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub ran: Vec<TaskReport>,
    pub skipped: Vec<String>,
}

impl PipelineReport {
    fn merge(&mut self, other: PipelineReport) {
        self.ran.extend(other.ran);
        self.skipped.extend(other.skipped);
    }
}

type NodeFuture = Pin<Box<dyn Future<Output = Result<PipelineReport>> + Send>>;

#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<TaskRegistry>,
    policy: RunPolicy,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<TaskRegistry>, policy: RunPolicy) -> Self {
        Self { registry, policy }
    }

    /// Validate `node` against the registry, then execute it.
    pub async fn run(&self, node: &PipelineNode) -> Result<PipelineReport> {
        node.validate(|name| self.registry.contains(name))?;
        info!(pipeline = %node, "running pipeline");
        self.clone().execute(node.clone()).await
    }

    fn execute(self, node: PipelineNode) -> NodeFuture {
        Box::pin(async move {
            match node {
                PipelineNode::Leaf(name) => self.run_leaf(&name).await,
                PipelineNode::Series(nodes) => self.run_series(nodes).await,
                PipelineNode::Parallel(nodes) => self.run_parallel(nodes).await,
            }
        })
    }

    async fn run_leaf(&self, name: &str) -> Result<PipelineReport> {
        let force = self.policy == RunPolicy::Always;
        let mut report = PipelineReport::default();
        match self.registry.run_if_stale(name, force).await? {
            TaskRun::Ran(task_report) => report.ran.push(task_report),
            TaskRun::Skipped(_) => report.skipped.push(name.to_string()),
        }
        Ok(report)
    }

    async fn run_series(&self, nodes: Vec<PipelineNode>) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        for node in nodes {
            let label = node.to_string();
            match self.clone().execute(node).await {
                Ok(step) => report.merge(step),
                Err(err) => {
                    error!(step = %label, error = %err, "series step failed; aborting");
                    return Err(err);
                }
            }
        }
        Ok(report)
    }

    async fn run_parallel(&self, nodes: Vec<PipelineNode>) -> Result<PipelineReport> {
        let mut set = JoinSet::new();
        for node in nodes {
            let label = node.to_string();
            let exec = self.clone();
            set.spawn(async move { (label, exec.execute(node).await) });
        }

        let mut report = PipelineReport::default();
        let mut failures: Vec<TransformError> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(member))) => report.merge(member),
                Ok((label, Err(err))) => {
                    error!(member = %label, error = %err, "parallel member failed");
                    failures.extend(err.into_transform_errors(&label));
                }
                Err(join_err) => failures.push(TransformError::new(
                    "parallel",
                    None,
                    anyhow!("pipeline member did not finish: {join_err}"),
                )),
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(AggregateError::new(failures).into())
        }
    }
}
