// src/registry/mod.rs

//! Task registry.
//!
//! Holds every [`Task`] by name, enforces unique names and disjoint output
//! directories, resolves inputs and runs transforms. The engine and the
//! pipeline executor never touch transforms directly; they go through
//! [`TaskRegistry::run`] / [`TaskRegistry::run_if_stale`].

pub mod freshness;
pub mod ownership;
pub mod task;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::errors::{BuildError, Result, TransformError};
use crate::fs::FileSystem;
use crate::transform::TransformContext;
use crate::types::HashStorageMode;
use crate::watch::hash::{compute_file_hash, compute_hash_for_paths};
use crate::watch::patterns::collect_matching_files;
use crate::watch::{FileHashStore, HashStore, MemoryHashStore};

pub use freshness::Freshness;
pub use ownership::OwnershipMap;
pub use task::{BuildArtifact, Task, TaskReport};

/// What [`TaskRegistry::run_if_stale`] did.
#[derive(Debug, Clone)]
pub enum TaskRun {
    Ran(TaskReport),
    Skipped(Freshness),
}

pub struct TaskRegistry {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    tasks: BTreeMap<String, Arc<Task>>,
    ownership: OwnershipMap,
    hashes: Mutex<Box<dyn HashStore>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("root", &self.root)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}

impl TaskRegistry {
    /// Empty registry rooted at `root`, fingerprints kept in memory.
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            tasks: BTreeMap::new(),
            ownership: OwnershipMap::new(),
            hashes: Mutex::new(Box::new(MemoryHashStore::new())),
        }
    }

    pub fn with_hash_store(mut self, store: Box<dyn HashStore>) -> Self {
        self.hashes = Mutex::new(store);
        self
    }

    /// Register every `[task.<name>]` of a validated config.
    pub fn from_config(cfg: &ConfigFile, root: &Path, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let store: Box<dyn HashStore> = match cfg.config_section().hash_storage_mode {
            HashStorageMode::File => Box::new(FileHashStore::new(root.to_path_buf(), fs.clone())),
            HashStorageMode::Memory => Box::new(MemoryHashStore::new()),
        };

        let mut registry = TaskRegistry::new(root, fs).with_hash_store(store);
        for (name, task) in cfg.tasks() {
            registry.register(Task::from_config(name, task, cfg)?)?;
        }

        let names: Vec<&str> = registry.tasks.keys().map(String::as_str).collect();
        if let Err(err) = registry.hash_store().prune(&names) {
            warn!(error = %err, "failed to prune stale fingerprints");
        }

        Ok(registry)
    }

    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(task.name()) {
            return Err(BuildError::DuplicateTask(task.name().to_string()));
        }
        if task.transform().writes_outputs() {
            self.ownership.claim(task.name(), task.output_dir())?;
        }

        debug!(task = %task.name(), kind = task.transform().kind(), "registered task");
        self.tasks.insert(task.name().to_string(), Arc::new(task));
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Task>> {
        self.tasks
            .get(name)
            .ok_or_else(|| BuildError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Files currently matched by the task's input globs, sorted.
    pub fn resolve_inputs(&self, name: &str) -> Result<Vec<PathBuf>> {
        let task = self.get(name)?;
        if task.inputs().is_empty() {
            return Ok(Vec::new());
        }
        Ok(collect_matching_files(self.fs.as_ref(), &self.root, task.inputs())?)
    }

    /// Whether the task would do any work right now.
    pub fn staleness(&self, name: &str) -> Result<Freshness> {
        let task = self.get(name)?;
        let inputs = self.resolve_inputs(name)?;
        let output_dir = self.root.join(task.output_dir());

        let verdict = freshness::check(
            self.fs.as_ref(),
            !task.inputs().is_empty(),
            &inputs,
            &output_dir,
        )?;

        if !task.use_hash() || !matches!(verdict, Freshness::InputsNewer | Freshness::Fresh) {
            return Ok(verdict);
        }

        // The fingerprint covers input paths, so a deleted input changes it.
        let current = compute_hash_for_paths(self.fs.as_ref(), &inputs)?;
        let stored = self.hash_store().load(name)?;
        Ok(match (verdict, stored) {
            (Freshness::InputsNewer, Some(stored)) if stored == current => {
                Freshness::ContentUnchanged
            }
            (Freshness::Fresh, Some(stored)) if stored != current => Freshness::InputSetChanged,
            _ => verdict,
        })
    }

    /// Execute the task's transform unconditionally.
    pub async fn run(&self, name: &str) -> Result<TaskReport> {
        let task = Arc::clone(self.get(name)?);
        let inputs = self.resolve_inputs(name)?;

        let ctx = TransformContext {
            task: task.name().to_string(),
            root: self.root.clone(),
            inputs,
            output_dir: self.root.join(task.output_dir()),
            fs: Arc::clone(&self.fs),
        };

        info!(
            task = %name,
            kind = task.transform().kind(),
            inputs = ctx.inputs.len(),
            "running task"
        );
        let started = Instant::now();

        let written = task
            .transform()
            .apply(&ctx)
            .await
            .map_err(|failure| TransformError::new(name, failure.path, failure.cause))?;

        let artifacts = written
            .into_iter()
            .map(|path| self.artifact(name, path))
            .collect::<Result<Vec<_>>>()?;

        if task.use_hash() {
            let hash = compute_hash_for_paths(self.fs.as_ref(), &ctx.inputs)?;
            self.hash_store().save(name, &hash)?;
        }

        info!(
            task = %name,
            outputs = artifacts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );

        Ok(TaskReport {
            task: name.to_string(),
            inputs: ctx.inputs,
            artifacts,
        })
    }

    /// Run the task unless its outputs are up to date. `force` skips the
    /// staleness check.
    pub async fn run_if_stale(&self, name: &str, force: bool) -> Result<TaskRun> {
        if !force {
            let verdict = self.staleness(name)?;
            if !verdict.is_stale() {
                info!(task = %name, ?verdict, "task is up to date; skipping");
                return Ok(TaskRun::Skipped(verdict));
            }
            debug!(task = %name, ?verdict, "task is stale");
        }
        Ok(TaskRun::Ran(self.run(name).await?))
    }

    fn artifact(&self, task: &str, path: PathBuf) -> Result<BuildArtifact> {
        let describe = |cause: anyhow::Error| {
            TransformError::new(
                task,
                Some(path.clone()),
                cause.context("reading written output"),
            )
        };
        let hash = compute_file_hash(self.fs.as_ref(), &path).map_err(describe)?;
        let modified = self.fs.modified(&path).map_err(describe)?;
        Ok(BuildArtifact {
            path,
            hash,
            modified,
        })
    }

    fn hash_store(&self) -> std::sync::MutexGuard<'_, Box<dyn HashStore>> {
        self.hashes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::{mock_epoch, MockFileSystem};
    use crate::transform::{ConcatTransform, CopyTransform};
    use crate::watch::patterns::PatternSet;
    use std::time::Duration;

    fn patterns(items: &[&str]) -> PatternSet {
        let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        PatternSet::new(&items, &[]).unwrap()
    }

    fn scripts_task() -> Task {
        Task::new(
            "scripts",
            patterns(&["app/js/*.js"]),
            "app/dist",
            Arc::new(ConcatTransform::new("main.js", None)),
        )
    }

    fn registry(fs: &MockFileSystem) -> TaskRegistry {
        TaskRegistry::new(".", Arc::new(fs.clone()))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let fs = MockFileSystem::new();
        let mut reg = registry(&fs);
        reg.register(scripts_task()).unwrap();

        let err = reg.register(scripts_task()).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateTask(ref n) if n == "scripts"));
    }

    #[test]
    fn overlapping_outputs_are_rejected() {
        let fs = MockFileSystem::new();
        let mut reg = registry(&fs);
        reg.register(scripts_task()).unwrap();

        let other = Task::new(
            "images",
            patterns(&["app/images/*.png"]),
            "app/dist/images",
            Arc::new(CopyTransform::new(None)),
        );
        let err = reg.register(other).unwrap_err();
        assert!(matches!(err, BuildError::OutputOverlap { ref other, .. } if other == "scripts"));
    }

    #[tokio::test]
    async fn unknown_task_fails() {
        let fs = MockFileSystem::new();
        let reg = registry(&fs);
        let err = reg.run("nope").await.unwrap_err();
        assert!(matches!(err, BuildError::UnknownTask(ref n) if n == "nope"));
    }

    #[tokio::test]
    async fn rerun_with_unchanged_inputs_is_byte_identical() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/js/a.js", "a();");
        fs.add_file("./app/js/b.js", "b();");
        let mut reg = registry(&fs);
        reg.register(scripts_task()).unwrap();

        let first = reg.run("scripts").await.unwrap();
        let second = reg.run("scripts").await.unwrap();

        assert_eq!(first.artifacts.len(), 1);
        assert_eq!(first.artifacts[0].hash, second.artifacts[0].hash);
        assert_eq!(first.inputs, second.inputs);
    }

    #[tokio::test]
    async fn fresh_outputs_skip_and_newer_inputs_rerun() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/js/a.js", "a();");
        let mut reg = registry(&fs);
        reg.register(scripts_task()).unwrap();

        assert!(matches!(reg.run_if_stale("scripts", false).await.unwrap(), TaskRun::Ran(_)));
        assert!(matches!(
            reg.run_if_stale("scripts", false).await.unwrap(),
            TaskRun::Skipped(Freshness::Fresh)
        ));

        fs.set_modified("./app/js/a.js", mock_epoch() + Duration::from_secs(3600));
        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::InputsNewer);
        assert!(matches!(reg.run_if_stale("scripts", false).await.unwrap(), TaskRun::Ran(_)));
    }

    #[tokio::test]
    async fn touched_but_identical_inputs_skip_with_hashing() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/js/a.js", "a();");
        let mut reg = registry(&fs);
        reg.register(scripts_task().with_use_hash(true)).unwrap();

        reg.run("scripts").await.unwrap();
        fs.set_modified("./app/js/a.js", mock_epoch() + Duration::from_secs(3600));

        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::ContentUnchanged);

        fs.add_file("./app/js/a.js", "changed();");
        fs.set_modified("./app/js/a.js", mock_epoch() + Duration::from_secs(7200));
        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::InputsNewer);
    }

    #[tokio::test]
    async fn removed_input_reruns_hashed_task() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/js/a.js", "a();");
        fs.add_file("./app/js/b.js", "b();");
        let mut reg = registry(&fs);
        reg.register(scripts_task().with_use_hash(true)).unwrap();

        reg.run("scripts").await.unwrap();
        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::Fresh);

        fs.remove_dir_all(Path::new("./app/js/b.js")).unwrap();
        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::InputSetChanged);

        let TaskRun::Ran(report) = reg.run_if_stale("scripts", false).await.unwrap() else {
            panic!("expected a rerun");
        };
        assert_eq!(report.inputs, vec![PathBuf::from("./app/js/a.js")]);
        assert_eq!(reg.staleness("scripts").unwrap(), Freshness::Fresh);
    }

    #[tokio::test]
    async fn failing_transform_names_task_and_path() {
        let fs = MockFileSystem::new();
        let mut reg = registry(&fs);
        reg.register(Task::new(
            "sprite",
            patterns(&["app/icons/*.svg"]),
            "app/sprite",
            Arc::new(crate::transform::SpriteTransform::new("sprite.svg").unwrap()),
        ))
        .unwrap();
        fs.add_file("./app/icons/bad.svg", "nope");

        let err = reg.run("sprite").await.unwrap_err();
        match err {
            BuildError::Transform(err) => {
                assert_eq!(err.task, "sprite");
                assert_eq!(err.path, Some(PathBuf::from("./app/icons/bad.svg")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
