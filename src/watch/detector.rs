// src/watch/detector.rs

//! Glob subscriptions on top of `notify`.
//!
//! Each [`ChangeDetector::watch`] call installs one OS watcher per literal
//! base directory of the patterns, filters raw notifications through the
//! globs and hands them to a debounce loop, which calls `on_event` once per
//! settled change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::WatchError;
use crate::watch::debounce::run_debounce_loop;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::PatternSet;
use crate::watch::{ChangeEvent, ChangeKind};

/// First retry delay; doubled after every failed attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(50);

struct Subscription {
    label: String,
    _watchers: Vec<RecommendedWatcher>,
    task: JoinHandle<()>,
}

pub struct ChangeDetector {
    root: PathBuf,
    debounce: Duration,
    retries: u32,
    subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("root", &self.root)
            .field("debounce", &self.debounce)
            .field("retries", &self.retries)
            .field(
                "subscriptions",
                &self.subscriptions.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ChangeDetector {
    /// `retries` is the total number of attempts made for a transient
    /// watcher error before giving up on a pattern.
    pub fn new(root: impl Into<PathBuf>, debounce: Duration, retries: u32) -> Self {
        let root = root.into();
        // Canonicalize once so notify paths strip cleanly.
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            debounce,
            retries: retries.max(1),
            subscriptions: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Watch a single glob.
    pub async fn watch_glob<F>(&mut self, pattern: &str, on_event: F) -> Result<(), WatchError>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let set = PatternSet::new(&[pattern.to_string()], &[]).map_err(|e| WatchError {
            pattern: pattern.to_string(),
            attempts: 0,
            source: notify::Error::generic(&format!("{e:#}")),
        })?;
        self.watch(&set, on_event).await
    }

    /// Subscribe `on_event` to settled changes of files matched by
    /// `patterns`.
    pub async fn watch<F>(&mut self, patterns: &PatternSet, on_event: F) -> Result<(), WatchError>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let label = patterns.patterns().join(", ");
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<(PathBuf, ChangeKind)>();

        let mut dirs: Vec<PathBuf> = Vec::new();
        for base in patterns.base_dirs() {
            let dir = nearest_existing_dir(&self.root, &self.root.join(base));
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }

        let mut watchers = Vec::new();
        for dir in dirs {
            let handler = raw_handler(self.root.clone(), patterns.clone(), raw_tx.clone());
            let watcher = establish(&label, self.retries, BASE_BACKOFF, || {
                open_watcher(&dir, handler.clone())
            })
            .await?;
            info!(pattern = %label, dir = ?dir, "watching");
            watchers.push(watcher);
        }
        drop(raw_tx);

        let task = tokio::spawn(run_debounce_loop(self.debounce, raw_rx, on_event));
        self.subscriptions.push(Subscription {
            label,
            _watchers: watchers,
            task,
        });
        Ok(())
    }

    /// Drop every OS watcher and stop the debounce loops.
    pub fn stop(&mut self) {
        for sub in self.subscriptions.drain(..) {
            debug!(pattern = %sub.label, "unwatching");
            sub.task.abort();
        }
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

type RawSender = mpsc::UnboundedSender<(PathBuf, ChangeKind)>;

/// Notify callback: map kinds, filter through the globs, forward.
fn raw_handler(
    root: PathBuf,
    patterns: PatternSet,
    raw_tx: RawSender,
) -> impl Fn(notify::Result<Event>) + Clone + Send + Sync + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let Some(kind) = change_kind(&event.kind) else {
                return;
            };
            for path in event.paths {
                let Some(rel) = relative_str(&root, &path) else {
                    continue;
                };
                if patterns.matches(&rel) {
                    let _ = raw_tx.send((path, kind));
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "file watch error");
        }
    }
}

/// `dir` if it exists, else its closest existing ancestor inside `root`.
///
/// Generated directories may not exist when a session starts; watching an
/// ancestor recursively picks them up once they are created, and the globs
/// filter out everything else.
fn nearest_existing_dir(root: &Path, dir: &Path) -> PathBuf {
    let mut current = dir;
    while !current.is_dir() && current != root {
        match current.parent() {
            Some(parent) if parent.starts_with(root) => current = parent,
            _ => return root.to_path_buf(),
        }
    }
    current.to_path_buf()
}

fn open_watcher<F>(dir: &Path, handler: F) -> notify::Result<RecommendedWatcher>
where
    F: Fn(notify::Result<Event>) + Send + Sync + 'static,
{
    let mut watcher = RecommendedWatcher::new(handler, Config::default())?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Map a notify event kind; access events and the like are ignored.
pub fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Modified),
        _ => None,
    }
}

/// Errors worth retrying: descriptor/watch limits and generic I/O.
pub fn is_transient(err: &notify::Error) -> bool {
    match &err.kind {
        notify::ErrorKind::MaxFilesWatch | notify::ErrorKind::Generic(_) => true,
        notify::ErrorKind::Io(io) => io.kind() != std::io::ErrorKind::NotFound,
        _ => false,
    }
}

/// Call `attempt` until it succeeds, retrying transient errors with
/// exponential backoff for at most `retries` attempts in total.
pub async fn establish<T, A>(
    pattern: &str,
    retries: u32,
    backoff: Duration,
    mut attempt: A,
) -> Result<T, WatchError>
where
    A: FnMut() -> notify::Result<T>,
{
    let mut delay = backoff;
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempts < retries => {
                warn!(pattern, attempts, error = %err, "transient watch error; retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => {
                return Err(WatchError {
                    pattern: pattern.to_string(),
                    attempts,
                    source: err,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange};

    #[test]
    fn kinds_map_to_changes() {
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(change_kind(&EventKind::Access(AccessKind::Any)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_then_surface() {
        let mut calls = 0;
        let err = establish::<(), _>("app/**/*.js", 3, Duration::from_millis(10), || {
            calls += 1;
            Err(notify::Error::new(notify::ErrorKind::MaxFilesWatch))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.pattern, "app/**/*.js");
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_within_budget_succeeds() {
        let mut calls = 0;
        let value = establish("app/**/*.js", 3, Duration::from_millis(10), || {
            calls += 1;
            if calls < 3 {
                Err(notify::Error::generic("inotify busy"))
            } else {
                Ok(calls)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn missing_path_fails_immediately() {
        let mut calls = 0;
        let err = establish::<(), _>("missing/**", 5, Duration::from_millis(10), || {
            calls += 1;
            Err(notify::Error::path_not_found())
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn missing_base_falls_back_to_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("app")).unwrap();

        assert_eq!(nearest_existing_dir(&root, &root.join("app/js/bundle")), root.join("app"));
        assert_eq!(nearest_existing_dir(&root, &root.join("app")), root.join("app"));
        assert_eq!(nearest_existing_dir(&root, &root.join("gen/html")), root);
    }

    #[tokio::test]
    async fn directory_created_after_watch_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut detector = ChangeDetector::new(dir.path(), Duration::from_millis(100), 3);
        detector
            .watch_glob("app/html/*.html", move |ev| {
                let _ = tx.send(ev);
            })
            .await
            .unwrap();

        std::fs::create_dir_all(dir.path().join("app/html")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(dir.path().join("app/html/index.html"), "<html></html>").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.path.ends_with("app/html/index.html"));

        detector.stop();
    }

    #[tokio::test]
    async fn settled_changes_reach_the_callback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app/scss")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut detector = ChangeDetector::new(dir.path(), Duration::from_millis(100), 3);
        detector
            .watch_glob("app/scss/**/*.scss", move |ev| {
                let _ = tx.send(ev);
            })
            .await
            .unwrap();

        std::fs::write(dir.path().join("app/scss/ignored.txt"), "x").unwrap();
        std::fs::write(dir.path().join("app/scss/style.scss"), "body{}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.path.ends_with("style.scss"));

        detector.stop();
    }
}
