// src/watch/debounce.rs

//! Debouncing of raw filesystem notifications.
//!
//! Every raw notification for a path restarts that path's window. Once a
//! path has been quiet for the whole window, a single [`ChangeEvent`] is
//! released for it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use super::{ChangeEvent, ChangeKind};

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: ChangeKind,
    last_seen: Instant,
}

/// Pending map of path to the most recent notification.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Record a raw notification, restarting the path's window.
    pub fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        let kind = match self.pending.get(&path) {
            Some(prev) => coalesce(prev.kind, kind),
            None => kind,
        };
        self.pending.insert(path, Pending { kind, last_seen: now });
    }

    /// Remove and return every path that has been quiet for the window.
    pub fn due(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let window = self.window;
        let mut ready: Vec<(PathBuf, ChangeKind)> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) >= window)
            .map(|(path, p)| (path.clone(), p.kind))
            .collect();
        for (path, _) in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    /// Remove and return everything, ready or not.
    pub fn drain(&mut self) -> Vec<(PathBuf, ChangeKind)> {
        let mut all: Vec<_> = self.pending.drain().map(|(path, p)| (path, p.kind)).collect();
        all.sort();
        all
    }

    /// When the earliest pending path becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_seen + self.window)
            .min()
    }
}

/// A file created and then written within one window is still a creation.
fn coalesce(prev: ChangeKind, next: ChangeKind) -> ChangeKind {
    match (prev, next) {
        (ChangeKind::Created, ChangeKind::Modified) => ChangeKind::Created,
        (_, next) => next,
    }
}

/// Feed raw notifications through a [`Debouncer`] and hand each settled
/// change to `on_event`.
///
/// Returns when `raw_rx` closes; anything still pending is flushed first.
pub async fn run_debounce_loop<F>(
    window: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<(PathBuf, ChangeKind)>,
    mut on_event: F,
) where
    F: FnMut(ChangeEvent) + Send,
{
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            raw = raw_rx.recv() => match raw {
                Some((path, kind)) => {
                    trace!(?path, ?kind, "raw change");
                    debouncer.record(path, kind, Instant::now());
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for (path, kind) in debouncer.due(Instant::now()) {
                    debug!(?path, ?kind, "change settled");
                    on_event(ChangeEvent { path, kind, at: SystemTime::now() });
                }
            }
        }
    }

    for (path, kind) in debouncer.drain() {
        on_event(ChangeEvent { path, kind, at: SystemTime::now() });
    }
    debug!("debounce loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const WINDOW: Duration = Duration::from_millis(150);

    #[test]
    fn repeated_writes_restart_the_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);

        debouncer.record("a.scss".into(), ChangeKind::Modified, start);
        debouncer.record("a.scss".into(), ChangeKind::Modified, start + Duration::from_millis(100));

        assert!(debouncer.due(start + Duration::from_millis(200)).is_empty());
        assert_eq!(
            debouncer.due(start + Duration::from_millis(250)),
            vec![(PathBuf::from("a.scss"), ChangeKind::Modified)]
        );
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn created_then_modified_stays_created() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.record("new.js".into(), ChangeKind::Created, start);
        debouncer.record("new.js".into(), ChangeKind::Modified, start);
        debouncer.record("gone.js".into(), ChangeKind::Modified, start);
        debouncer.record("gone.js".into(), ChangeKind::Deleted, start);

        assert_eq!(
            debouncer.due(start + WINDOW),
            vec![
                (PathBuf::from("gone.js"), ChangeKind::Deleted),
                (PathBuf::from("new.js"), ChangeKind::Created),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_ten_writes_yields_one_event() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = tokio::spawn(run_debounce_loop(WINDOW, raw_rx, move |ev| {
            sink.lock().unwrap().push(ev);
        }));

        for _ in 0..10 {
            raw_tx.send((PathBuf::from("app/scss/style.scss"), ChangeKind::Modified)).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(WINDOW * 2).await;

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].path, PathBuf::from("app/scss/style.scss"));
        }

        drop(raw_tx);
        handle.await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_paths_are_reported_separately() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let handle = tokio::spawn(run_debounce_loop(WINDOW, raw_rx, move |ev: ChangeEvent| {
            sink.lock().unwrap().push(ev.path);
        }));

        raw_tx.send(("a.js".into(), ChangeKind::Modified)).unwrap();
        raw_tx.send(("b.js".into(), ChangeKind::Created)).unwrap();
        drop(raw_tx);
        handle.await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![PathBuf::from("a.js"), PathBuf::from("b.js")]);
    }
}
