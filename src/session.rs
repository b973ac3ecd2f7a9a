// src/session.rs

//! A running development session.
//!
//! [`DevSession`] owns everything `assetwatch watch` keeps alive: the change
//! detector, the rebuild engine and (optionally) the dev server. Several
//! sessions can run side by side in one process.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ConfigFile;
use crate::engine::{CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason};
use crate::errors::{BuildError, Result, WatchError};
use crate::exec::RealExecutorBackend;
use crate::registry::TaskRegistry;
use crate::reload::server::ShutdownHandle;
use crate::reload::{DevServer, ReloadNotifier};
use crate::watch::{ChangeDetector, ChangeEvent, WatchBinding};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Start the HTTP dev server.
    pub serve: bool,
    /// Ignore staleness; every trigger runs its task.
    pub force: bool,
    /// Overrides `[server].port` (tests use 0).
    pub port: Option<u16>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            serve: true,
            force: false,
            port: None,
        }
    }
}

struct ServerParts {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: JoinHandle<()>,
}

pub struct DevSession {
    detector: ChangeDetector,
    notifier: ReloadNotifier,
    events: mpsc::Sender<RuntimeEvent>,
    runtime: JoinHandle<Result<RunSummary>>,
    forwarder: JoinHandle<()>,
    server: Option<ServerParts>,
    watch_errors: Vec<WatchError>,
}

impl std::fmt::Debug for DevSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevSession")
            .field("detector", &self.detector)
            .field("server", &self.server.as_ref().map(|s| s.addr))
            .field("watch_errors", &self.watch_errors.len())
            .finish_non_exhaustive()
    }
}

impl DevSession {
    /// Start watching every `[[watch]]` binding of `cfg`.
    ///
    /// A binding whose watcher cannot be established is logged and left
    /// out; see [`DevSession::watch_errors`].
    pub async fn start(
        cfg: &ConfigFile,
        root: &Path,
        registry: Arc<TaskRegistry>,
        options: SessionOptions,
    ) -> Result<DevSession> {
        let notifier = ReloadNotifier::new();
        let bindings = Arc::new(WatchBinding::from_config(cfg)?);

        let server = if options.serve && cfg.server_section().enabled {
            Some(start_server(cfg, root, options.port, notifier.clone()).await?)
        } else {
            None
        };

        // Spawned after every fallible step.
        let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = RealExecutorBackend::new(Arc::clone(&registry), rt_tx.clone(), options.force);
        let core = CoreRuntime::from_registry(&registry, RuntimeOptions::default());
        let runtime = tokio::spawn(Runtime::new(core, rt_rx, executor, notifier.clone()).run());
        let (change_tx, change_rx) = mpsc::unbounded_channel::<(usize, ChangeEvent)>();
        let forwarder = tokio::spawn(forward_changes(Arc::clone(&bindings), change_rx, rt_tx.clone()));

        let section = cfg.config_section();
        let mut detector = ChangeDetector::new(
            root,
            Duration::from_millis(section.debounce_ms),
            section.watch_retries,
        );
        let mut watch_errors = Vec::new();
        for (idx, binding) in bindings.iter().enumerate() {
            let tx = change_tx.clone();
            let subscribed = detector
                .watch(binding.patterns(), move |event| {
                    let _ = tx.send((idx, event));
                })
                .await;
            if let Err(err) = subscribed {
                error!(error = %err, "watch binding disabled");
                watch_errors.push(err);
            }
        }

        info!(
            bindings = bindings.len(),
            active = detector.subscription_count(),
            "dev session started"
        );

        Ok(DevSession {
            detector,
            notifier,
            events: rt_tx,
            runtime,
            forwarder,
            server,
            watch_errors,
        })
    }

    /// Address of the dev server, when it runs.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.addr)
    }

    pub fn notifier(&self) -> &ReloadNotifier {
        &self.notifier
    }

    /// Sender into the engine; used for Ctrl-C and manual triggers.
    pub fn events(&self) -> mpsc::Sender<RuntimeEvent> {
        self.events.clone()
    }

    pub fn watch_errors(&self) -> &[WatchError] {
        &self.watch_errors
    }

    /// Queue a task as if one of its files changed.
    pub async fn trigger(&self, task: &str) -> Result<()> {
        self.events
            .send(RuntimeEvent::TaskTriggered {
                task: task.to_string(),
                reason: TriggerReason::Manual,
            })
            .await
            .map_err(|_| BuildError::Other(anyhow!("rebuild engine has stopped")))
    }

    /// Wait until the engine stops on its own (after `ShutdownRequested`),
    /// then tear everything down.
    pub async fn wait(self) -> Result<RunSummary> {
        let DevSession {
            mut detector,
            runtime,
            forwarder,
            server,
            ..
        } = self;

        let summary = join_runtime(runtime).await;

        detector.stop();
        forwarder.abort();
        if let Some(server) = server {
            server.shutdown.shutdown();
            let _ = server.handle.await;
        }
        info!("dev session stopped");
        summary
    }

    /// Stop watching, stop the server and shut the engine down.
    pub async fn stop(self) -> Result<RunSummary> {
        let _ = self.events.send(RuntimeEvent::ShutdownRequested).await;
        self.wait().await
    }
}

async fn start_server(
    cfg: &ConfigFile,
    root: &Path,
    port: Option<u16>,
    notifier: ReloadNotifier,
) -> Result<ServerParts> {
    let section = cfg.server_section();
    let server = DevServer::bind(
        &section.host,
        port.unwrap_or(section.port),
        root.join(&section.serve_dir),
        notifier,
    )
    .await?;
    let addr = server.local_addr()?;
    let shutdown = server.shutdown_handle();
    let handle = server.spawn();
    Ok(ServerParts {
        addr,
        shutdown,
        handle,
    })
}

async fn join_runtime(runtime: JoinHandle<Result<RunSummary>>) -> Result<RunSummary> {
    runtime
        .await
        .map_err(|e| BuildError::Other(anyhow!("rebuild engine task failed: {e}")))?
}

/// Turn settled changes into engine events.
///
/// A binding with tasks triggers each of them; a binding with only a reload
/// kind asks browsers to reload directly.
async fn forward_changes(
    bindings: Arc<Vec<WatchBinding>>,
    mut changes: mpsc::UnboundedReceiver<(usize, ChangeEvent)>,
    rt_tx: mpsc::Sender<RuntimeEvent>,
) {
    while let Some((idx, change)) = changes.recv().await {
        let Some(binding) = bindings.get(idx) else {
            continue;
        };
        info!(path = ?change.path, kind = ?change.kind, tasks = ?binding.tasks(), "change detected");

        for task in binding.tasks() {
            let event = RuntimeEvent::TaskTriggered {
                task: task.clone(),
                reason: TriggerReason::FileWatch,
            };
            if rt_tx.send(event).await.is_err() {
                return;
            }
        }

        if binding.tasks().is_empty() {
            if let Some(kind) = binding.reload() {
                let event = RuntimeEvent::ReloadRequested {
                    kind,
                    paths: vec![change.path],
                };
                if rt_tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}
