// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod reload;
pub mod session;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::cli::{CliArgs, Command};
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{PipelineExecutor, PipelineReport, RunPolicy};
use crate::registry::TaskRegistry;
use crate::session::{DevSession, SessionOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the task registry
/// - pipelines (`build`, `run`, the initial pass of `watch`)
/// - the dev session (watcher, engine, dev server)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if let Command::List = args.command {
        print_list(&cfg);
        return Ok(());
    }

    let root = config_root_dir(&config_path);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = Arc::new(TaskRegistry::from_config(&cfg, &root, fs)?);
    let policy = if args.force {
        RunPolicy::Always
    } else {
        RunPolicy::IfStale
    };

    match args.command {
        Command::Build { pipeline } => run_target(&cfg, registry, &pipeline, policy).await,
        Command::Run { name } => run_target(&cfg, registry, &name, policy).await,
        Command::Watch {
            once,
            no_server,
            port,
        } => {
            if let Some(initial) = cfg.config_section().initial.clone() {
                let outcome = run_target(&cfg, Arc::clone(&registry), &initial, policy).await;
                match outcome {
                    Err(err) if once => return Err(err),
                    // Watch mode keeps going; fixing the file re-triggers the task.
                    Err(err) => error!(error = %err, "initial pipeline failed"),
                    Ok(()) => {}
                }
            }
            if once {
                return Ok(());
            }

            let options = SessionOptions {
                serve: !no_server,
                force: args.force,
                port,
            };
            let session = DevSession::start(&cfg, &root, registry, options).await?;
            if let Some(addr) = session.server_addr() {
                info!("serving http://{addr}");
            }

            // Ctrl-C → graceful shutdown.
            let tx = session.events();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                    return;
                }
                let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
            });

            let summary = session.wait().await?;
            if !summary.failed.is_empty() {
                info!(failed = ?summary.failed, "tasks still failing at exit");
            }
            Ok(())
        }
        Command::List => Ok(()),
    }
}

/// Expand `name` (task or pipeline) and run it.
async fn run_target(
    cfg: &ConfigFile,
    registry: Arc<TaskRegistry>,
    name: &str,
    policy: RunPolicy,
) -> Result<()> {
    let node = pipeline::expand(cfg, name)?;
    let report = PipelineExecutor::new(registry, policy).run(&node).await?;
    log_report(name, &report);
    Ok(())
}

fn log_report(name: &str, report: &PipelineReport) {
    let written: usize = report.ran.iter().map(|r| r.artifacts.len()).sum();
    info!(
        target_name = %name,
        ran = report.ran.len(),
        up_to_date = report.skipped.len(),
        files = written,
        "done"
    );
}

/// Figure out the project root.
///
/// - If the config path has a non-empty parent (e.g. "site/Assetwatch.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Assetwatch.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// `list` output: tasks, pipelines and watch bindings.
fn print_list(cfg: &ConfigFile) {
    let section = cfg.config_section();
    println!("assetwatch configuration");
    println!("  config.debounce_ms = {}", section.debounce_ms);
    println!("  config.watch_retries = {}", section.watch_retries);
    if let Some(initial) = &section.initial {
        println!("  config.initial = {initial}");
    }
    let server = cfg.server_section();
    if server.enabled {
        println!("  server = http://{}:{} ({})", server.host, server.port, server.serve_dir);
    }
    println!();

    println!("tasks ({}):", cfg.tasks().len());
    for (name, task) in cfg.tasks() {
        println!("  - {name} [{}]", task.transform.as_str());
        if !task.inputs.is_empty() {
            println!("      inputs: {:?}", task.inputs);
        }
        let exclude = cfg.effective_exclude(task);
        if !exclude.is_empty() {
            println!("      exclude: {:?}", exclude);
        }
        println!("      output: {}", task.output);
        if let Some(file) = &task.file {
            println!("      file: {file}");
        }
        if let Some(cmd) = &task.cmd {
            println!("      cmd: {cmd}");
        }
        if let Some(use_hash) = task.use_hash {
            println!("      use_hash: {use_hash}");
        }
    }

    if !cfg.pipelines().is_empty() {
        println!();
        println!("pipelines ({}):", cfg.pipelines().len());
        for name in cfg.pipelines().keys() {
            match pipeline::expand(cfg, name) {
                Ok(node) => println!("  - {name} = {node}"),
                Err(err) => println!("  - {name} (invalid: {err})"),
            }
        }
    }

    if !cfg.watch_bindings().is_empty() {
        println!();
        println!("watch ({}):", cfg.watch_bindings().len());
        for binding in cfg.watch_bindings() {
            print!("  - {:?}", binding.patterns);
            if !binding.tasks.is_empty() {
                print!(" -> {:?}", binding.tasks);
            }
            if let Some(reload) = binding.reload {
                print!(" (reload: {reload:?})");
            }
            println!();
        }
    }

    debug!("list complete (no execution)");
}
