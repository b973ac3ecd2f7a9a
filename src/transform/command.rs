// src/transform/command.rs

//! External command transform.
//!
//! Everything that needs a real codec (sass, terser, cwebp, ttf2woff2, ...)
//! is delegated to a shell command. The command string may reference:
//!
//! - `{inputs}`: every input, shell-quoted and space separated
//! - `{input}`: the current input (per-file mode)
//! - `{stem}` / `{name}`: file stem / file name of the current input
//! - `{output}`: the task's output directory
//!
//! Files under the output directory modified since the run started are
//! reported as the run's outputs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{AtPath, Transform, TransformContext, TransformFailure, TransformFuture};
use crate::fs::FileSystem;

/// Number of trailing stderr lines kept for the failure message.
const STDERR_TAIL: usize = 20;

#[derive(Debug, Clone)]
pub struct CommandTransform {
    cmd: String,
    per_file: bool,
}

impl CommandTransform {
    pub fn new(cmd: impl Into<String>, per_file: bool) -> Self {
        Self {
            cmd: cmd.into(),
            per_file,
        }
    }
}

impl Transform for CommandTransform {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let started = whole_seconds(SystemTime::now());

            tokio::fs::create_dir_all(&ctx.output_dir)
                .await
                .with_context(|| format!("creating output directory {:?}", ctx.output_dir))
                .map_err(TransformFailure::from)?;

            if self.per_file {
                for input in &ctx.inputs {
                    let line = expand(&self.cmd, &ctx.inputs, Some(input), &ctx.output_dir);
                    run_shell(&ctx.task, &line, &ctx.root).await.at_path(input)?;
                }
            } else {
                let line = expand(&self.cmd, &ctx.inputs, None, &ctx.output_dir);
                run_shell(&ctx.task, &line, &ctx.root).await?;
            }

            let mut written = Vec::new();
            collect_modified_since(ctx.fs.as_ref(), &ctx.output_dir, started, &mut written)?;
            written.sort();
            Ok(written)
        })
    }
}

/// Substitute placeholders in `template`.
pub fn expand(template: &str, inputs: &[PathBuf], current: Option<&Path>, output: &Path) -> String {
    let all = inputs
        .iter()
        .map(|p| shell_quote(&p.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    let mut line = template
        .replace("{inputs}", &all)
        .replace("{output}", &shell_quote(&output.to_string_lossy()));

    if let Some(current) = current {
        let stem = current.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let name = current.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
        line = line
            .replace("{input}", &shell_quote(&current.to_string_lossy()))
            .replace("{stem}", &stem)
            .replace("{name}", &name);
    }

    line
}

fn shell_quote(raw: &str) -> String {
    if cfg!(windows) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

async fn run_shell(task: &str, line: &str, cwd: &Path) -> Result<()> {
    info!(task = %task, cmd = %line, "starting command");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    };

    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning command for task '{task}'"))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = tokio::spawn(drain(task.to_string(), "stdout", stdout, 0));
    let stderr_task = tokio::spawn(drain(task.to_string(), "stderr", stderr, STDERR_TAIL));

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for command of task '{task}'"))?;

    let _ = stdout_task.await;
    let tail = stderr_task.await.unwrap_or_default();

    let code = status.code().unwrap_or(-1);
    debug!(task = %task, exit_code = code, success = status.success(), "command exited");

    if status.success() {
        return Ok(());
    }

    let tail = Vec::from(tail).join("\n");
    if tail.is_empty() {
        Err(anyhow!("command exited with status {code}"))
    } else {
        Err(anyhow!("command exited with status {code}: {tail}"))
    }
}

/// Log every line of a child stream at debug level and keep the last `keep`.
async fn drain(
    task: String,
    stream: &'static str,
    reader: Option<impl AsyncRead + Unpin>,
    keep: usize,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(keep);
    let Some(reader) = reader else {
        return tail;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(task = %task, "{stream}: {line}");
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail
}

fn whole_seconds(t: SystemTime) -> SystemTime {
    let secs = t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn collect_modified_since(
    fs: &dyn FileSystem,
    dir: &Path,
    since: SystemTime,
    out: &mut Vec<PathBuf>,
) -> Result<(), TransformFailure> {
    for entry in fs.read_dir(dir).at_path(dir)? {
        if fs.is_dir(&entry) {
            collect_modified_since(fs, &entry, since, out)?;
        } else if fs.modified(&entry).at_path(&entry)? >= since {
            out.push(entry);
        }
    }
    Ok(())
}
