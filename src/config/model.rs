// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{HashStorageMode, ReloadKind, ReloadSetting};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// debounce_ms = 150
/// initial = "default"
///
/// [server]
/// port = 3000
/// serve_dir = "app"
///
/// [task.styles]
/// inputs = ["app/scss/style.scss"]
/// output = "app/css"
/// transform = "css"
/// file = "style.min.css"
/// browsers = ["last 10 versions"]
///
/// [pipeline.build]
/// series = ["cleandist", "building"]
///
/// [[watch]]
/// patterns = ["app/scss/**/*.scss"]
/// tasks = ["styles"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Development server from `[server]`.
    #[serde(default)]
    pub server: ServerSection,

    /// Defaults applied to every task from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Named compositions from `[pipeline.<name>]`.
    #[serde(default)]
    pub pipeline: BTreeMap<String, PipelineConfig>,

    /// `[[watch]]` bindings from glob patterns to tasks.
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders may assume every reference resolves and pipelines are acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    config: ConfigSection,
    server: ServerSection,
    default: DefaultSection,
    task: BTreeMap<String, TaskConfig>,
    pipeline: BTreeMap<String, PipelineConfig>,
    watch: Vec<WatchConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            server: raw.server,
            default: raw.default,
            task: raw.task,
            pipeline: raw.pipeline,
            watch: raw.watch,
        }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.config
    }

    pub fn server_section(&self) -> &ServerSection {
        &self.server
    }

    pub fn default_section(&self) -> &DefaultSection {
        &self.default
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn pipelines(&self) -> &BTreeMap<String, PipelineConfig> {
        &self.pipeline
    }

    pub fn watch_bindings(&self) -> &[WatchConfig] {
        &self.watch
    }

    /// Effective exclude list of a task: its own plus `[default].exclude`.
    pub fn effective_exclude(&self, task: &TaskConfig) -> Vec<String> {
        let mut exclude = task.exclude.clone();
        exclude.extend(self.default.exclude.iter().cloned());
        exclude
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Window in which repeated changes to one path collapse into one event.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How many times a transient watch failure is retried before giving up
    /// on a pattern.
    #[serde(default = "default_watch_retries")]
    pub watch_retries: u32,

    /// Where `use_hash` fingerprints are kept.
    #[serde(default)]
    pub hash_storage_mode: HashStorageMode,

    /// Task or pipeline run once when a watch session starts.
    #[serde(default)]
    pub initial: Option<String>,
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_watch_retries() -> u32 {
    3
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watch_retries: default_watch_retries(),
            hash_storage_mode: HashStorageMode::default(),
            initial: None,
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    /// `0` picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served over HTTP, relative to the project root.
    #[serde(default = "default_serve_dir")]
    pub serve_dir: String,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_serve_dir() -> String {
    ".".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_port(),
            serve_dir: default_serve_dir(),
        }
    }
}

/// `[default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Exclude patterns appended to every task and watch binding.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Default `use_hash` behaviour; if `None`, the global default is `false`.
    #[serde(default)]
    pub use_hash: Option<bool>,
}

/// Built-in transform selected by `transform = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Join all inputs into `file`.
    Concat,
    /// Copy inputs into `output`, flattened or relative to `base`.
    Copy,
    /// Remove `output`.
    Clean,
    /// Compress style sheets into `file`, adding vendor prefixes.
    Css,
    /// Expand include directives in each input.
    Include,
    /// Stack SVG inputs into one sprite `file`.
    Sprite,
    /// Run an external command.
    Command,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformKind::Concat => "concat",
            TransformKind::Copy => "copy",
            TransformKind::Clean => "clean",
            TransformKind::Css => "css",
            TransformKind::Include => "include",
            TransformKind::Sprite => "sprite",
            TransformKind::Command => "command",
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Input globs, relative to the project root.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Globs removed from `inputs`.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Output directory owned by this task.
    pub output: String,

    pub transform: TransformKind,

    /// Output file name for `concat`, `css` and `sprite`.
    #[serde(default)]
    pub file: Option<String>,

    /// Text placed between concatenated inputs (default: newline).
    #[serde(default)]
    pub separator: Option<String>,

    /// Shell command for `command`. Supports `{inputs}`, `{input}`, `{stem}`,
    /// `{name}` and `{output}` placeholders.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Run `cmd` once per input instead of once per task.
    #[serde(default)]
    pub per_file: bool,

    /// For `copy`: keep paths relative to this directory instead of
    /// flattening.
    #[serde(default)]
    pub base: Option<String>,

    /// Directories searched by `include` directives.
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Browser targets for `css` vendor prefixing.
    #[serde(default)]
    pub browsers: Vec<String>,

    /// Skip runs whose input contents did not change.
    #[serde(default)]
    pub use_hash: Option<bool>,

    #[serde(default)]
    pub reload: ReloadSetting,
}

impl TaskConfig {
    /// Convenience: effective `use_hash` given a default from `[default]`.
    pub fn effective_use_hash(&self, default_use_hash: bool) -> bool {
        self.use_hash.unwrap_or(default_use_hash)
    }
}

/// `[pipeline.<name>]` section: exactly one of `series` / `parallel`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub series: Option<Vec<String>>,

    #[serde(default)]
    pub parallel: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Member names, regardless of composition mode.
    pub fn members(&self) -> &[String] {
        self.series
            .as_deref()
            .or(self.parallel.as_deref())
            .unwrap_or(&[])
    }
}

/// One `[[watch]]` binding.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub patterns: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Tasks re-run when a matching file changes.
    #[serde(default)]
    pub tasks: Vec<String>,

    /// Reload browsers directly on change, without running a task.
    #[serde(default)]
    pub reload: Option<ReloadKind>,
}
