#![allow(dead_code)]

use std::collections::BTreeMap;

use assetwatch::config::{
    ConfigFile, ConfigSection, DefaultSection, PipelineConfig, RawConfigFile, ServerSection,
    TaskConfig, TransformKind, WatchConfig,
};
use assetwatch::types::{ReloadKind, ReloadSetting};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                server: ServerSection::default(),
                default: DefaultSection::default(),
                task: BTreeMap::new(),
                pipeline: BTreeMap::new(),
                watch: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_series(mut self, name: &str, members: &[&str]) -> Self {
        self.config.pipeline.insert(
            name.to_string(),
            PipelineConfig {
                series: Some(members.iter().map(|m| m.to_string()).collect()),
                parallel: None,
            },
        );
        self
    }

    pub fn with_parallel(mut self, name: &str, members: &[&str]) -> Self {
        self.config.pipeline.insert(
            name.to_string(),
            PipelineConfig {
                series: None,
                parallel: Some(members.iter().map(|m| m.to_string()).collect()),
            },
        );
        self
    }

    pub fn with_watch(mut self, patterns: &[&str], tasks: &[&str]) -> Self {
        self.config.watch.push(WatchConfig {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            exclude: vec![],
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            reload: None,
        });
        self
    }

    pub fn with_reload_watch(mut self, patterns: &[&str], kind: ReloadKind) -> Self {
        self.config.watch.push(WatchConfig {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            exclude: vec![],
            tasks: vec![],
            reload: Some(kind),
        });
        self
    }

    pub fn with_global_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_default_use_hash(mut self, val: bool) -> Self {
        self.config.default.use_hash = Some(val);
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.config.debounce_ms = ms;
        self
    }

    pub fn with_initial(mut self, name: &str) -> Self {
        self.config.config.initial = Some(name.to_string());
        self
    }

    pub fn with_serve_dir(mut self, dir: &str) -> Self {
        self.config.server.serve_dir = dir.to_string();
        self
    }

    /// The unvalidated config, for tests that expect validation to fail.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(transform: TransformKind, output: &str) -> Self {
        Self {
            task: TaskConfig {
                inputs: vec![],
                exclude: vec![],
                output: output.to_string(),
                transform,
                file: None,
                separator: None,
                cmd: None,
                per_file: false,
                base: None,
                include_paths: vec![],
                browsers: vec![],
                use_hash: None,
                reload: ReloadSetting::default(),
            },
        }
    }

    /// `command` task running `cmd`.
    pub fn command(cmd: &str, output: &str) -> Self {
        let mut builder = Self::new(TransformKind::Command, output);
        builder.task.cmd = Some(cmd.to_string());
        builder
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.task.inputs.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task.exclude.push(pattern.to_string());
        self
    }

    pub fn file(mut self, name: &str) -> Self {
        self.task.file = Some(name.to_string());
        self
    }

    pub fn separator(mut self, sep: &str) -> Self {
        self.task.separator = Some(sep.to_string());
        self
    }

    pub fn per_file(mut self, val: bool) -> Self {
        self.task.per_file = val;
        self
    }

    pub fn base(mut self, dir: &str) -> Self {
        self.task.base = Some(dir.to_string());
        self
    }

    pub fn include_path(mut self, dir: &str) -> Self {
        self.task.include_paths.push(dir.to_string());
        self
    }

    pub fn browser(mut self, query: &str) -> Self {
        self.task.browsers.push(query.to_string());
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.task.use_hash = Some(val);
        self
    }

    pub fn reload(mut self, setting: ReloadSetting) -> Self {
        self.task.reload = setting;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
