// src/config/validate.rs

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig, TransformKind};
use crate::errors::{BuildError, Result};

/// Shortest debounce window accepted; editors often emit several writes
/// per save within ~50ms.
pub const MIN_DEBOUNCE_MS: u64 = 100;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BuildError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    for (name, task) in cfg.task.iter() {
        validate_task(name, task)?;
    }
    validate_pipelines(cfg)?;
    validate_pipeline_graph(cfg)?;
    validate_watch_bindings(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> BuildError {
    BuildError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.debounce_ms < MIN_DEBOUNCE_MS {
        return Err(config_error(format!(
            "[config].debounce_ms must be >= {MIN_DEBOUNCE_MS} (got {})",
            cfg.config.debounce_ms
        )));
    }

    if cfg.config.watch_retries == 0 {
        return Err(config_error("[config].watch_retries must be >= 1 (got 0)"));
    }

    if let Some(initial) = &cfg.config.initial {
        if !is_known_target(cfg, initial) {
            return Err(config_error(format!(
                "[config].initial refers to unknown task or pipeline '{initial}'"
            )));
        }
    }

    for pattern in cfg.default.exclude.iter() {
        check_glob("[default].exclude", pattern)?;
    }

    Ok(())
}

fn is_known_target(cfg: &RawConfigFile, name: &str) -> bool {
    cfg.task.contains_key(name) || cfg.pipeline.contains_key(name)
}

fn check_glob(owner: &str, pattern: &str) -> Result<()> {
    Glob::new(pattern)
        .map(|_| ())
        .map_err(|e| config_error(format!("{owner}: invalid glob pattern '{pattern}': {e}")))
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<()> {
    let owner = format!("task '{name}'");

    if task.output.trim().is_empty() {
        return Err(config_error(format!("{owner} has an empty `output`")));
    }

    for pattern in task.inputs.iter().chain(task.exclude.iter()) {
        check_glob(&owner, pattern)?;
    }

    let needs_file = matches!(
        task.transform,
        TransformKind::Concat | TransformKind::Css | TransformKind::Sprite
    );
    if needs_file && task.file.as_deref().is_none_or(|f| f.trim().is_empty()) {
        return Err(config_error(format!(
            "{owner} uses transform '{}' and must set `file`",
            task.transform.as_str()
        )));
    }

    if task.transform == TransformKind::Command
        && task.cmd.as_deref().is_none_or(|c| c.trim().is_empty())
    {
        return Err(config_error(format!(
            "{owner} uses transform 'command' and must set `cmd`"
        )));
    }

    if task.transform != TransformKind::Clean && task.inputs.is_empty() {
        return Err(config_error(format!("{owner} must declare at least one input")));
    }

    Ok(())
}

fn validate_pipelines(cfg: &RawConfigFile) -> Result<()> {
    for (name, pipeline) in cfg.pipeline.iter() {
        if cfg.task.contains_key(name) {
            return Err(config_error(format!(
                "pipeline '{name}' has the same name as a task"
            )));
        }

        let members = match (&pipeline.series, &pipeline.parallel) {
            (Some(members), None) | (None, Some(members)) => members,
            (Some(_), Some(_)) => {
                return Err(config_error(format!(
                    "pipeline '{name}' must set either `series` or `parallel`, not both"
                )));
            }
            (None, None) => {
                return Err(config_error(format!(
                    "pipeline '{name}' must set `series` or `parallel`"
                )));
            }
        };

        if members.is_empty() {
            return Err(config_error(format!("pipeline '{name}' has no members")));
        }

        for member in members {
            if !is_known_target(cfg, member) {
                return Err(config_error(format!(
                    "pipeline '{name}' has unknown member '{member}'"
                )));
            }
            if member == name {
                return Err(config_error(format!(
                    "pipeline '{name}' cannot contain itself"
                )));
            }
        }
    }
    Ok(())
}

fn validate_pipeline_graph(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: member -> pipeline. Tasks are leaves and never close a
    // cycle, so only pipeline-to-pipeline edges are added.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.pipeline.keys() {
        graph.add_node(name.as_str());
    }

    for (name, pipeline) in cfg.pipeline.iter() {
        for member in pipeline.members() {
            if cfg.pipeline.contains_key(member) {
                graph.add_edge(member.as_str(), name.as_str(), ());
            }
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(BuildError::PipelineCycle(format!(
                "cycle detected in pipelines involving '{}'",
                node
            )))
        }
    }
}

fn validate_watch_bindings(cfg: &RawConfigFile) -> Result<()> {
    for (idx, binding) in cfg.watch.iter().enumerate() {
        let owner = format!("[[watch]] #{}", idx + 1);

        if binding.patterns.is_empty() {
            return Err(config_error(format!("{owner} has no patterns")));
        }
        for pattern in binding.patterns.iter().chain(binding.exclude.iter()) {
            check_glob(&owner, pattern)?;
        }

        if binding.tasks.is_empty() && binding.reload.is_none() {
            return Err(config_error(format!(
                "{owner} must list `tasks` or set `reload`"
            )));
        }

        for task in binding.tasks.iter() {
            if !cfg.task.contains_key(task) {
                return Err(config_error(format!(
                    "{owner} refers to unknown task '{task}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(src)?;
        ConfigFile::try_from(raw)
    }

    const TASKS: &str = r#"
[task.clean]
output = "dist"
transform = "clean"

[task.copy]
inputs = ["app/**/*.html"]
output = "dist"
transform = "copy"
"#;

    #[test]
    fn pipeline_cycle_is_rejected() {
        let src = format!(
            "{TASKS}\n[pipeline.a]\nseries = [\"clean\", \"b\"]\n[pipeline.b]\nparallel = [\"a\"]\n"
        );
        match parse(&src) {
            Err(BuildError::PipelineCycle(msg)) => assert!(msg.contains("cycle detected")),
            other => panic!("expected PipelineCycle, got {other:?}"),
        }
    }

    #[test]
    fn pipeline_with_both_modes_is_rejected() {
        let src = format!("{TASKS}\n[pipeline.a]\nseries = [\"clean\"]\nparallel = [\"copy\"]\n");
        assert!(matches!(parse(&src), Err(BuildError::ConfigError(_))));
    }

    #[test]
    fn command_without_cmd_is_rejected() {
        let src = r#"
[task.scripts]
inputs = ["app/js/main.js"]
output = "app/js/min"
transform = "command"
"#;
        match parse(src) {
            Err(BuildError::ConfigError(msg)) => assert!(msg.contains("must set `cmd`")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn short_debounce_is_rejected() {
        let src = format!("[config]\ndebounce_ms = 20\n{TASKS}");
        match parse(&src) {
            Err(BuildError::ConfigError(msg)) => assert!(msg.contains("debounce_ms")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn watch_binding_needs_tasks_or_reload() {
        let src = format!("{TASKS}\n[[watch]]\npatterns = [\"app/**/*.html\"]\n");
        assert!(matches!(parse(&src), Err(BuildError::ConfigError(_))));

        let src = format!("{TASKS}\n[[watch]]\npatterns = [\"app/**/*.html\"]\nreload = \"full\"\n");
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn invalid_glob_is_reported() {
        let src = r#"
[task.bad]
inputs = ["app/[*.css"]
output = "out"
transform = "copy"
"#;
        match parse(src) {
            Err(BuildError::ConfigError(msg)) => assert!(msg.contains("invalid glob")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }
}
