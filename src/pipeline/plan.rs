// src/pipeline/plan.rs

use crate::config::ConfigFile;
use crate::errors::{BuildError, Result};

use super::PipelineNode;

/// Expand a task or pipeline name from the config into a tree.
///
/// A task name becomes a single leaf; a pipeline name becomes a series or
/// parallel group whose members are expanded recursively.
pub fn expand(cfg: &ConfigFile, name: &str) -> Result<PipelineNode> {
    let mut stack = Vec::new();
    expand_inner(cfg, name, &mut stack)
}

fn expand_inner(cfg: &ConfigFile, name: &str, stack: &mut Vec<String>) -> Result<PipelineNode> {
    if cfg.tasks().contains_key(name) {
        return Ok(PipelineNode::Leaf(name.to_string()));
    }

    let pipeline = cfg
        .pipelines()
        .get(name)
        .ok_or_else(|| BuildError::UnknownTask(name.to_string()))?;

    if stack.iter().any(|p| p == name) {
        return Err(BuildError::PipelineCycle(format!(
            "{} -> {name}",
            stack.join(" -> ")
        )));
    }
    stack.push(name.to_string());

    let members = pipeline
        .members()
        .iter()
        .map(|member| expand_inner(cfg, member, stack))
        .collect::<Result<Vec<_>>>()?;

    stack.pop();

    Ok(if pipeline.series.is_some() {
        PipelineNode::Series(members)
    } else {
        PipelineNode::Parallel(members)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;
    use crate::pipeline::{leaf, parallel, series};

    fn cfg(src: &str) -> ConfigFile {
        let raw: RawConfigFile = toml::from_str(src).unwrap();
        ConfigFile::try_from(raw).unwrap()
    }

    #[test]
    fn nested_pipelines_expand_into_one_tree() {
        let cfg = cfg(r#"
            [task.clean]
            transform = "clean"
            output = "dist"

            [task.styles]
            inputs = ["app/scss/*.scss"]
            output = "app/css"
            transform = "css"
            file = "style.min.css"

            [task.scripts]
            inputs = ["app/js/*.js"]
            output = "app/js/dist"
            transform = "concat"
            file = "main.js"

            [pipeline.assets]
            parallel = ["styles", "scripts"]

            [pipeline.build]
            series = ["clean", "assets"]
        "#);

        assert_eq!(
            expand(&cfg, "build").unwrap(),
            series([leaf("clean"), parallel([leaf("styles"), leaf("scripts")])])
        );
        assert_eq!(expand(&cfg, "styles").unwrap(), leaf("styles"));
        assert!(matches!(expand(&cfg, "deploy"), Err(BuildError::UnknownTask(_))));
    }
}
