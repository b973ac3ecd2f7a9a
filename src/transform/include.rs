// src/transform/include.rs

//! HTML/JS include expansion.
//!
//! Recognised directives:
//!
//! - `<!--=include components/header.html -->` anywhere in a line
//! - `//=include vendor/lib.js` on a line of its own
//!
//! Paths resolve against the including file's directory first, then against
//! each configured include path. Includes nest; cycles are an error.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use regex::{Captures, Regex};

use super::{AtPath, Transform, TransformContext, TransformFuture};
use crate::fs::FileSystem;

const HTML_DIRECTIVE: &str = r"<!--=\s*include\s+(?P<path>[^\s>]+?)\s*-->";
const LINE_DIRECTIVE: &str = r"(?m)^[ \t]*//=[ \t]*include[ \t]+(?P<path>\S+)[ \t]*\r?$";

const MAX_DEPTH: usize = 32;

/// Expand include directives in each input and write the result, under the
/// input's file name, to the output directory.
#[derive(Debug, Clone)]
pub struct IncludeTransform {
    include_paths: Vec<PathBuf>,
    directives: Directives,
}

#[derive(Debug, Clone)]
struct Directives {
    html: Regex,
    line: Regex,
}

impl IncludeTransform {
    pub fn new(include_paths: Vec<PathBuf>) -> Result<Self> {
        let directives = Directives {
            html: Regex::new(HTML_DIRECTIVE).context("compiling html include directive")?,
            line: Regex::new(LINE_DIRECTIVE).context("compiling line include directive")?,
        };
        Ok(Self {
            include_paths,
            directives,
        })
    }
}

impl Transform for IncludeTransform {
    fn kind(&self) -> &'static str {
        "include"
    }

    fn apply<'a>(&'a self, ctx: &'a TransformContext) -> TransformFuture<'a> {
        Box::pin(async move {
            let search: Vec<PathBuf> = self.include_paths.iter().map(|p| ctx.root.join(p)).collect();
            let mut written = Vec::with_capacity(ctx.inputs.len());

            for input in &ctx.inputs {
                let mut stack = Vec::new();
                let expanded = expand_file(ctx.fs.as_ref(), &self.directives, input, &search, &mut stack).at_path(input)?;

                let name = input
                    .file_name()
                    .ok_or_else(|| anyhow!("input has no file name"))
                    .at_path(input)?;
                let target = ctx.output_dir.join(name);
                ctx.fs.write(&target, expanded.as_bytes()).at_path(&target)?;
                written.push(target);
            }

            Ok(written)
        })
    }
}

fn expand_file(
    fs: &dyn FileSystem,
    directives: &Directives,
    path: &Path,
    search: &[PathBuf],
    stack: &mut Vec<PathBuf>,
) -> Result<String> {
    if stack.iter().any(|p| p == path) {
        bail!("include cycle: {:?} includes itself through {:?}", path, stack);
    }
    if stack.len() >= MAX_DEPTH {
        bail!("includes nested deeper than {MAX_DEPTH} levels at {:?}", path);
    }

    let source = fs.read_to_string(path)?;
    stack.push(path.to_path_buf());

    let here = path.parent().unwrap_or_else(|| Path::new("."));
    let expanded = replace_all(&directives.html, &source, |target| {
        let resolved = resolve(fs, here, search, target)?;
        expand_file(fs, directives, &resolved, search, stack)
    })?;
    let expanded = replace_all(&directives.line, &expanded, |target| {
        let resolved = resolve(fs, here, search, target)?;
        expand_file(fs, directives, &resolved, search, stack)
    })?;

    stack.pop();
    Ok(expanded)
}

/// `Regex::replace_all` with a fallible replacer.
fn replace_all(
    re: &Regex,
    source: &str,
    mut replace: impl FnMut(&str) -> Result<String>,
) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in re.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&source[last..whole.start()]);
        out.push_str(&replace(directive_path(&caps))?);
        last = whole.end();
    }
    out.push_str(&source[last..]);
    Ok(out)
}

fn directive_path<'h>(caps: &Captures<'h>) -> &'h str {
    caps.name("path").map(|m| m.as_str()).unwrap_or_default()
}

fn resolve(fs: &dyn FileSystem, here: &Path, search: &[PathBuf], target: &str) -> Result<PathBuf> {
    std::iter::once(here.to_path_buf())
        .chain(search.iter().cloned())
        .map(|dir| dir.join(target))
        .find(|candidate| fs.is_file(candidate))
        .with_context(|| format!("included file '{target}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::sync::Arc;

    fn ctx(fs: &MockFileSystem, inputs: &[&str]) -> TransformContext {
        TransformContext {
            task: "pages".into(),
            root: PathBuf::from("."),
            inputs: inputs.iter().map(PathBuf::from).collect(),
            output_dir: PathBuf::from("./app/html"),
            fs: Arc::new(fs.clone()),
        }
    }

    #[tokio::test]
    async fn expands_nested_components() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "./app/pages/index.html",
            "<body>\n<!--=include header.html -->\n<main></main>\n</body>",
        );
        fs.add_file("./app/components/header.html", "<header><!--= include logo.html --></header>");
        fs.add_file("./app/components/logo.html", "<img src=\"logo.svg\">");

        let transform = IncludeTransform::new(vec![PathBuf::from("app/components")]).unwrap();
        let written = transform.apply(&ctx(&fs, &["./app/pages/index.html"])).await.unwrap();

        assert_eq!(written, vec![PathBuf::from("./app/html/index.html")]);
        assert_eq!(
            fs.read_to_string(Path::new("./app/html/index.html")).unwrap(),
            "<body>\n<header><img src=\"logo.svg\"></header>\n<main></main>\n</body>"
        );
    }

    #[tokio::test]
    async fn line_directives_expand_in_scripts() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/js/main.js", "//=include parts/util.js\nrun();\n");
        fs.add_file("./app/js/parts/util.js", "function run() {}");

        let transform = IncludeTransform::new(Vec::new()).unwrap();
        transform.apply(&ctx(&fs, &["./app/js/main.js"])).await.unwrap();

        assert_eq!(
            fs.read_to_string(Path::new("./app/html/main.js")).unwrap(),
            "function run() {}\nrun();\n"
        );
    }

    #[tokio::test]
    async fn cycles_are_reported_against_the_input() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/pages/a.html", "<!--=include b.html -->");
        fs.add_file("./app/pages/b.html", "<!--=include a.html -->");

        let transform = IncludeTransform::new(Vec::new()).unwrap();
        let err = transform.apply(&ctx(&fs, &["./app/pages/a.html"])).await.unwrap_err();

        assert_eq!(err.path, Some(PathBuf::from("./app/pages/a.html")));
        assert!(format!("{:#}", err.cause).contains("include cycle"));
    }

    #[tokio::test]
    async fn missing_include_names_the_target() {
        let fs = MockFileSystem::new();
        fs.add_file("./app/pages/a.html", "<!--=include nope.html -->");

        let transform = IncludeTransform::new(Vec::new()).unwrap();
        let err = transform.apply(&ctx(&fs, &["./app/pages/a.html"])).await.unwrap_err();

        assert!(format!("{:#}", err.cause).contains("nope.html"));
    }
}
