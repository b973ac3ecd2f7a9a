// tests/css_scenario.rs

use std::error::Error;
use std::sync::Arc;

use assetwatch::config::load_and_validate;
use assetwatch::fs::{FileSystem, RealFileSystem};
use assetwatch::pipeline::{self, PipelineExecutor, RunPolicy};
use assetwatch::registry::TaskRegistry;
use assetwatch_test_utils::{init_tracing, write_file};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const CONFIG: &str = r#"
[task.styles]
inputs = ["app/scss/style.scss"]
output = "app/css"
transform = "css"
file = "style.min.css"
browsers = ["last 10 versions"]

[pipeline.build]
series = ["styles"]
"#;

fn setup(style: &str) -> Result<(TempDir, Arc<TaskRegistry>), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "Assetwatch.toml", CONFIG);
    write_file(dir.path(), "app/scss/style.scss", style);

    let cfg = load_and_validate(dir.path().join("Assetwatch.toml"))?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = TaskRegistry::from_config(&cfg, dir.path(), fs)?;
    Ok((dir, Arc::new(registry)))
}

#[tokio::test]
async fn styles_task_writes_compressed_css() -> TestResult {
    init_tracing();
    let (dir, registry) = setup("body {\n  color: red;\n}\n")?;

    let report = registry.run("styles").await?;

    assert_eq!(report.artifacts.len(), 1);
    let css = std::fs::read_to_string(dir.path().join("app/css/style.min.css"))?;
    assert!(css.contains("body{color:red}"), "got: {css}");
    Ok(())
}

#[tokio::test]
async fn vendor_prefixes_follow_browser_targets() -> TestResult {
    init_tracing();
    let (dir, registry) = setup(".btn { user-select: none; }")?;

    registry.run("styles").await?;

    let css = std::fs::read_to_string(dir.path().join("app/css/style.min.css"))?;
    assert_eq!(
        css,
        ".btn{-webkit-user-select:none;-moz-user-select:none;-ms-user-select:none;user-select:none}"
    );
    Ok(())
}

#[tokio::test]
async fn second_build_is_skipped_and_identical() -> TestResult {
    init_tracing();
    let (dir, registry) = setup("body{color:red}")?;
    let cfg = load_and_validate(dir.path().join("Assetwatch.toml"))?;
    let node = pipeline::expand(&cfg, "build")?;

    let first = PipelineExecutor::new(Arc::clone(&registry), RunPolicy::IfStale)
        .run(&node)
        .await?;
    assert_eq!(first.ran.len(), 1);
    let before = first.ran[0].artifacts[0].hash.clone();

    let second = PipelineExecutor::new(Arc::clone(&registry), RunPolicy::IfStale)
        .run(&node)
        .await?;
    assert!(second.ran.is_empty());
    assert_eq!(second.skipped, vec!["styles".to_string()]);

    let forced = PipelineExecutor::new(registry, RunPolicy::Always)
        .run(&node)
        .await?;
    assert_eq!(forced.ran[0].artifacts[0].hash, before);
    Ok(())
}

#[tokio::test]
async fn scss_that_needs_compiling_fails_with_file_and_cause() -> TestResult {
    init_tracing();
    let (dir, registry) = setup(
        "// header\n$accent: red;\n.nav {\n  a { color: $accent; }\n  &:hover { color: blue; }\n}\n",
    )?;

    let err = registry.run("styles").await.unwrap_err();

    match err {
        assetwatch::errors::BuildError::Transform(e) => {
            assert_eq!(e.task, "styles");
            assert!(e.path.as_deref().is_some_and(|p| p.ends_with("app/scss/style.scss")));
            assert!(e.to_string().contains("Sass compiler"), "{e}");
        }
        other => panic!("Expected TransformError, got: {:?}", other),
    }
    assert!(!dir.path().join("app/css/style.min.css").exists());
    Ok(())
}
