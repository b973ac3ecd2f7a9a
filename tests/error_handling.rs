// tests/error_handling.rs

use std::io::Write;
use std::sync::Arc;

use assetwatch::config::{load_and_validate, ConfigFile, TransformKind};
use assetwatch::errors::BuildError;
use assetwatch::fs::mock::MockFileSystem;
use assetwatch::pipeline::{self, PipelineExecutor, RunPolicy};
use assetwatch::registry::TaskRegistry;
use assetwatch_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use assetwatch_test_utils::init_tracing;
use tempfile::NamedTempFile;

fn load(src: &str) -> assetwatch::errors::Result<ConfigFile> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{src}").unwrap();
    load_and_validate(file.path())
}

#[test]
fn test_pipeline_cycle_returns_structured_error() {
    let result = load(
        r#"
[task.a]
inputs = ["a/*.txt"]
output = "out/a"
transform = "copy"

[pipeline.first]
series = ["a", "second"]

[pipeline.second]
parallel = ["first"]
"#,
    );

    match result {
        Err(BuildError::PipelineCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("first") || msg.contains("second"));
        }
        Err(e) => panic!("Expected PipelineCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_pipeline_member_returns_config_error() {
    let result = load(
        r#"
[task.a]
inputs = ["a/*.txt"]
output = "out/a"
transform = "copy"

[pipeline.build]
series = ["a", "NonExistent"]
"#,
    );

    match result {
        Err(BuildError::ConfigError(msg)) => {
            assert!(msg.contains("unknown member"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_invalid_toml_returns_toml_error() {
    let result = load("[task.a\ninputs = ");
    assert!(matches!(result, Err(BuildError::TomlError(_))), "got {result:?}");
}

#[test]
fn test_missing_config_file_returns_io_error() {
    let result = load_and_validate("/definitely/not/here/Assetwatch.toml");
    assert!(matches!(result, Err(BuildError::IoError(_))), "got {result:?}");
}

#[test]
fn test_debounce_below_minimum_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task(
            "a",
            TaskConfigBuilder::new(TransformKind::Copy, "out")
                .input("src/*")
                .build(),
        )
        .with_debounce_ms(20)
        .raw();

    match ConfigFile::try_from(raw) {
        Err(BuildError::ConfigError(msg)) => assert!(msg.contains("debounce_ms")),
        other => panic!("Expected ConfigError, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_overlapping_outputs_fail_registration() {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "scripts",
            TaskConfigBuilder::new(TransformKind::Concat, "app/dist")
                .input("app/js/*.js")
                .file("main.js")
                .build(),
        )
        .with_task(
            "images",
            TaskConfigBuilder::new(TransformKind::Copy, "app/dist/images")
                .input("app/images/*.png")
                .build(),
        )
        .build();

    let fs = Arc::new(MockFileSystem::new());
    let err = TaskRegistry::from_config(&cfg, std::path::Path::new("."), fs).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, BuildError::OutputOverlap { .. }));
    assert!(msg.contains("images") && msg.contains("scripts"), "{msg}");
}

#[tokio::test]
async fn test_failing_task_reports_task_file_and_cause() {
    init_tracing();
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "pages",
            TaskConfigBuilder::new(TransformKind::Include, "app")
                .input("app/pages/*.html")
                .build(),
        )
        .with_series("build", &["pages"])
        .build();

    let fs = MockFileSystem::new();
    fs.add_file("./app/pages/index.html", "<!--=include missing.html -->");
    let registry = Arc::new(
        TaskRegistry::from_config(&cfg, std::path::Path::new("."), Arc::new(fs)).unwrap(),
    );

    let node = pipeline::expand(&cfg, "build").unwrap();
    let err = PipelineExecutor::new(registry, RunPolicy::Always)
        .run(&node)
        .await
        .unwrap_err();

    match err {
        BuildError::Transform(e) => {
            assert_eq!(e.task, "pages");
            let msg = e.to_string();
            assert!(msg.contains("pages"), "{msg}");
            assert!(msg.contains("missing.html"), "{msg}");
        }
        other => panic!("Expected TransformError, got: {:?}", other),
    }
}
