// tests/dev_session.rs

use std::error::Error;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

use assetwatch::config::{ConfigFile, TransformKind};
use assetwatch::fs::{FileSystem, RealFileSystem};
use assetwatch::registry::TaskRegistry;
use assetwatch::session::{DevSession, SessionOptions};
use assetwatch::types::ReloadKind;
use assetwatch_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use assetwatch_test_utils::{init_tracing, with_timeout, write_file};

type TestResult = Result<(), Box<dyn Error>>;

fn config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task(
            "scripts",
            TaskConfigBuilder::new(TransformKind::Concat, "dist/js")
                .input("src/js/*.js")
                .file("main.js")
                .build(),
        )
        .with_watch(&["src/js/*.js"], &["scripts"])
        .with_reload_watch(&["dist/*.html"], ReloadKind::Full)
        .with_serve_dir("dist")
        .build()
}

async fn start(root: &std::path::Path, serve: bool) -> Result<DevSession, Box<dyn Error>> {
    let cfg = config();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = Arc::new(TaskRegistry::from_config(&cfg, root, fs)?);
    let options = SessionOptions {
        serve,
        force: false,
        port: Some(0),
    };
    Ok(DevSession::start(&cfg, root, registry, options).await?)
}

#[tokio::test]
async fn rapid_writes_rebuild_once_and_notify_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "src/js/app.js", "start();");
    write_file(dir.path(), "dist/index.html", "<html><body></body></html>");

    let session = start(dir.path(), false).await?;
    assert!(session.watch_errors().is_empty());
    let mut browser = session.notifier().subscribe();
    sleep(Duration::from_millis(100)).await;

    for i in 0..10 {
        write_file(dir.path(), "src/js/app.js", &format!("step({i});"));
        sleep(Duration::from_millis(5)).await;
    }

    let message = timeout(Duration::from_secs(3), browser.recv()).await??;
    assert_eq!(message.kind, ReloadKind::Full);
    assert!(message.paths.iter().any(|p| p.ends_with("dist/js/main.js")));

    // Nothing else arrives once the burst has settled.
    assert!(timeout(Duration::from_millis(600), browser.recv()).await.is_err());

    let built = std::fs::read_to_string(dir.path().join("dist/js/main.js"))?;
    assert_eq!(built, "step(9);");

    let summary = with_timeout(session.stop()).await?;
    assert!(summary.failed.is_empty());
    Ok(())
}

#[tokio::test]
async fn reload_only_binding_notifies_without_rebuilding() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "src/js/app.js", "start();");
    write_file(dir.path(), "dist/index.html", "<html><body></body></html>");

    let session = start(dir.path(), false).await?;
    let mut browser = session.notifier().subscribe();
    sleep(Duration::from_millis(100)).await;

    write_file(dir.path(), "dist/index.html", "<html><body>changed</body></html>");

    let message = timeout(Duration::from_secs(3), browser.recv()).await??;
    assert_eq!(message.kind, ReloadKind::Full);
    assert!(!dir.path().join("dist/js/main.js").exists());

    with_timeout(session.stop()).await?;
    Ok(())
}

#[tokio::test]
async fn server_injects_client_and_streams_reloads() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "src/js/app.js", "start();");
    write_file(dir.path(), "dist/index.html", "<html><body>hi</body></html>");

    let session = start(dir.path(), true).await?;
    let addr = session.server_addr().ok_or("server not started")?;

    // Plain page request.
    let mut page = TcpStream::connect(addr).await?;
    page.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await?;
    let mut response = String::new();
    with_timeout(page.read_to_string(&mut response)).await?;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains(r#"<script src="/__assetwatch/client.js"></script></body>"#));

    // Escaping the served directory is refused.
    let mut escape = TcpStream::connect(addr).await?;
    escape.write_all(b"GET /../src/js/app.js HTTP/1.1\r\n\r\n").await?;
    let mut response = String::new();
    with_timeout(escape.read_to_string(&mut response)).await?;
    assert!(response.starts_with("HTTP/1.1 403"), "{response}");

    // SSE stream receives a reload triggered through the engine.
    let events = TcpStream::connect(addr).await?;
    let mut events = BufReader::new(events);
    events
        .get_mut()
        .write_all(b"GET /__assetwatch/events HTTP/1.1\r\n\r\n")
        .await?;
    let mut line = String::new();
    loop {
        line.clear();
        with_timeout(events.read_line(&mut line)).await?;
        if line.starts_with(": connected") {
            break;
        }
    }

    session.trigger("scripts").await?;

    let mut frame = Vec::new();
    loop {
        line.clear();
        with_timeout(events.read_line(&mut line)).await?;
        if line.trim().is_empty() && !frame.is_empty() {
            break;
        }
        if !line.trim().is_empty() {
            frame.push(line.trim().to_string());
        }
    }
    assert_eq!(frame[0], "event: reload");
    assert_eq!(frame[1], r#"data: {"kind":"full","paths":["/js/main.js"]}"#);

    with_timeout(session.stop()).await?;
    Ok(())
}

#[tokio::test]
async fn bound_directory_created_after_start_is_watched() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "src/js/app.js", "start();");
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "scripts",
            TaskConfigBuilder::new(TransformKind::Concat, "dist/js")
                .input("src/js/*.js")
                .file("main.js")
                .build(),
        )
        .with_reload_watch(&["gen/html/*.html"], ReloadKind::Full)
        .build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = Arc::new(TaskRegistry::from_config(&cfg, dir.path(), fs)?);
    let options = SessionOptions {
        serve: false,
        force: false,
        port: None,
    };

    let session = DevSession::start(&cfg, dir.path(), registry, options).await?;
    assert!(session.watch_errors().is_empty());
    let mut browser = session.notifier().subscribe();

    std::fs::create_dir_all(dir.path().join("gen/html"))?;
    sleep(Duration::from_millis(100)).await;
    write_file(dir.path(), "gen/html/index.html", "<html></html>");

    let message = timeout(Duration::from_secs(3), browser.recv()).await??;
    assert_eq!(message.kind, ReloadKind::Full);

    with_timeout(session.stop()).await?;
    Ok(())
}

#[tokio::test]
async fn failed_start_leaves_no_engine_behind() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "src/js/app.js", "start();");
    let cfg = config();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = Arc::new(TaskRegistry::from_config(&cfg, dir.path(), fs)?);

    // Occupy a port so the dev server cannot bind it.
    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let options = SessionOptions {
        serve: true,
        force: false,
        port: Some(taken.local_addr()?.port()),
    };

    let result = DevSession::start(&cfg, dir.path(), Arc::clone(&registry), options).await;
    assert!(result.is_err());
    assert_eq!(Arc::strong_count(&registry), 1);
    Ok(())
}
