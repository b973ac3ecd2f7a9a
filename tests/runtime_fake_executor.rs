// tests/runtime_fake_executor.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use assetwatch::engine::{
    CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome, TriggerReason,
};
use assetwatch::reload::ReloadNotifier;
use assetwatch::types::ReloadKind;
use assetwatch_test_utils::fake_executor::FakeExecutor;
use assetwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn core() -> CoreRuntime {
    CoreRuntime::new(
        [
            ("styles".to_string(), Some(ReloadKind::Inject)),
            ("scripts".to_string(), Some(ReloadKind::Full)),
            ("fonts".to_string(), None),
        ],
        RuntimeOptions {
            exit_when_idle: true,
        },
    )
}

fn trigger(task: &str) -> RuntimeEvent {
    RuntimeEvent::TaskTriggered {
        task: task.to_string(),
        reason: TriggerReason::FileWatch,
    }
}

async fn run_with(
    executor: FakeExecutor,
    rt_rx: mpsc::Receiver<RuntimeEvent>,
    notifier: ReloadNotifier,
) -> Result<RunSummary, Box<dyn Error>> {
    let runtime = Runtime::new(core(), rt_rx, executor, notifier);

    // Enforce an upper bound on how long this test may run.
    match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(Ok(summary)) => Ok(summary),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("runtime did not reach idle within 3 seconds".into()),
    }
}

#[tokio::test]
async fn triggers_while_running_coalesce_into_one_rerun() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    // The first trigger dispatches; the next three arrive before the
    // completion and collapse into a single pending re-run.
    for _ in 0..4 {
        rt_tx.send(trigger("scripts")).await?;
    }

    let summary = run_with(executor, rt_rx, ReloadNotifier::new()).await?;

    assert!(summary.failed.is_empty());
    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["scripts", "scripts"]);
    Ok(())
}

#[tokio::test]
async fn different_tasks_both_complete_and_notify() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());
    let notifier = ReloadNotifier::new();
    let mut browser = notifier.subscribe();

    rt_tx.send(trigger("styles")).await?;
    rt_tx.send(trigger("scripts")).await?;

    run_with(executor, rt_rx, notifier).await?;

    let mut executed = executed.lock().unwrap().clone();
    executed.sort();
    assert_eq!(executed, vec!["scripts", "styles"]);

    let mut kinds = vec![browser.recv().await?.kind, browser.recv().await?.kind];
    kinds.sort_by_key(|k| format!("{k:?}"));
    assert_eq!(kinds, vec![ReloadKind::Full, ReloadKind::Inject]);
    Ok(())
}

#[tokio::test]
async fn failed_task_is_reported_and_loop_survives() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome("styles", TaskOutcome::Failed("syntax error".into()));
    let notifier = ReloadNotifier::new();
    let mut browser = notifier.subscribe();

    rt_tx.send(trigger("styles")).await?;
    rt_tx.send(trigger("scripts")).await?;

    let summary = run_with(executor, rt_rx, notifier).await?;

    assert_eq!(summary.failed, vec!["styles".to_string()]);
    let message = browser.recv().await?;
    assert_eq!(message.kind, ReloadKind::Full);
    assert_eq!(message.paths, vec![PathBuf::from("scripts.out")]);
    assert!(browser.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn skipped_and_unreloadable_tasks_send_nothing() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome("styles", TaskOutcome::Skipped);
    let notifier = ReloadNotifier::new();
    let mut browser = notifier.subscribe();

    rt_tx.send(trigger("styles")).await?;
    rt_tx.send(trigger("fonts")).await?;

    run_with(executor, rt_rx, notifier).await?;

    assert_eq!(executed.lock().unwrap().len(), 2);
    assert!(browser.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_runtime_with_task_in_flight() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone()).manual_completion();

    rt_tx.send(trigger("scripts")).await?;
    rt_tx.send(RuntimeEvent::ShutdownRequested).await?;

    let summary = run_with(executor, rt_rx, ReloadNotifier::new()).await?;

    assert!(summary.failed.is_empty());
    assert_eq!(executed.lock().unwrap().clone(), vec!["scripts"]);
    Ok(())
}
