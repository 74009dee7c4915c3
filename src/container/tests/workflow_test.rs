//! Tests for in-container task execution

mod common;

use common::{FakeRuntime, Op};
use container::bootstrap::{run_tasks, ContainerTask, ExecTask, TaskExecutor};
use container::common::{ContainerSpec, ContainerState, OutputChunk};
use container::progress::ProgressStatus;
use container::ProvisionError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn running_container(runtime: &Arc<FakeRuntime>) -> String {
    let spec = ContainerSpec {
        name: Some("box".to_string()),
        image: "docker.io/library/alpine:3".to_string(),
        ..ContainerSpec::default()
    };
    runtime.add_container(spec, ContainerState::Running)
}

fn exec(name: &str, cmd: &[&str]) -> ContainerTask {
    ContainerTask::exec(ExecTask::new(
        name,
        cmd.iter().map(|s| s.to_string()).collect(),
    ))
}

// ============================================================================
// Single task
// ============================================================================

#[tokio::test]
async fn test_exec_captures_output_and_exit_code() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    runtime.script_exec("php -v", 3, "PHP 8.2.10", "warning: deprecated ini");

    let executor = TaskExecutor::new(runtime.clone(), id);
    let result = executor.execute(&exec("php-version", &["php", "-v"])).await.unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
    assert_eq!(result.stdout, "PHP 8.2.10");
    assert_eq!(result.stderr, "warning: deprecated ini");
}

#[tokio::test]
async fn test_exec_in_stopped_container_is_runtime_error() {
    let runtime = FakeRuntime::new();
    let spec = ContainerSpec {
        name: Some("box".to_string()),
        image: "docker.io/library/alpine:3".to_string(),
        ..ContainerSpec::default()
    };
    let id = runtime.add_container(spec, ContainerState::Exited);

    let executor = TaskExecutor::new(runtime.clone(), id);
    let result = executor.execute(&exec("noop", &["true"])).await;

    assert!(matches!(result, Err(ProvisionError::Runtime(_))));
}

#[tokio::test]
async fn test_copy_task_uploads_archive() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);

    let executor = TaskExecutor::new(runtime.clone(), id.clone());
    let task = ContainerTask::copy("stage", "/tmp", vec![1, 2, 3]);
    let result = executor.execute(&task).await.unwrap();

    assert!(result.success());
    assert_eq!(
        runtime.ops(),
        vec![Op::CopyToContainer(id.clone(), "/tmp".to_string())]
    );
    assert_eq!(
        runtime.container(&id).unwrap().uploads,
        vec![("/tmp".to_string(), vec![1, 2, 3])]
    );
}

#[tokio::test]
async fn test_exec_forwards_output_to_sink() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    runtime.script_exec("composer install", 0, "Installing", "");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let executor = TaskExecutor::new(runtime.clone(), id).with_output_sink(tx);
    executor
        .execute(&exec("install", &["composer", "install"]))
        .await
        .unwrap();
    drop(executor);

    let mut received = Vec::new();
    while let Some(chunk) = rx.recv().await {
        received.push(chunk);
    }
    assert_eq!(
        received,
        vec![OutputChunk::Stdout(bytes::Bytes::from("Installing"))]
    );
}

// ============================================================================
// Cancellation and timeout
// ============================================================================

#[tokio::test]
async fn test_cancellation_aborts_waiting_exec() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    runtime.hang_execs();

    let cancel = CancellationToken::new();
    let executor = TaskExecutor::new(runtime.clone(), id).with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = executor.execute(&exec("sleep", &["sleep", "3600"])).await;
    assert!(matches!(result, Err(ProvisionError::Cancelled(_))));
}

#[tokio::test]
async fn test_exec_times_out() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    runtime.hang_execs();

    let executor = TaskExecutor::new(runtime.clone(), id);
    let task = ContainerTask::exec(
        ExecTask::new("sleep", vec!["sleep".to_string(), "3600".to_string()])
            .with_timeout(Duration::from_millis(30)),
    );

    let result = executor.execute(&task).await;
    assert!(matches!(result, Err(ProvisionError::Timeout(_))));
}

// ============================================================================
// run_tasks
// ============================================================================

#[tokio::test]
async fn test_run_tasks_runs_in_order() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    let executor = TaskExecutor::new(runtime.clone(), id);

    let tasks = vec![exec("first", &["echo", "1"]), exec("second", &["echo", "2"])];
    let seen = Mutex::new(Vec::new());
    let results = run_tasks(&tasks, &executor, |status, name| {
        seen.lock().unwrap().push((status, name.to_string()));
    })
    .await
    .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(
        seen.into_inner().unwrap(),
        vec![
            (ProgressStatus::Pending, "first".to_string()),
            (ProgressStatus::Done, "first".to_string()),
            (ProgressStatus::Pending, "second".to_string()),
            (ProgressStatus::Done, "second".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_run_tasks_stops_at_first_failure() {
    let runtime = FakeRuntime::new();
    let id = running_container(&runtime);
    runtime.script_exec("false", 1, "partial\nlast stdout", "");
    let executor = TaskExecutor::new(runtime.clone(), id);

    let tasks = vec![
        exec("ok", &["true"]),
        exec("broken", &["false"]),
        exec("never", &["echo", "unreachable"]),
    ];
    let err = run_tasks(&tasks, &executor, |_, _| {}).await.unwrap_err();

    match err {
        ProvisionError::Task {
            name,
            exit_code,
            detail,
        } => {
            assert_eq!(name, "broken");
            assert_eq!(exit_code, 1);
            // Falls back to stdout when stderr is empty
            assert_eq!(detail, "last stdout");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.count(|op| matches!(op, Op::CreateExec(_, _))), 2);
}
