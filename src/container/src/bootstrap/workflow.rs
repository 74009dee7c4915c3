/// Provisioning executor for container tasks.
///
/// Runs exec and copy tasks inside a running container and reports each
/// command's exit code and captured output.
use crate::bootstrap::tasks::{ContainerTask, CopyTask, ExecTask};
use crate::common::{ContainerRuntime, ExecSpec, ExecStatus, OutputChunk};
use crate::progress::ProgressStatus;
use crate::provisioner::ProvisionError;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// First delay between exec status polls
const POLL_INITIAL: Duration = Duration::from_millis(10);
/// Upper bound for the poll delay
const POLL_MAX: Duration = Duration::from_millis(500);

/// Result of task execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution context for container tasks; runs commands inside a target container via exec.
pub struct TaskExecutor {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub container_id: String,
    cancel: CancellationToken,
    sink: Option<UnboundedSender<OutputChunk>>,
}

impl TaskExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, container_id: String) -> Self {
        Self {
            runtime,
            container_id,
            cancel: CancellationToken::new(),
            sink: None,
        }
    }

    /// Forward exec output to `sink` as it arrives
    pub fn with_output_sink(mut self, sink: UnboundedSender<OutputChunk>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Abort waits when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute a single task
    pub async fn execute(&self, task: &ContainerTask) -> Result<TaskResult, ProvisionError> {
        match task {
            ContainerTask::Copy(copy) => self.copy(copy).await,
            ContainerTask::Exec(exec_task) => {
                tracing::info!(
                    "[TaskExecutor] Executing task '{}' in container '{}'",
                    exec_task.name,
                    self.container_id,
                );
                let result = self.exec(exec_task).await?;

                if result.success() {
                    tracing::info!(
                        "[TaskExecutor] Task '{}' completed successfully",
                        exec_task.name,
                    );
                } else {
                    tracing::error!(
                        "[TaskExecutor] Task '{}' failed (exit {}): {}",
                        exec_task.name,
                        result.exit_code,
                        result.stderr,
                    );
                }

                Ok(result)
            }
        }
    }

    async fn copy(&self, task: &CopyTask) -> Result<TaskResult, ProvisionError> {
        tracing::info!(
            "[TaskExecutor] Copying '{}' ({} bytes) to {} in container '{}'",
            task.name,
            task.archive.len(),
            task.dest_dir,
            self.container_id,
        );
        self.runtime
            .copy_to_container(&self.container_id, &task.dest_dir, task.archive.clone())
            .await
            .map_err(|e| ProvisionError::runtime(&format!("copy '{}' failed", task.name), e))?;

        Ok(TaskResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn exec(&self, task: &ExecTask) -> Result<TaskResult, ProvisionError> {
        let deadline = Instant::now() + task.get_timeout();

        let exec_id = self
            .runtime
            .create_exec(&self.container_id, &ExecSpec::as_root(task.command.clone()))
            .await
            .map_err(|e| ProvisionError::runtime("Exec create failed", e))?;

        let mut output = self
            .runtime
            .start_exec(&exec_id)
            .await
            .map_err(|e| ProvisionError::runtime("Exec start failed", e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled(format!("task '{}'", task.name)));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ProvisionError::Timeout(format!(
                        "task '{}' after {:?}",
                        task.name,
                        task.get_timeout()
                    )));
                }
                chunk = output.next() => match chunk {
                    Some(Ok(chunk)) => {
                        match &chunk {
                            OutputChunk::Stdout(bytes) => stdout.extend_from_slice(bytes),
                            OutputChunk::Stderr(bytes) => stderr.extend_from_slice(bytes),
                        }
                        if let Some(sink) = &self.sink {
                            // A dropped receiver only stops forwarding
                            let _ = sink.send(chunk);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProvisionError::runtime("unable to read exec output", e));
                    }
                    None => break,
                },
            }
        }

        let status = self.wait(&exec_id, &task.name, task.get_timeout(), deadline).await?;
        let exit_code = status.exit_code.unwrap_or_else(|| {
            tracing::warn!(
                "[TaskExecutor] No exit code reported for task '{}'",
                task.name
            );
            -1
        });

        Ok(TaskResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Poll the exec status with exponential backoff until it stops running
    async fn wait(
        &self,
        exec_id: &str,
        name: &str,
        timeout: Duration,
        deadline: Instant,
    ) -> Result<ExecStatus, ProvisionError> {
        let mut delay = POLL_INITIAL;
        loop {
            let status = self
                .runtime
                .inspect_exec(exec_id)
                .await
                .map_err(|e| ProvisionError::runtime("Exec inspect failed", e))?;

            if !status.running {
                return Ok(status);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled(format!("task '{}'", name)));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ProvisionError::Timeout(format!("task '{}' after {:?}", name, timeout)));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(POLL_MAX);
        }
    }
}

/// Execute a sequence of container tasks in order.
/// Fail-fast: stops on the first task failure.
pub async fn run_tasks<F>(
    tasks: &[ContainerTask],
    executor: &TaskExecutor,
    progress_fn: F,
) -> Result<Vec<TaskResult>, ProvisionError>
where
    F: Fn(ProgressStatus, &str),
{
    let mut results = Vec::with_capacity(tasks.len());

    for task in tasks {
        let display_name = task.display_name();
        progress_fn(ProgressStatus::Pending, &display_name);

        let task_start = std::time::Instant::now();
        let result = executor.execute(task).await?;
        let task_duration = task_start.elapsed();

        if !result.success() {
            let detail = result
                .stderr
                .lines()
                .last()
                .or_else(|| result.stdout.lines().last())
                .unwrap_or("No output available")
                .to_string();
            tracing::warn!(
                "[TIMING] Task {} failed after {}ms",
                display_name,
                task_duration.as_millis()
            );
            return Err(ProvisionError::Task {
                name: display_name,
                exit_code: result.exit_code,
                detail,
            });
        }

        tracing::info!(
            "[TIMING] Task {} completed in {}ms",
            display_name,
            task_duration.as_millis()
        );
        progress_fn(ProgressStatus::Done, &display_name);
        results.push(result);
    }

    Ok(results)
}
