/// Export the proxy's root certificate so the host can trust it
use crate::bootstrap::tasks::{ContainerTask, ExecTask};
use crate::bootstrap::workflow::{run_tasks, TaskExecutor};
use crate::common::labels;
use crate::common::{ContainerFilter, ContainerRuntime};
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Root CA certificate generated by the proxy inside its data volume
pub const ROOT_CA_PATH: &str = "/data/caddy/pki/authorities/local/root.crt";

/// Copy the proxy's root certificate for `environment` to `dest`.
///
/// Returns the number of bytes written.
pub async fn trust(
    runtime: Arc<dyn ContainerRuntime>,
    environment: &str,
    dest: &Path,
    cancel: CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<usize, ProvisionError> {
    let filter = ContainerFilter::all().label(labels::PROXY, environment);
    let containers = runtime
        .list_containers(&filter)
        .await
        .map_err(|e| ProvisionError::runtime("unable to list the containers", e))?;

    let proxy = containers
        .iter()
        .find(|c| c.has_name(environment))
        .ok_or_else(|| {
            ProvisionError::Config(format!(
                "no proxy container for environment '{}'; run init first",
                environment
            ))
        })?;

    if !proxy.state.is_running() {
        return Err(ProvisionError::Runtime(format!(
            "proxy container {} is not running",
            proxy.id
        )));
    }

    let tasks = [ContainerTask::exec(ExecTask::new(
        "export-root-certificate",
        vec!["cat".to_string(), ROOT_CA_PATH.to_string()],
    ))];
    let executor = TaskExecutor::new(runtime.clone(), proxy.id.clone()).with_cancellation(cancel);
    let results = run_tasks(&tasks, &executor, |status, name| {
        progress.emit_detailed(status, name.to_string(), "trust", environment)
    })
    .await?;

    let certificate = results
        .into_iter()
        .next()
        .map(|r| r.stdout)
        .unwrap_or_default();
    if certificate.trim().is_empty() {
        return Err(ProvisionError::Runtime(format!(
            "proxy returned an empty certificate from {}",
            ROOT_CA_PATH
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, certificate.as_bytes())?;

    tracing::info!(
        "[Trust] Wrote root certificate for '{}' to {}",
        environment,
        dest.display()
    );

    Ok(certificate.len())
}
