/// UtilityRunner - runs one-shot tool containers against a local working path
/// Examples: composer install, composer create-project
use crate::bootstrap::image_manager::ImageManager;
use crate::bootstrap::resources::{self, EnsuredResource};
use crate::common::labels;
use crate::common::{
    ContainerRuntime, ContainerSpec, IdentityLabels, ImageReference, OutputChunk, ResourceKey,
    ResourceKind,
};
use crate::provisioner::{ProgressReporter, ProvisionError};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Working directory of task containers; the local path is mounted here
pub const TASK_WORKDIR: &str = "/app";

/// One invocation of a tool inside a disposable container
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub tool: String,
    pub version: String,
    pub image: ImageReference,
    /// Command-line handed to the image's entrypoint
    pub args: Vec<String>,
    /// Absolute local working path
    pub path: PathBuf,
    /// Directory inside the container backed by the cache volume
    pub cache_dir: String,
}

impl TaskSpec {
    /// Task using the tool's official image at `version`
    pub fn new(tool: &str, version: &str, path: PathBuf, cache_dir: &str) -> Self {
        Self {
            tool: tool.to_string(),
            version: version.to_string(),
            image: ImageReference::tool(tool, version),
            args: Vec::new(),
            path,
            cache_dir: cache_dir.to_string(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn volume_name(&self) -> String {
        volume_name(&self.path.to_string_lossy(), &self.tool, &self.version)
    }

    fn identity(&self) -> IdentityLabels {
        IdentityLabels::task(&self.tool, &self.path.to_string_lossy())
    }
}

/// Cache volume name for a (path, tool, version) triple.
///
/// Lower-cased; both path separators and `:` become `_`, leading `_` removed.
/// `C:\Src\App` and `/c/src/app` therefore share a volume.
pub fn volume_name(path: &str, tool: &str, version: &str) -> String {
    let name: String = format!("{}_{}_{}", path, tool, version)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect();
    name.trim_start_matches('_').to_string()
}

/// Result of a finished task container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityOutcome {
    pub container_id: String,
    pub volume: String,
    pub exit_code: i64,
}

impl UtilityOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs tool containers that are created, streamed, and removed per call
pub struct UtilityRunner {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageManager,
    cancel: CancellationToken,
}

impl UtilityRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        tracing::debug!("[UtilityRunner] Initializing");
        Self {
            images: ImageManager::new(runtime.clone()),
            runtime,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `task` to completion, copying its output to `stdout` and `stderr`.
    ///
    /// A non-zero exit is reported in the outcome, not as an error.
    pub async fn run(
        &self,
        task: &TaskSpec,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &dyn ProgressReporter,
    ) -> Result<UtilityOutcome, ProvisionError> {
        tracing::info!(
            "[UtilityRunner] Running {} {:?} in {} with image {}",
            task.tool,
            task.args,
            task.path.display(),
            task.image
        );

        self.images.ensure_image(&task.image, progress).await?;

        let volume = self.ensure_cache_volume(task, progress).await?;

        let spec = ContainerSpec {
            image: task.image.reference.clone(),
            labels: task.identity().into_map(),
            binds: vec![
                (task.path.to_string_lossy().into_owned(), TASK_WORKDIR.to_string()),
                (volume.id.clone(), task.cache_dir.clone()),
            ],
            cmd: Some(task.args.clone()),
            working_dir: Some(TASK_WORKDIR.to_string()),
            attach_output: true,
            ..ContainerSpec::default()
        };

        let container_id = self.runtime.create_container(&spec).await.map_err(|e| {
            ProvisionError::runtime(&format!("unable to create the {} container", task.tool), e)
        })?;
        tracing::debug!("[UtilityRunner] Created container {}", container_id);

        match self.stream(&container_id, stdout, stderr).await {
            Ok(exit_code) => {
                self.runtime
                    .remove_container(&container_id)
                    .await
                    .map_err(|e| ProvisionError::runtime("unable to remove the container", e))?;

                tracing::info!(
                    "[UtilityRunner] {} exited with {} (container {} removed)",
                    task.tool,
                    exit_code,
                    container_id
                );

                Ok(UtilityOutcome {
                    container_id,
                    volume: volume.id,
                    exit_code,
                })
            }
            Err(err) => {
                if let Err(cleanup) = self.runtime.remove_container(&container_id).await {
                    tracing::warn!(
                        "[UtilityRunner] Failed to remove container {} after error: {}",
                        container_id,
                        cleanup
                    );
                }
                Err(err)
            }
        }
    }

    async fn ensure_cache_volume(
        &self,
        task: &TaskSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<EnsuredResource, ProvisionError> {
        let key = ResourceKey {
            kind: ResourceKind::Volume,
            name: task.volume_name(),
            labels: task.identity().with(labels::VOLUME, &task.volume_name()),
        };
        resources::ensure(&*self.runtime, &key, progress).await
    }

    /// Attach, start, copy output until the stream closes, then read the exit code
    async fn stream(
        &self,
        container_id: &str,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<i64, ProvisionError> {
        // Attach first so output emitted right after start is not lost
        let mut output = self
            .runtime
            .attach_container(container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to attach to the container", e))?;

        self.runtime
            .start_container(container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to start the container", e))?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled(format!("container {}", container_id)));
                }
                chunk = output.next() => match chunk {
                    Some(Ok(OutputChunk::Stdout(bytes))) => stdout.write_all(&bytes).await?,
                    Some(Ok(OutputChunk::Stderr(bytes))) => stderr.write_all(&bytes).await?,
                    Some(Err(e)) => {
                        return Err(ProvisionError::runtime(
                            "unable to copy the output of the container",
                            e,
                        ));
                    }
                    None => break,
                },
            }
        }
        stdout.flush().await?;
        stderr.flush().await?;

        let record = self
            .runtime
            .inspect_container(container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to inspect the container", e))?;

        Ok(record.exit_code.unwrap_or_else(|| {
            tracing::warn!(
                "[UtilityRunner] No exit code reported for container {}",
                container_id
            );
            -1
        }))
    }
}

/// Composer defaults
pub mod composer {
    use super::*;

    pub const TOOL: &str = "composer";
    pub const DEFAULT_VERSION: &str = "2";
    pub const CACHE_DIR: &str = "/root/.composer";
    pub const MANIFEST: &str = "composer.json";
    /// The only action allowed without a manifest
    pub const CREATE_PROJECT: &str = "create-project";
    pub const VERSION_FLAG: &str = "--composer-version";

    /// Separate `--composer-version[=]<v>` from the arguments passed to composer
    pub fn split_version(args: &[String]) -> (Option<String>, Vec<String>) {
        let mut version = None;
        let mut rest = Vec::with_capacity(args.len());
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(v) = arg.strip_prefix(&format!("{}=", VERSION_FLAG)) {
                version = Some(v.to_string());
            } else if arg == VERSION_FLAG {
                version = iter.next().cloned();
            } else {
                rest.push(arg.clone());
            }
        }
        (version.filter(|v| !v.is_empty()), rest)
    }

    /// Build a composer task for `path`, checking for a manifest when required
    pub fn task(
        path: &Path,
        version: Option<&str>,
        args: Vec<String>,
    ) -> Result<TaskSpec, ProvisionError> {
        let Some(action) = args.first() else {
            return Err(ProvisionError::Config(
                "composer needs at least one argument".to_string(),
            ));
        };

        if action != CREATE_PROJECT {
            let manifest = path.join(MANIFEST);
            if !manifest.is_file() {
                return Err(ProvisionError::Config(format!(
                    "unable to find file {}",
                    manifest.display()
                )));
            }
        }

        let version = version.unwrap_or(DEFAULT_VERSION);
        Ok(TaskSpec::new(TOOL, version, path.to_path_buf(), CACHE_DIR).with_args(args))
    }
}
