//! Top-level workflows behind the CLI commands.
//!
//! `init` bootstraps the environment and, unless told otherwise, follows up
//! with `apply` and `trust`.

mod apply;
mod trust;

pub use apply::apply;
pub use trust::{trust, ROOT_CA_PATH};

use crate::bootstrap::config::SiteSpec;
use crate::bootstrap::lock::EnvironmentLocks;
use crate::bootstrap::proxy::{EnvironmentHandle, ProxyBootstrapper};
use crate::bootstrap::site::{SiteOutcome, SiteReconciler};
use crate::bootstrap::template_renderer::TemplateRenderer;
use crate::bootstrap::utility_runner::{TaskSpec, UtilityOutcome, UtilityRunner};
use crate::common::ContainerRuntime;
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Stop after the proxy is running
    pub skip_apply: bool,
    /// Where `trust` writes the root certificate; `None` skips trust
    pub certificate: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub environment: EnvironmentHandle,
    pub sites: Vec<SiteOutcome>,
    pub certificate: Option<PathBuf>,
}

/// Engine entry points sharing one runtime and one lock table
pub struct Workflows {
    runtime: Arc<dyn ContainerRuntime>,
    locks: EnvironmentLocks,
    bootstrapper: ProxyBootstrapper,
    reconciler: SiteReconciler,
    runner: UtilityRunner,
    cancel: CancellationToken,
}

impl Workflows {
    /// `home` resolves relative site paths
    pub fn new(runtime: Arc<dyn ContainerRuntime>, home: PathBuf) -> Result<Self, ProvisionError> {
        let locks = EnvironmentLocks::new();
        Ok(Self {
            bootstrapper: ProxyBootstrapper::new(runtime.clone(), locks.clone()),
            reconciler: SiteReconciler::new(runtime.clone(), home)?,
            runner: UtilityRunner::new(runtime.clone()),
            runtime,
            locks,
            cancel: CancellationToken::new(),
        })
    }

    /// Resolve proxy ports from `vars` instead of the process environment
    pub fn with_port_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.bootstrapper = self.bootstrapper.with_port_overrides(vars);
        self
    }

    pub fn with_templates(mut self, templates: TemplateRenderer) -> Self {
        self.reconciler = self.reconciler.with_templates(templates);
        self
    }

    /// Abort in-container waits and task streaming when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.reconciler = self.reconciler.with_cancellation(cancel.clone());
        self.runner = self.runner.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub async fn init(
        &self,
        environment: &str,
        sites: &[SiteSpec],
        options: &InitOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<InitReport, ProvisionError> {
        let handle = self.bootstrapper.bootstrap(environment, progress).await?;

        if options.skip_apply {
            tracing::info!("[Init] Skipping apply for '{}'", environment);
            return Ok(InitReport {
                environment: handle,
                sites: Vec::new(),
                certificate: None,
            });
        }

        let outcomes = self.apply(environment, sites, progress).await?;

        let certificate = match &options.certificate {
            Some(dest) => {
                self.trust(environment, dest, progress).await?;
                Some(dest.clone())
            }
            None => None,
        };

        tracing::info!("[Init] '{}' is ready", environment);
        Ok(InitReport {
            environment: handle,
            sites: outcomes,
            certificate,
        })
    }

    pub async fn apply(
        &self,
        environment: &str,
        sites: &[SiteSpec],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<SiteOutcome>, ProvisionError> {
        apply(&self.reconciler, &self.locks, environment, sites, progress).await
    }

    pub async fn trust(
        &self,
        environment: &str,
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<usize, ProvisionError> {
        trust(
            self.runtime.clone(),
            environment,
            dest,
            self.cancel.clone(),
            progress,
        )
        .await
    }

    pub async fn run_task(
        &self,
        task: &TaskSpec,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &dyn ProgressReporter,
    ) -> Result<UtilityOutcome, ProvisionError> {
        self.runner.run(task, stdout, stderr, progress).await
    }
}
