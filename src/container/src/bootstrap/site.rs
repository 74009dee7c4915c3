//! Site container reconciler.
//!
//! Per site: create when absent, leave untouched when it matches, destroy
//! and recreate when it drifted. There is no in-place update.

use crate::bootstrap::archive;
use crate::bootstrap::config::SiteSpec;
use crate::bootstrap::drift::{self, DesiredSite};
use crate::bootstrap::embedded_templates::NGINX_VHOST;
use crate::bootstrap::image_manager::ImageManager;
use crate::bootstrap::tasks::{ContainerTask, ExecTask};
use crate::bootstrap::template_renderer::TemplateRenderer;
use crate::bootstrap::workflow::{run_tasks, TaskExecutor};
use crate::common::labels;
use crate::common::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerState, IdentityLabels,
    ImageReference,
};
use crate::progress::ProgressStatus;
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the site's local path is mounted
pub const SITE_MOUNT_TARGET: &str = "/app";

/// Address every site hostname and alias resolves to inside the container
pub const LOOPBACK_ADDRESS: &str = "127.0.0.1";

/// Variable telling in-container services how to reach the host machine
pub const HOST_CALLBACK_ENV: &str = "XDEBUG_CONFIG";
pub const HOST_CALLBACK_VALUE: &str = "client_host=host.docker.internal";

/// Directory the generated virtual host is staged in
pub const VHOST_STAGING_DIR: &str = "/tmp";
pub const VHOST_FILE_NAME: &str = "default.conf";
/// Final location of the virtual host inside the site container
pub const VHOST_PATH: &str = "/etc/nginx/conf.d/default.conf";

/// Lifecycle of a site container during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    /// No container exists for the site
    Absent,
    /// A container was created and is being started and provisioned
    Creating,
    /// The container is running and provisioned
    Running,
    /// A drifted or half-provisioned container is being stopped and removed
    Draining,
}

impl RebuildState {
    fn as_str(&self) -> &'static str {
        match self {
            RebuildState::Absent => "absent",
            RebuildState::Creating => "creating",
            RebuildState::Running => "running",
            RebuildState::Draining => "draining",
        }
    }
}

/// What reconciliation did to the site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAction {
    Created,
    Unchanged,
    Rebuilt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteOutcome {
    pub hostname: String,
    pub container_id: String,
    pub action: SiteAction,
    /// States the site passed through, in order
    pub transitions: Vec<RebuildState>,
}

/// Tracks and reports the state of one site's container
struct Lifecycle<'a> {
    hostname: &'a str,
    state: RebuildState,
    transitions: Vec<RebuildState>,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Lifecycle<'a> {
    fn new(hostname: &'a str, state: RebuildState, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            hostname,
            state,
            transitions: vec![state],
            progress,
        }
    }

    fn transition(&mut self, next: RebuildState) {
        tracing::debug!(
            "[SiteReconciler] {}: {} -> {}",
            self.hostname,
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
        self.transitions.push(next);

        let status = match next {
            RebuildState::Draining => ProgressStatus::Updating,
            RebuildState::Running => ProgressStatus::Done,
            RebuildState::Absent | RebuildState::Creating => ProgressStatus::Pending,
        };
        self.progress
            .emit_detailed(status, next.as_str().to_string(), "site", self.hostname);
    }
}

pub struct SiteReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageManager,
    templates: TemplateRenderer,
    home: PathBuf,
    cancel: CancellationToken,
}

impl SiteReconciler {
    /// `home` resolves relative and `~`-prefixed site paths
    pub fn new(runtime: Arc<dyn ContainerRuntime>, home: PathBuf) -> Result<Self, ProvisionError> {
        Ok(Self {
            images: ImageManager::new(runtime.clone()),
            templates: TemplateRenderer::from_env_or_embedded()?,
            runtime,
            home,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_templates(mut self, templates: TemplateRenderer) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creation-time attributes the site's container must carry
    pub fn desired(&self, site: &SiteSpec) -> Result<DesiredSite, ProvisionError> {
        let path = site.abs_path(&self.home)?;

        let mut env: BTreeMap<String, String> = BTreeMap::new();
        env.insert(HOST_CALLBACK_ENV.to_string(), HOST_CALLBACK_VALUE.to_string());
        for (key, value) in &site.env {
            env.insert(key.clone(), value.clone());
        }

        let extra_hosts = std::iter::once(&site.hostname)
            .chain(site.aliases.iter())
            .map(|host| (host.clone(), LOOPBACK_ADDRESS.to_string()))
            .collect();

        Ok(DesiredSite {
            image: ImageReference::site(&site.version).reference,
            mount_source: path.to_string_lossy().into_owned(),
            mount_target: SITE_MOUNT_TARGET.to_string(),
            env,
            extra_hosts,
        })
    }

    /// Create, keep, or rebuild the container for `site` in `environment`.
    pub async fn start_or_create(
        &self,
        environment: &str,
        site: &SiteSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<SiteOutcome, ProvisionError> {
        let hostname = site.hostname.as_str();
        let desired = self.desired(site)?;

        let filter = ContainerFilter::all()
            .label(labels::HOST, hostname)
            .label(labels::ENVIRONMENT, environment);
        let containers = self
            .runtime
            .list_containers(&filter)
            .await
            .map_err(|e| ProvisionError::runtime("error getting a list of containers", e))?;

        let Some(existing) = containers
            .iter()
            .find(|c| c.has_name(hostname))
            .or_else(|| containers.first())
        else {
            let mut lifecycle = Lifecycle::new(hostname, RebuildState::Absent, progress);
            let container_id = self.create(environment, site, &desired, &mut lifecycle).await?;
            return Ok(SiteOutcome {
                hostname: hostname.to_string(),
                container_id,
                action: SiteAction::Created,
                transitions: lifecycle.transitions,
            });
        };

        // At most one container per site; extras are removed
        for duplicate in containers.iter().filter(|c| c.id != existing.id) {
            tracing::warn!(
                "[SiteReconciler] Removing duplicate container {} for {}",
                duplicate.id,
                hostname
            );
            progress.emit_detailed(
                ProgressStatus::Updating,
                "removing duplicate".to_string(),
                "site",
                hostname,
            );
            self.discard(&duplicate.id).await?;
        }

        let observed = self
            .runtime
            .inspect_container(&existing.id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to inspect the container", e))?;

        let drift = drift::detect(&desired, &observed);
        // A container never started was left behind by an interrupted create
        let interrupted = observed.state == ContainerState::Created;

        if !drift.is_drifted() && !interrupted {
            tracing::debug!("[SiteReconciler] {} is up to date", hostname);
            progress.emit_detailed(
                ProgressStatus::Ready,
                "ready".to_string(),
                "site",
                hostname,
            );
            return Ok(SiteOutcome {
                hostname: hostname.to_string(),
                container_id: existing.id.clone(),
                action: SiteAction::Unchanged,
                transitions: vec![RebuildState::Running],
            });
        }

        tracing::info!(
            "[SiteReconciler] Rebuilding {} (drift: {:?}, interrupted: {})",
            hostname,
            drift.fields,
            interrupted
        );

        let mut lifecycle = Lifecycle::new(hostname, RebuildState::Running, progress);
        lifecycle.transition(RebuildState::Draining);

        self.discard(&existing.id).await?;
        lifecycle.transition(RebuildState::Absent);

        let container_id = self.create(environment, site, &desired, &mut lifecycle).await?;

        Ok(SiteOutcome {
            hostname: hostname.to_string(),
            container_id,
            action: SiteAction::Rebuilt,
            transitions: lifecycle.transitions,
        })
    }

    async fn create(
        &self,
        environment: &str,
        site: &SiteSpec,
        desired: &DesiredSite,
        lifecycle: &mut Lifecycle<'_>,
    ) -> Result<String, ProvisionError> {
        let image = ImageReference::site(&site.version);
        self.images.ensure_image(&image, lifecycle.progress).await?;

        let identity = IdentityLabels::site(environment, &site.hostname)
            .with(labels::ENV_KEYS, &desired.env_keys_label());

        let spec = ContainerSpec {
            name: Some(site.hostname.clone()),
            image: desired.image.clone(),
            env: desired.env_list(),
            labels: identity.into_map(),
            binds: vec![(desired.mount_source.clone(), desired.mount_target.clone())],
            extra_hosts: desired.extra_hosts_list(),
            network: Some(environment.to_string()),
            ..ContainerSpec::default()
        };

        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| ProvisionError::runtime("unable to create the container", e))?;
        lifecycle.transition(RebuildState::Creating);

        self.runtime
            .start_container(&container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to start the container", e))?;

        if site.has_custom_webroot() {
            if let Err(err) = self
                .install_vhost(&container_id, site, lifecycle.progress)
                .await
            {
                // A half-provisioned container must not be found again as up to date
                tracing::error!(
                    "[SiteReconciler] Provisioning {} failed, removing {}: {}",
                    site.hostname,
                    container_id,
                    err
                );
                lifecycle.transition(RebuildState::Draining);
                if let Err(cleanup) = self.discard(&container_id).await {
                    tracing::warn!(
                        "[SiteReconciler] Failed to remove {} after error: {}",
                        container_id,
                        cleanup
                    );
                }
                lifecycle.transition(RebuildState::Absent);
                return Err(err);
            }

            self.runtime
                .start_container(&container_id)
                .await
                .map_err(|e| ProvisionError::runtime("unable to start the container", e))?;
        }

        tracing::info!(
            "[SiteReconciler] Site {} running in {}",
            site.hostname,
            container_id
        );
        lifecycle.transition(RebuildState::Running);

        Ok(container_id)
    }

    /// Stop and remove a container
    async fn discard(&self, container_id: &str) -> Result<(), ProvisionError> {
        self.runtime
            .stop_container(container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to stop the container", e))?;
        self.runtime
            .remove_container(container_id)
            .await
            .map_err(|e| ProvisionError::runtime("unable to remove the container", e))
    }

    /// Render the virtual host for the site's document root and install it
    async fn install_vhost(
        &self,
        container_id: &str,
        site: &SiteSpec,
        progress: &dyn ProgressReporter,
    ) -> Result<(), ProvisionError> {
        let conf = self.render_vhost(&site.dir)?;
        let archive = archive::single_file(VHOST_FILE_NAME, conf.as_bytes(), 0o644)?;
        let staged = format!("{}/{}", VHOST_STAGING_DIR, VHOST_FILE_NAME);

        let tasks = vec![
            ContainerTask::copy("stage-nginx-file", VHOST_STAGING_DIR, archive),
            ContainerTask::exec(ExecTask::new(
                "copy-nginx-file",
                vec!["cp".to_string(), staged, VHOST_PATH.to_string()],
            )),
            ContainerTask::exec(ExecTask::new(
                "set-nginx-permissions",
                vec![
                    "chmod".to_string(),
                    "0644".to_string(),
                    VHOST_PATH.to_string(),
                ],
            )),
        ];

        let executor = TaskExecutor::new(self.runtime.clone(), container_id.to_string())
            .with_cancellation(self.cancel.clone());
        run_tasks(&tasks, &executor, |status, name| {
            progress.emit_detailed(status, name.to_string(), "provision", &site.hostname)
        })
        .await?;

        Ok(())
    }

    /// Virtual host configuration serving `webroot` under the site mount
    pub fn render_vhost(&self, webroot: &str) -> Result<String, ProvisionError> {
        let mut vars = HashMap::new();
        vars.insert("app_root".to_string(), SITE_MOUNT_TARGET.to_string());
        vars.insert(
            "webroot".to_string(),
            webroot.trim_matches('/').to_string(),
        );
        self.templates.render(NGINX_VHOST, &vars)
    }
}
