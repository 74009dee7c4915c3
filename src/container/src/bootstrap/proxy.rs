/// Proxy bootstrapper: network, volume, image and reverse-proxy container for an environment
use crate::bootstrap::image_manager::ImageManager;
use crate::bootstrap::lock::EnvironmentLocks;
use crate::bootstrap::ports::{PortBindings, PortRole};
use crate::bootstrap::resources;
use crate::common::labels;
use crate::common::{
    ContainerFilter, ContainerRuntime, ContainerSpec, IdentityLabels, ImageReference, ResourceKey,
};
use crate::progress::ProgressStatus;
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::collections::HashMap;
use std::sync::Arc;

/// Version stamped on the proxy image tag and its labels
pub const PROXY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mount point of the environment volume inside the proxy
pub const PROXY_DATA_DIR: &str = "/data";

/// Host address proxy ports are published on
pub const PUBLISH_ADDRESS: &str = "127.0.0.1";

/// Resolved identifiers of a bootstrapped environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Environment name; also the network, volume and proxy container name
    pub name: String,
    pub network_id: String,
    pub volume_name: String,
    pub proxy_container_id: String,

    /// Ports the proxy was created with; `None` for proxies created before
    /// ports were recorded in labels
    pub ports: Option<PortBindings>,
}

/// Orders setup of everything the environment-wide proxy needs.
pub struct ProxyBootstrapper {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageManager,
    locks: EnvironmentLocks,
    port_overrides: Option<HashMap<String, String>>,
    version: String,
}

impl ProxyBootstrapper {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, locks: EnvironmentLocks) -> Self {
        Self {
            images: ImageManager::new(runtime.clone()),
            runtime,
            locks,
            port_overrides: None,
            version: PROXY_VERSION.to_string(),
        }
    }

    /// Read port overrides from `vars` instead of the process environment
    pub fn with_port_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.port_overrides = Some(vars);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    fn resolve_ports(&self) -> Result<PortBindings, ProvisionError> {
        match &self.port_overrides {
            Some(vars) => PortBindings::resolve(|key| vars.get(key).cloned()),
            None => PortBindings::from_env(),
        }
    }

    /// Bring the environment's network, volume and proxy to a running state.
    ///
    /// Steps run in a fixed order; the first failure is returned and
    /// nothing already created is undone.
    pub async fn bootstrap(
        &self,
        environment: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<EnvironmentHandle, ProvisionError> {
        let _guard = self.locks.acquire(environment).await;
        tracing::info!("[ProxyBootstrapper] Checking environment '{}'", environment);

        // 1. network and volume
        let network =
            resources::ensure(&*self.runtime, &ResourceKey::network(environment), progress).await?;
        let volume =
            resources::ensure(&*self.runtime, &ResourceKey::volume(environment), progress).await?;

        // 2. proxy image
        let image = ImageReference::proxy(&self.version);
        self.images.ensure_image(&image, progress).await?;

        // 3. existing proxy container, guarded by exact name
        let filter = ContainerFilter::all().label(labels::PROXY, environment);
        let containers = self
            .runtime
            .list_containers(&filter)
            .await
            .map_err(|e| ProvisionError::runtime("unable to list the containers", e))?;

        let existing = containers.iter().find(|c| c.has_name(environment));

        let (container_id, running, ports) = match existing {
            Some(proxy) => {
                tracing::debug!(
                    "[ProxyBootstrapper] Found proxy {} ({:?})",
                    proxy.id,
                    proxy.state
                );
                progress.emit_detailed(
                    ProgressStatus::Ready,
                    "proxy ready".to_string(),
                    "proxy",
                    environment,
                );
                (
                    proxy.id.clone(),
                    proxy.state.is_running(),
                    ports_from_labels(&proxy.labels),
                )
            }
            None => {
                // 4. resolve ports, then create
                let ports = self.resolve_ports()?;
                progress.emit_detailed(
                    ProgressStatus::Pending,
                    "creating proxy".to_string(),
                    "proxy",
                    environment,
                );

                let spec = proxy_container_spec(
                    environment,
                    &image,
                    &volume.id,
                    &ports,
                    &self.version,
                );
                let id = self.runtime.create_container(&spec).await.map_err(|e| {
                    ProvisionError::runtime(
                        &format!("unable to create the container from image {}", image),
                        e,
                    )
                })?;

                tracing::info!(
                    "[ProxyBootstrapper] Created proxy {} publishing {:?}",
                    id,
                    ports.to_vec()
                );
                progress.emit_detailed(
                    ProgressStatus::Done,
                    "created proxy".to_string(),
                    "proxy",
                    environment,
                );
                (id, false, Some(ports))
            }
        };

        // 5. start
        if !running {
            self.runtime
                .start_container(&container_id)
                .await
                .map_err(|e| ProvisionError::runtime("unable to start the proxy container", e))?;
            tracing::info!("[ProxyBootstrapper] Started proxy {}", container_id);
        }

        Ok(EnvironmentHandle {
            name: environment.to_string(),
            network_id: network.id,
            volume_name: volume.id,
            proxy_container_id: container_id,
            ports,
        })
    }
}

fn port_label(role: PortRole) -> String {
    format!("{}.port.{}", labels::PREFIX, role.as_str())
}

fn ports_from_labels(labels: &HashMap<String, String>) -> Option<PortBindings> {
    let get = |role: PortRole| labels.get(&port_label(role))?.parse::<u16>().ok();
    Some(PortBindings {
        http: get(PortRole::Http)?,
        https: get(PortRole::Https)?,
        api: get(PortRole::Api)?,
        debugger: get(PortRole::Debugger)?,
    })
}

/// Container spec for an environment's proxy
pub fn proxy_container_spec(
    environment: &str,
    image: &ImageReference,
    volume: &str,
    ports: &PortBindings,
    version: &str,
) -> ContainerSpec {
    let mut identity = IdentityLabels::proxy(environment, version);
    for role in PortRole::ALL {
        identity = identity.with(&port_label(role), &ports.get(role).to_string());
    }

    ContainerSpec {
        name: Some(environment.to_string()),
        image: image.reference.clone(),
        labels: identity.into_map(),
        binds: vec![(volume.to_string(), PROXY_DATA_DIR.to_string())],
        network: Some(environment.to_string()),
        ports: ports.to_vec(),
        publish_address: Some(PUBLISH_ADDRESS.to_string()),
        ..ContainerSpec::default()
    }
}
