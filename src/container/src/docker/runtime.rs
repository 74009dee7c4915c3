//! Docker Engine API runtime implementation
//!
//! Connects through the local defaults (`DOCKER_HOST` or the platform socket).

use crate::common::{
    ContainerError, ContainerFilter, ContainerRecord, ContainerRuntime, ContainerSpec,
    ContainerState, ContainerSummary, ExecSpec, ExecStatus, ImageReference, MountRecord,
    NetworkSummary, OutputChunk, OutputStream, VolumeSummary,
};
use crate::docker::error::is_not_modified;
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ExecConfig, HostConfig, NetworkCreateRequest, PortBinding,
    VolumeCreateRequest,
};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    InspectContainerOptions, ListContainersOptions, ListImagesOptions, ListNetworksOptions,
    ListVolumesOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder, UploadToContainerOptionsBuilder,
};
use bollard::Docker;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;

/// Seconds the engine waits before killing a container being stopped
const STOP_TIMEOUT_SECS: i32 = 10;

/// Container runtime backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()?;
        tracing::debug!("[DockerRuntime] Connected with local defaults");
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Check the engine answers before doing any work
    pub async fn ping(&self) -> Result<(), ContainerError> {
        self.docker.ping().await?;
        Ok(())
    }
}

fn filters(pairs: &[(&str, String)]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        map.entry(key.to_string()).or_default().push(value.clone());
    }
    map
}

fn state_of(status: Option<String>) -> ContainerState {
    status
        .map(|s| ContainerState::from_status(&s))
        .unwrap_or_else(|| ContainerState::Other("unknown".to_string()))
}

fn log_chunk(item: Result<LogOutput, BollardError>) -> Option<Result<OutputChunk, ContainerError>> {
    match item {
        Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
            Some(Ok(OutputChunk::Stdout(message)))
        }
        Ok(LogOutput::StdErr { message }) => Some(Ok(OutputChunk::Stderr(message))),
        Ok(LogOutput::StdIn { .. }) => None,
        Err(e) => Some(Err(e.into())),
    }
}

/// Container create body for `spec`
fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let binds: Vec<String> = spec
        .binds
        .iter()
        .map(|(source, target)| format!("{}:{}", source, target))
        .collect();

    let exposed_ports = (!spec.ports.is_empty()).then(|| {
        spec.ports
            .iter()
            .map(|port| format!("{}/tcp", port))
            .collect::<Vec<_>>()
    });

    let port_bindings = (!spec.ports.is_empty()).then(|| {
        spec.ports
            .iter()
            .map(|port| {
                (
                    format!("{}/tcp", port),
                    Some(vec![PortBinding {
                        host_ip: spec.publish_address.clone(),
                        host_port: Some(port.to_string()),
                    }]),
                )
            })
            .collect::<HashMap<_, _>>()
    });

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        labels: Some(spec.labels.clone()),
        exposed_ports,
        cmd: spec.cmd.clone(),
        working_dir: spec.working_dir.clone(),
        attach_stdout: spec.attach_output.then_some(true),
        attach_stderr: spec.attach_output.then_some(true),
        tty: Some(false),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: spec.network.clone(),
            port_bindings,
            extra_hosts: (!spec.extra_hosts.is_empty()).then(|| spec.extra_hosts.clone()),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

fn exec_config(spec: &ExecSpec) -> ExecConfig {
    ExecConfig {
        cmd: Some(spec.command.clone()),
        user: spec.user.clone(),
        attach_stdout: Some(spec.attach_stdout),
        attach_stderr: Some(spec.attach_stderr),
        tty: Some(spec.tty),
        ..ExecConfig::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>, ContainerError> {
        let options = ListNetworksOptions {
            filters: Some(filters(&[("name", name.to_string())])),
            ..ListNetworksOptions::default()
        };
        let networks = self.docker.list_networks(Some(options)).await?;

        Ok(networks
            .into_iter()
            .map(|n| NetworkSummary {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            attachable: Some(true),
            labels: Some(labels.clone()),
            ..NetworkCreateRequest::default()
        };
        let response = self.docker.create_network(request).await?;
        tracing::debug!("[DockerRuntime] Created network {} ({})", name, response.id);
        Ok(response.id)
    }

    async fn list_volumes(&self, name: &str) -> Result<Vec<VolumeSummary>, ContainerError> {
        let options = ListVolumesOptions {
            filters: Some(filters(&[("name", name.to_string())])),
            ..ListVolumesOptions::default()
        };
        let response = self.docker.list_volumes(Some(options)).await?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeSummary {
                name: v.name,
                labels: v.labels,
            })
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError> {
        let options = VolumeCreateRequest {
            name: Some(name.to_string()),
            driver: Some("local".to_string()),
            labels: Some(labels.clone()),
            ..VolumeCreateRequest::default()
        };
        let volume = self.docker.create_volume(options).await?;
        tracing::debug!("[DockerRuntime] Created volume {}", volume.name);
        Ok(volume.name)
    }

    async fn list_images(&self, reference: &str) -> Result<Vec<String>, ContainerError> {
        let options = ListImagesOptions {
            filters: Some(filters(&[("reference", reference.to_string())])),
            ..ListImagesOptions::default()
        };
        let images = self.docker.list_images(Some(options)).await?;
        Ok(images.into_iter().map(|i| i.id).collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), ContainerError> {
        let image = ImageReference::parse(reference).map_err(ContainerError::Other)?;
        let from_image = image.repository();

        tracing::info!("[DockerRuntime] Pulling {}:{}", from_image, image.tag);
        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(&from_image)
                        .tag(&image.tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let pairs: Vec<(&str, String)> = filter
            .labels
            .iter()
            .map(|(key, value)| ("label", format!("{}={}", key, value)))
            .collect();
        let options = ListContainersOptions {
            all: filter.all,
            filters: Some(filters(&pairs)),
            ..ListContainersOptions::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: state_of(c.state.map(|s| s.to_string())),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, ContainerError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let config = inspect.config.unwrap_or_default();
        let (status, exit_code) = inspect
            .state
            .map(|s| (s.status.map(|st| st.to_string()), s.exit_code))
            .unwrap_or((None, None));

        let mounts = inspect
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountRecord {
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
            })
            .collect();

        let networks = inspect
            .network_settings
            .and_then(|n| n.networks)
            .map(|n| n.into_keys().collect())
            .unwrap_or_default();

        Ok(ContainerRecord {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: config.image.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            mounts,
            extra_hosts: inspect
                .host_config
                .and_then(|h| h.extra_hosts)
                .unwrap_or_default(),
            networks,
            labels: config.labels.unwrap_or_default(),
            state: state_of(status),
            exit_code,
        })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let options = spec
            .name
            .as_deref()
            .map(|name| CreateContainerOptionsBuilder::new().name(name).build());
        let response = self
            .docker
            .create_container(options, create_body(spec))
            .await?;

        for warning in &response.warnings {
            tracing::warn!("[DockerRuntime] {}", warning);
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ContainerError> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                tracing::debug!("[DockerRuntime] Container {} already running", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), ContainerError> {
        let options = StopContainerOptionsBuilder::new()
            .t(STOP_TIMEOUT_SECS)
            .build();
        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn create_exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
    ) -> Result<String, ContainerError> {
        let created = self
            .docker
            .create_exec(container_id, exec_config(spec))
            .await?;
        Ok(created.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<OutputStream, ContainerError> {
        let options = StartExecOptions {
            detach: false,
            ..StartExecOptions::default()
        };
        match self.docker.start_exec(exec_id, Some(options)).await? {
            StartExecResults::Attached { output, .. } => {
                Ok(output.filter_map(|item| async move { log_chunk(item) }).boxed())
            }
            StartExecResults::Detached => Err(ContainerError::Runtime(format!(
                "exec {} started detached",
                exec_id
            ))),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError> {
        let inspect = self.docker.inspect_exec(exec_id).await?;
        Ok(ExecStatus {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn copy_to_container(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), ContainerError> {
        let options = UploadToContainerOptionsBuilder::new().path(dest_dir).build();
        self.docker
            .upload_to_container(
                container_id,
                Some(options),
                bollard::body_full(Bytes::from(archive)),
            )
            .await?;
        Ok(())
    }

    async fn attach_container(&self, id: &str) -> Result<OutputStream, ContainerError> {
        let options = AttachContainerOptionsBuilder::new()
            .stream(true)
            .stdout(true)
            .stderr(true)
            .logs(true)
            .build();
        let attached = self.docker.attach_container(id, Some(options)).await?;
        Ok(attached
            .output
            .filter_map(|item| async move { log_chunk(item) })
            .boxed())
    }
}
