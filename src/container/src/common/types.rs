/// Container-runtime capability surface and the records it reports
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Observed run state of a container
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContainerState {
    /// Created but never started
    Created,
    /// Container is running
    Running,
    /// Container has exited or was stopped
    Exited,
    /// Anything else the runtime reports (paused, restarting, dead, ...)
    Other(String),
}

impl ContainerState {
    /// Map the runtime's status string onto a state
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "exited" | "stopped" => ContainerState::Exited,
            other => ContainerState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

/// Network as returned by a (fuzzy) name query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// Volume as returned by a (fuzzy) name query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSummary {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// Container as returned by a label query
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,

    /// Names as reported by the runtime (Docker prefixes them with `/`)
    pub names: Vec<String>,

    pub image: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// True when one of the reported names is exactly `name`
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n == name || n.strip_prefix('/') == Some(name))
    }
}

/// A mount as observed on an inspected container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub source: String,
    pub destination: String,
}

/// Full observed record of an inspected container
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,

    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,

    pub mounts: Vec<MountRecord>,

    /// Extra hosts in `host:address` form
    pub extra_hosts: Vec<String>,

    pub networks: Vec<String>,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
}

/// Query for containers: label equality filters, optionally including stopped ones
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    pub labels: Vec<(String, String)>,
    pub all: bool,
}

impl ContainerFilter {
    pub fn all() -> Self {
        Self {
            labels: Vec::new(),
            all: true,
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

/// Parameters for creating a container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,

    /// Environment in `KEY=VALUE` form
    pub env: Vec<String>,

    pub labels: HashMap<String, String>,

    /// Host path (or volume name) -> container path
    pub binds: Vec<(String, String)>,

    /// Extra hosts in `host:address` form
    pub extra_hosts: Vec<String>,

    /// Network the container joins
    pub network: Option<String>,

    /// Container ports published at the same number on `publish_address`
    pub ports: Vec<u16>,
    pub publish_address: Option<String>,

    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,

    /// Keep stdout/stderr attachable (ephemeral task containers)
    pub attach_output: bool,
}

/// Parameters for an exec session inside a running container
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub command: Vec<String>,
    pub user: Option<String>,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

impl ExecSpec {
    /// Non-interactive exec as root with both output streams attached
    pub fn as_root(command: Vec<String>) -> Self {
        Self {
            command,
            user: Some("root".to_string()),
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
        }
    }
}

/// Exec session status as reported by inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// One demultiplexed chunk of container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Demultiplexed output stream of an exec session or an attached container
pub type OutputStream = BoxStream<'static, Result<OutputChunk, ContainerError>>;

/// Container runtime operations consumed by the engine.
///
/// Any runtime exposing these is sufficient. Name queries are fuzzy
/// (substring); callers apply their own exact-match guard.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List networks whose name contains `name`
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>, ContainerError>;

    /// Create a network, returning its id
    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError>;

    /// List volumes whose name contains `name`
    async fn list_volumes(&self, name: &str) -> Result<Vec<VolumeSummary>, ContainerError>;

    /// Create a volume, returning its name
    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError>;

    /// List local image ids matching a reference filter
    async fn list_images(&self, reference: &str) -> Result<Vec<String>, ContainerError>;

    /// Pull an image and wait for the pull to finish
    async fn pull_image(&self, reference: &str) -> Result<(), ContainerError>;

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, ContainerError>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError>;

    /// Start a container; starting a running container is not an error
    async fn start_container(&self, id: &str) -> Result<(), ContainerError>;

    async fn stop_container(&self, id: &str) -> Result<(), ContainerError>;

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError>;

    /// Create an exec session, returning its id
    async fn create_exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
    ) -> Result<String, ContainerError>;

    /// Attach to and start an exec session; the stream ends when the session's output closes
    async fn start_exec(&self, exec_id: &str) -> Result<OutputStream, ContainerError>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError>;

    /// Extract a tar archive into `dest_dir` inside the container
    async fn copy_to_container(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), ContainerError>;

    /// Attach to stdout/stderr (including already-emitted logs) of a container
    async fn attach_container(&self, id: &str) -> Result<OutputStream, ContainerError>;
}

/// Container runtime error type
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}
