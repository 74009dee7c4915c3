//! In-memory container runtime for integration tests
//!
//! Records every call in an operation log so tests can assert on exactly
//! which side effects a reconciliation produced.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use container::common::{
    ContainerError, ContainerFilter, ContainerRecord, ContainerRuntime, ContainerSpec,
    ContainerState, ContainerSummary, ExecSpec, ExecStatus, MountRecord, NetworkSummary,
    OutputChunk, OutputStream, VolumeSummary,
};
use container::{ProgressEvent, ProgressReporter};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    ListNetworks(String),
    CreateNetwork(String),
    ListVolumes(String),
    CreateVolume(String),
    ListImages(String),
    PullImage(String),
    ListContainers,
    InspectContainer(String),
    /// Container name when given, otherwise the image
    CreateContainer(String),
    StartContainer(String),
    StopContainer(String),
    RemoveContainer(String),
    CreateExec(String, Vec<String>),
    StartExec(String),
    InspectExec(String),
    CopyToContainer(String, String),
    AttachContainer(String),
}

impl Op {
    /// Calls that change runtime state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Op::CreateNetwork(_)
                | Op::CreateVolume(_)
                | Op::PullImage(_)
                | Op::CreateContainer(_)
                | Op::StartContainer(_)
                | Op::StopContainer(_)
                | Op::RemoveContainer(_)
                | Op::CreateExec(_, _)
                | Op::CopyToContainer(_, _)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub spec: ContainerSpec,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    /// Archives copied in, keyed by destination directory
    pub uploads: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecScript {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Default)]
struct State {
    networks: Vec<NetworkSummary>,
    volumes: Vec<VolumeSummary>,
    images: HashSet<String>,
    containers: Vec<FakeContainer>,
    next_id: u64,
    ops: Vec<Op>,

    /// Env every container reports in addition to its spec (image defaults)
    baked_env: Vec<String>,

    exec_scripts: HashMap<String, ExecScript>,
    execs: HashMap<String, Vec<String>>,
    hang_execs: bool,

    task_output: Vec<OutputChunk>,
    task_exit_code: i64,
    fail_task_stream: bool,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn container_mut(&mut self, id: &str) -> Result<&mut FakeContainer, ContainerError> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ---- seeding ---------------------------------------------------------

    pub fn add_network(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.next("net");
        state.networks.push(NetworkSummary {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn add_volume(&self, name: &str) {
        self.lock().volumes.push(VolumeSummary {
            name: name.to_string(),
            labels: HashMap::new(),
        });
    }

    pub fn add_image(&self, reference: &str) {
        self.lock().images.insert(reference.to_string());
    }

    /// Insert a container directly, bypassing the op log
    pub fn add_container(&self, spec: ContainerSpec, state: ContainerState) -> String {
        let mut s = self.lock();
        let id = s.next("ctr");
        s.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone().unwrap_or_else(|| id.clone()),
            spec,
            state,
            exit_code: None,
            uploads: Vec::new(),
        });
        id
    }

    pub fn set_baked_env(&self, env: &[&str]) {
        self.lock().baked_env = env.iter().map(|e| e.to_string()).collect();
    }

    /// Script the result of an exec whose command line (space-joined) is `command`
    pub fn script_exec(&self, command: &str, exit_code: i64, stdout: &str, stderr: &str) {
        self.lock().exec_scripts.insert(
            command.to_string(),
            ExecScript {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Exec sessions never produce output nor finish
    pub fn hang_execs(&self) {
        self.lock().hang_execs = true;
    }

    pub fn script_task(&self, output: Vec<OutputChunk>, exit_code: i64) {
        let mut state = self.lock();
        state.task_output = output;
        state.task_exit_code = exit_code;
    }

    /// Attached task output ends with a transport error
    pub fn fail_task_stream(&self) {
        self.lock().fail_task_stream = true;
    }

    pub fn update_container<F: FnOnce(&mut FakeContainer)>(&self, name: &str, f: F) {
        let mut state = self.lock();
        if let Ok(c) = state.container_mut(name) {
            f(c);
        }
    }

    // ---- inspection ------------------------------------------------------

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn mutations(&self) -> Vec<Op> {
        self.ops().into_iter().filter(Op::is_mutation).collect()
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.ops().iter().filter(|op| pred(op)).count()
    }

    pub fn networks(&self) -> Vec<NetworkSummary> {
        self.lock().networks.clone()
    }

    pub fn volumes(&self) -> Vec<VolumeSummary> {
        self.lock().volumes.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.lock().containers.clone()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.name == name || c.id == name)
            .cloned()
    }
}

fn record(c: &FakeContainer, baked_env: &[String]) -> ContainerRecord {
    let mut env = baked_env.to_vec();
    env.extend(c.spec.env.iter().cloned());
    ContainerRecord {
        id: c.id.clone(),
        name: c.name.clone(),
        image: c.spec.image.clone(),
        env,
        mounts: c
            .spec
            .binds
            .iter()
            .map(|(source, destination)| MountRecord {
                source: source.clone(),
                destination: destination.clone(),
            })
            .collect(),
        extra_hosts: c.spec.extra_hosts.clone(),
        networks: c.spec.network.iter().cloned().collect(),
        labels: c.spec.labels.clone(),
        state: c.state.clone(),
        exit_code: c.exit_code,
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::ListNetworks(name.to_string()));
        Ok(state
            .networks
            .iter()
            .filter(|n| n.name.contains(name))
            .cloned()
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        _labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::CreateNetwork(name.to_string()));
        let id = state.next("net");
        state.networks.push(NetworkSummary {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn list_volumes(&self, name: &str) -> Result<Vec<VolumeSummary>, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::ListVolumes(name.to_string()));
        Ok(state
            .volumes
            .iter()
            .filter(|v| v.name.contains(name))
            .cloned()
            .collect())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> Result<String, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::CreateVolume(name.to_string()));
        state.volumes.push(VolumeSummary {
            name: name.to_string(),
            labels: labels.clone(),
        });
        Ok(name.to_string())
    }

    async fn list_images(&self, reference: &str) -> Result<Vec<String>, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::ListImages(reference.to_string()));
        Ok(if state.images.contains(reference) {
            vec![format!("sha256:{}", reference)]
        } else {
            Vec::new()
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::PullImage(reference.to_string()));
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::ListContainers);
        Ok(state
            .containers
            .iter()
            .filter(|c| filter.all || c.state.is_running())
            .filter(|c| {
                filter
                    .labels
                    .iter()
                    .all(|(k, v)| c.spec.labels.get(k) == Some(v))
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.spec.image.clone(),
                state: c.state.clone(),
                labels: c.spec.labels.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerRecord, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::InspectContainer(id.to_string()));
        let baked = state.baked_env.clone();
        let c = state.container_mut(id)?;
        Ok(record(c, &baked))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::CreateContainer(
            spec.name.clone().unwrap_or_else(|| spec.image.clone()),
        ));
        if let Some(name) = &spec.name {
            if state.containers.iter().any(|c| &c.name == name) {
                return Err(ContainerError::Api {
                    status: 409,
                    message: format!("name {} already in use", name),
                });
            }
        }
        let id = state.next("ctr");
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone().unwrap_or_else(|| id.clone()),
            spec: spec.clone(),
            state: ContainerState::Created,
            exit_code: None,
            uploads: Vec::new(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::StartContainer(id.to_string()));
        let exit_code = state.task_exit_code;
        let c = state.container_mut(id)?;
        if c.spec.attach_output {
            // Task containers run to completion
            c.state = ContainerState::Exited;
            c.exit_code = Some(exit_code);
        } else {
            c.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::StopContainer(id.to_string()));
        let c = state.container_mut(id)?;
        c.state = ContainerState::Exited;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::RemoveContainer(id.to_string()));
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id && c.name != id);
        if state.containers.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_exec(
        &self,
        container_id: &str,
        spec: &ExecSpec,
    ) -> Result<String, ContainerError> {
        let mut state = self.lock();
        state
            .ops
            .push(Op::CreateExec(container_id.to_string(), spec.command.clone()));
        let running = state.container_mut(container_id)?.state.is_running();
        if !running {
            return Err(ContainerError::Api {
                status: 409,
                message: format!("container {} is not running", container_id),
            });
        }
        let id = state.next("exec");
        state.execs.insert(id.clone(), spec.command.clone());
        Ok(id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<OutputStream, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::StartExec(exec_id.to_string()));
        if state.hang_execs {
            return Ok(futures::stream::pending::<Result<OutputChunk, ContainerError>>().boxed());
        }
        let command = state
            .execs
            .get(exec_id)
            .ok_or_else(|| ContainerError::NotFound(exec_id.to_string()))?
            .join(" ");
        let script = state.exec_scripts.get(&command).cloned().unwrap_or_default();

        let mut chunks = Vec::new();
        if !script.stdout.is_empty() {
            chunks.push(Ok(OutputChunk::Stdout(Bytes::from(script.stdout))));
        }
        if !script.stderr.is_empty() {
            chunks.push(Ok(OutputChunk::Stderr(Bytes::from(script.stderr))));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::InspectExec(exec_id.to_string()));
        if state.hang_execs {
            return Ok(ExecStatus {
                running: true,
                exit_code: None,
            });
        }
        let command = state
            .execs
            .get(exec_id)
            .ok_or_else(|| ContainerError::NotFound(exec_id.to_string()))?
            .join(" ");
        let exit_code = state
            .exec_scripts
            .get(&command)
            .map(|s| s.exit_code)
            .unwrap_or(0);
        Ok(ExecStatus {
            running: false,
            exit_code: Some(exit_code),
        })
    }

    async fn copy_to_container(
        &self,
        container_id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::CopyToContainer(
            container_id.to_string(),
            dest_dir.to_string(),
        ));
        let c = state.container_mut(container_id)?;
        c.uploads.push((dest_dir.to_string(), archive));
        Ok(())
    }

    async fn attach_container(&self, id: &str) -> Result<OutputStream, ContainerError> {
        let mut state = self.lock();
        state.ops.push(Op::AttachContainer(id.to_string()));
        state.container_mut(id)?;

        let mut items: Vec<Result<OutputChunk, ContainerError>> =
            state.task_output.iter().cloned().map(Ok).collect();
        if state.fail_task_stream {
            items.push(Err(ContainerError::Runtime("connection reset".to_string())));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Reporter that keeps every event for later assertions
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages_for(&self, resource: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.resource.as_deref() == Some(resource))
            .map(|e| e.message)
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
