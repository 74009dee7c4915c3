/// ContainerTask: unified task type for in-container provisioning steps
use super::exec_task::ExecTask;

/// Copy an in-memory tar archive into a directory of the container
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub name: String,
    pub dest_dir: String,
    pub archive: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ContainerTask {
    Copy(CopyTask),
    Exec(ExecTask),
}

impl ContainerTask {
    pub fn display_name(&self) -> String {
        match self {
            ContainerTask::Copy(task) => task.name.clone(),
            ContainerTask::Exec(task) => task.display_name(),
        }
    }

    pub fn exec(task: ExecTask) -> Self {
        ContainerTask::Exec(task)
    }

    pub fn copy(name: impl Into<String>, dest_dir: impl Into<String>, archive: Vec<u8>) -> Self {
        ContainerTask::Copy(CopyTask {
            name: name.into(),
            dest_dir: dest_dir.into(),
            archive,
        })
    }
}
