pub mod container_task;
pub mod exec_task;

pub use container_task::{ContainerTask, CopyTask};
pub use exec_task::ExecTask;
