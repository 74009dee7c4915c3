/// ExecTask: run a command inside a container
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExecTask {
    pub name: String,
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl ExecTask {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn display_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }
}
