//! Progress reporting and error types for provisioning operations.

use crate::common::ContainerError;
use crate::progress::{ProgressEvent, ProgressStatus};

/// Channel-based progress reporter.
pub struct ChannelProgressReporter {
    sender: tokio::sync::mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressReporter {
    pub fn new(sender: tokio::sync::mpsc::Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.try_send(event);
    }
}

/// Reporter that only logs; used when nobody renders progress.
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            "[Progress] {:?} {} ({})",
            event.status,
            event.message,
            event.resource.as_deref().unwrap_or("-")
        );
    }
}

/// Progress reporter for provisioning operations.
pub trait ProgressReporter: Send + Sync + 'static {
    fn emit(&self, event: ProgressEvent);

    /// Emit an event tagged with phase and resource.
    fn emit_detailed(&self, status: ProgressStatus, message: String, phase: &str, resource: &str) {
        self.emit(
            ProgressEvent::new(status, message)
                .with_phase(phase)
                .with_resource(resource),
        );
    }
}

/// Error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Volume error: {0}")]
    Volume(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid {role} port override {value:?}: not a port number")]
    Port { role: String, value: String },

    #[error("Task '{name}' failed (exit {exit_code}): {detail}")]
    Task {
        name: String,
        exit_code: i64,
        detail: String,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Wrap a runtime failure with the operation that hit it
    pub fn runtime(context: &str, err: ContainerError) -> Self {
        ProvisionError::Runtime(format!("{}: {}", context, err))
    }
}
