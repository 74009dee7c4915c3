//! Progress events emitted while reconciling an environment.

use serde::{Deserialize, Serialize};

/// What happened to a resource
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// An operation on the resource has started
    Pending,
    /// The pending operation finished
    Done,
    /// The resource already matched; nothing was done
    Ready,
    /// The resource drifted and is being rebuilt
    Updating,
}

/// A progress event for a single resource.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ProgressEvent {
    pub fn new(status: ProgressStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            phase: None,
            resource: None,
        }
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}
