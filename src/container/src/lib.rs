//! Local development environment engine
//!
//! This crate reconciles a devstack environment against a container runtime:
//! the shared reverse proxy, one web container per site, and disposable tool
//! containers. The runtime's labels are the only state; nothing is persisted.
//! It combines bootstrap (reconcilers and workflows), common (types), and
//! docker (the bollard-backed runtime) modules.

pub mod progress;
pub mod provisioner;

pub use progress::{ProgressEvent, ProgressStatus};
pub use provisioner::{
    ChannelProgressReporter, ProgressReporter, ProvisionError, TracingProgressReporter,
};

// Bootstrap (reconcilers and workflows)
pub mod bootstrap;
pub use bootstrap::{
    DevstackConfig, EnvironmentHandle, EnvironmentLocks, InitOptions, InitReport, SiteSpec,
    TaskSpec, TemplateRenderer, UtilityOutcome, Workflows,
};

// Common types and traits
pub mod common;
pub use common::*;

// Docker Engine API runtime
pub mod docker;
pub use docker::DockerRuntime;
