//! Docker Engine API runtime
//!
//! Implements [`crate::common::ContainerRuntime`] over bollard.

pub mod error;
pub mod runtime;

pub use runtime::DockerRuntime;
