pub mod image;
pub mod labels;
/// Container runtime types and traits
///
/// This module defines the capability surface the engine needs from a
/// container runtime, the records it reports, and the identity labels that
/// tie runtime resources back to an environment.
pub mod types;

pub use image::ImageReference;
pub use labels::{IdentityLabels, ResourceKey, ResourceKind, ResourceRole};
pub use types::{
    ContainerError, ContainerFilter, ContainerRecord, ContainerRuntime, ContainerSpec,
    ContainerState, ContainerSummary, ExecSpec, ExecStatus, MountRecord, NetworkSummary,
    OutputChunk, OutputStream, VolumeSummary,
};
