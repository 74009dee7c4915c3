/// Resource reconciler: create-if-absent for networks and volumes
use crate::common::{ContainerRuntime, ResourceKey, ResourceKind};
use crate::progress::ProgressStatus;
use crate::provisioner::{ProgressReporter, ProvisionError};

/// Result of ensuring a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredResource {
    /// Network id, or volume name
    pub id: String,
    pub created: bool,
}

/// Select the candidate whose name is exactly `name`.
///
/// Runtime name filters are substring matches, so a query for `dev` also
/// returns `dev-host`. Only the literal match identifies the resource.
pub fn exact_match<'a, T, F>(name: &str, candidates: &'a [T], name_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    candidates.iter().find(|c| name_of(c) == name)
}

/// Ensure the resource identified by `key` exists, creating it when absent.
///
/// Not safe against concurrent callers for the same key; hold the
/// environment lock (see [`crate::bootstrap::lock::EnvironmentLocks`]).
pub async fn ensure(
    runtime: &dyn ContainerRuntime,
    key: &ResourceKey,
    progress: &dyn ProgressReporter,
) -> Result<EnsuredResource, ProvisionError> {
    let existing = match key.kind {
        ResourceKind::Network => {
            let networks = runtime
                .list_networks(&key.name)
                .await
                .map_err(|e| ProvisionError::Network(format!("unable to list networks: {}", e)))?;
            exact_match(&key.name, &networks, |n| n.name.as_str()).map(|n| n.id.clone())
        }
        ResourceKind::Volume => {
            let volumes = runtime
                .list_volumes(&key.name)
                .await
                .map_err(|e| ProvisionError::Volume(format!("unable to list volumes: {}", e)))?;
            exact_match(&key.name, &volumes, |v| v.name.as_str()).map(|v| v.name.clone())
        }
    };

    if let Some(id) = existing {
        tracing::debug!(
            "[ResourceReconciler] {} '{}' already exists ({})",
            key.kind,
            key.name,
            id
        );
        progress.emit_detailed(
            ProgressStatus::Ready,
            format!("{} ready", key.kind),
            "resources",
            &key.name,
        );
        return Ok(EnsuredResource { id, created: false });
    }

    progress.emit_detailed(
        ProgressStatus::Pending,
        format!("creating {}", key.kind),
        "resources",
        &key.name,
    );

    let id = match key.kind {
        ResourceKind::Network => runtime
            .create_network(&key.name, key.labels.as_map())
            .await
            .map_err(|e| ProvisionError::Network(format!("unable to create the network: {}", e)))?,
        ResourceKind::Volume => runtime
            .create_volume(&key.name, key.labels.as_map())
            .await
            .map_err(|e| ProvisionError::Volume(format!("unable to create the volume: {}", e)))?,
    };

    tracing::info!(
        "[ResourceReconciler] Created {} '{}' ({})",
        key.kind,
        key.name,
        id
    );
    progress.emit_detailed(
        ProgressStatus::Done,
        format!("created {}", key.kind),
        "resources",
        &key.name,
    );

    Ok(EnsuredResource { id, created: true })
}
