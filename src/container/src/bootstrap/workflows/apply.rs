/// Reconcile every configured site of an environment
use crate::bootstrap::config::SiteSpec;
use crate::bootstrap::lock::EnvironmentLocks;
use crate::bootstrap::site::{SiteAction, SiteOutcome, SiteReconciler};
use crate::provisioner::{ProgressReporter, ProvisionError};

/// Sites are reconciled in order under the environment lock; the first
/// failure stops the run and earlier sites keep their new state.
pub async fn apply(
    reconciler: &SiteReconciler,
    locks: &EnvironmentLocks,
    environment: &str,
    sites: &[SiteSpec],
    progress: &dyn ProgressReporter,
) -> Result<Vec<SiteOutcome>, ProvisionError> {
    let _guard = locks.acquire(environment).await;

    if sites.is_empty() {
        tracing::info!("[Apply] No sites configured for '{}'", environment);
        return Ok(Vec::new());
    }

    let started = std::time::Instant::now();
    let mut outcomes = Vec::with_capacity(sites.len());
    for site in sites {
        let outcome = reconciler
            .start_or_create(environment, site, progress)
            .await?;
        outcomes.push(outcome);
    }

    let changed = outcomes
        .iter()
        .filter(|o| o.action != SiteAction::Unchanged)
        .count();
    tracing::info!(
        "[TIMING] Applied {} site(s) to '{}' ({} changed) in {}ms",
        outcomes.len(),
        environment,
        changed,
        started.elapsed().as_millis()
    );

    Ok(outcomes)
}
