/// Per-environment serialization of list-then-create sequences
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by environment name.
///
/// Covers callers inside one process only; separate processes targeting the
/// same environment must still be serialized by whoever launches them.
#[derive(Default, Clone)]
pub struct EnvironmentLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `environment`
    pub async fn acquire(&self, environment: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry(environment.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        tracing::trace!("[EnvironmentLocks] Waiting for '{}'", environment);
        lock.lock_owned().await
    }
}
