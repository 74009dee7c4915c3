/// Image manager: make sure an image is present locally, pulling when absent
use crate::common::{ContainerRuntime, ImageReference};
use crate::progress::ProgressStatus;
use crate::provisioner::{ProgressReporter, ProvisionError};
use std::sync::Arc;

/// Image manager for container images
pub struct ImageManager {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Ensure image is available (pull if needed). Returns true when a pull happened.
    pub async fn ensure_image(
        &self,
        image: &ImageReference,
        progress: &dyn ProgressReporter,
    ) -> Result<bool, ProvisionError> {
        tracing::debug!("[ImageManager] Ensuring image is available: {}", image);

        let local = self
            .runtime
            .list_images(&image.reference)
            .await
            .map_err(|e| ProvisionError::Image(format!("unable to get a list of images: {}", e)))?;

        if !local.is_empty() {
            tracing::debug!("[ImageManager] Image found locally: {}", image);
            return Ok(false);
        }

        progress.emit_detailed(
            ProgressStatus::Pending,
            "pulling image".to_string(),
            "image",
            &image.reference,
        );

        let started = std::time::Instant::now();
        self.runtime
            .pull_image(&image.reference)
            .await
            .map_err(|e| ProvisionError::Image(format!("unable to pull {}: {}", image, e)))?;

        tracing::info!(
            "[ImageManager] Pulled {} in {}ms",
            image,
            started.elapsed().as_millis()
        );
        progress.emit_detailed(
            ProgressStatus::Done,
            "pulled image".to_string(),
            "image",
            &image.reference,
        );

        Ok(true)
    }
}
