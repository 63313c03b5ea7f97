use crate::discovery::find_managed;
use crate::labels::stored_fingerprint;
use crate::reconcile::{reconcile, Reconciliation};
use crate::run::{run, RunOptions};
use crate::CoreError;
use keeper_runtime::{ContainerStatus, Driver};
use keeper_schema::{ContainerId, ContainerSpec, ContainerState, Fingerprint};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point for every keeper operation, bound to one driver for the
/// lifetime of the process.
///
/// `status`, `stop` and `remove` return `Ok(None)` when keeper manages no
/// container for the name; that is an expected outcome, not an error.
pub struct Engine {
    driver: Arc<dyn Driver>,
}

impl Engine {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub async fn pull(&self, spec: &ContainerSpec, cancel: &CancellationToken) -> Result<(), CoreError> {
        info!("pulling image {}", spec.image);
        self.driver
            .pull_image(&spec.image, cancel)
            .await
            .map_err(|e| CoreError::driver("pull image", e))
    }

    pub async fn reconcile(
        &self,
        spec: &ContainerSpec,
        cancel: &CancellationToken,
    ) -> Result<Reconciliation, CoreError> {
        reconcile(self.driver.as_ref(), spec, cancel).await
    }

    pub async fn run<O, E>(
        &self,
        spec: &ContainerSpec,
        options: &RunOptions,
        stdout: O,
        stderr: E,
        shutdown: &CancellationToken,
    ) -> Result<i64, CoreError>
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        run(self.driver.as_ref(), spec, options, stdout, stderr, shutdown).await
    }

    pub async fn status(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerState>, CoreError> {
        let Some(record) = find_managed(self.driver.as_ref(), name, cancel).await? else {
            return Ok(None);
        };
        Ok(Some(ContainerState {
            fingerprint: Fingerprint::new(stored_fingerprint(&record).unwrap_or_default()),
            status: record.status.to_string(),
            exit_code: (record.status == ContainerStatus::Stopped).then_some(record.exit_code),
            id: record.id,
        }))
    }

    /// Request a graceful stop; the record is kept.
    pub async fn stop(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerId>, CoreError> {
        let Some(record) = find_managed(self.driver.as_ref(), name, cancel).await? else {
            return Ok(None);
        };
        info!("stopping container {name} ({})", record.id.short());
        self.driver
            .stop_container(&record.id, cancel)
            .await
            .map_err(|e| CoreError::driver("stop container", e))?;
        Ok(Some(record.id))
    }

    pub async fn remove(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerId>, CoreError> {
        let Some(record) = find_managed(self.driver.as_ref(), name, cancel).await? else {
            return Ok(None);
        };
        info!("removing container {name} ({})", record.id.short());
        self.driver
            .remove_container(&record.id, cancel)
            .await
            .map_err(|e| CoreError::driver("remove container", e))?;
        Ok(Some(record.id))
    }
}
