//! Driver calls that must finish within a fixed time, whatever happens to
//! the cancellation token of the run that issued them.

use crate::CoreError;
use keeper_runtime::{ContainerRecord, Driver, RuntimeError};
use keeper_schema::ContainerId;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn bounded<T>(
    op: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, CoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|e| CoreError::driver(op, e)),
        Err(_) => Err(CoreError::Timeout { op }),
    }
}

/// Stop the container and, with `cleanup`, remove it. Each call gets `limit`.
pub async fn stop_and_cleanup(
    driver: &dyn Driver,
    id: &ContainerId,
    cleanup: bool,
    limit: Duration,
) -> Result<(), CoreError> {
    let detached = CancellationToken::new();

    info!("stopping container {}", id.short());
    bounded("stop container", limit, driver.stop_container(id, &detached)).await?;

    if cleanup {
        info!("removing container {}", id.short());
        bounded("remove container", limit, driver.remove_container(id, &detached)).await?;
    }
    Ok(())
}

pub async fn final_status(
    driver: &dyn Driver,
    id: &ContainerId,
    limit: Duration,
) -> Result<ContainerRecord, CoreError> {
    let detached = CancellationToken::new();
    bounded("get container status", limit, driver.container_status(id, &detached)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), RuntimeError>(())
        };
        let err = bounded("stop container", Duration::from_secs(5), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout { op: "stop container" }));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let ok = bounded("x", Duration::from_secs(1), async { Ok::<u8, RuntimeError>(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let err = bounded("x", Duration::from_secs(1), async {
            Err::<u8, RuntimeError>(RuntimeError::Cancelled)
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
