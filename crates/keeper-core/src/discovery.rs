use crate::labels::discovery_labels;
use crate::CoreError;
use keeper_runtime::{ContainerRecord, Driver};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Look up the record keeper manages for the logical `name`.
///
/// More than one match is reported as [`CoreError::Ambiguous`]; it is never
/// resolved by picking one.
pub async fn find_managed(
    driver: &dyn Driver,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Option<ContainerRecord>, CoreError> {
    let found = driver
        .find_container(name, &discovery_labels(name), cancel)
        .await
        .map_err(|e| CoreError::driver("find container", e))?;
    match &found {
        Some(record) => debug!("found {} container {} for {name}", record.status, record.id.short()),
        None => debug!("no managed container for {name}"),
    }
    Ok(found)
}
