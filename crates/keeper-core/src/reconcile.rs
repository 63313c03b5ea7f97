use crate::discovery::find_managed;
use crate::labels::{management_labels, stored_fingerprint};
use crate::CoreError;
use keeper_runtime::{ContainerStatus, CreateRequest, Driver};
use keeper_schema::{fingerprint, ContainerId, ContainerSpec, Fingerprint};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What reconciliation had to do to converge on the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A running container already matched; nothing was mutated.
    Attached,
    /// A running container had drifted and was stopped, removed and recreated.
    Replaced,
    /// A created or stopped record was removed and recreated.
    Recreated,
    /// No record existed.
    Created,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Attached => "attached",
            Action::Replaced => "replaced",
            Action::Recreated => "recreated",
            Action::Created => "created",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub id: ContainerId,
    pub action: Action,
}

/// Build the create request for `spec`, carrying the management labels.
pub fn create_request(spec: &ContainerSpec, fingerprint: &Fingerprint) -> CreateRequest {
    CreateRequest {
        name: spec.name.clone(),
        image: spec.image.clone(),
        labels: management_labels(&spec.name, fingerprint),
        command: spec.command.clone(),
        arguments: spec.args.clone(),
        environment: spec.environment(),
        volumes: spec.volume_mounts.clone(),
    }
}

/// Converge the backend on `spec` and return the id of its running container.
///
/// A running container whose fingerprint label matches is reused untouched.
/// A running one that drifted is stopped and removed; a created or stopped
/// one is removed regardless of its fingerprint. Either way a fresh container
/// is then created and started. Driver failures are returned immediately.
pub async fn reconcile(
    driver: &dyn Driver,
    spec: &ContainerSpec,
    cancel: &CancellationToken,
) -> Result<Reconciliation, CoreError> {
    let desired = fingerprint(spec);
    let existing = find_managed(driver, &spec.name, cancel).await?;

    let action = match existing {
        Some(record) if record.status == ContainerStatus::Running => {
            if stored_fingerprint(&record) == Some(desired.as_str()) {
                info!("attaching to running container {} ({})", spec.name, record.id.short());
                return Ok(Reconciliation {
                    id: record.id,
                    action: Action::Attached,
                });
            }
            info!("spec for {} changed, replacing container {}", spec.name, record.id.short());
            driver
                .stop_container(&record.id, cancel)
                .await
                .map_err(|e| CoreError::driver("stop container", e))?;
            driver
                .remove_container(&record.id, cancel)
                .await
                .map_err(|e| CoreError::driver("remove container", e))?;
            Action::Replaced
        }
        Some(record) => {
            info!("removing {} container {} ({})", record.status, spec.name, record.id.short());
            driver
                .remove_container(&record.id, cancel)
                .await
                .map_err(|e| CoreError::driver("remove container", e))?;
            Action::Recreated
        }
        None => Action::Created,
    };

    let id = driver
        .create_container(&create_request(spec, &desired), cancel)
        .await
        .map_err(|e| CoreError::driver("create container", e))?;
    info!("created container {} ({})", spec.name, id.short());

    driver
        .start_container(&id, cancel)
        .await
        .map_err(|e| CoreError::driver("start container", e))?;
    info!("started container {} ({})", spec.name, id.short());

    Ok(Reconciliation { id, action })
}
