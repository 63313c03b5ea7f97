use crate::RuntimeError;
use async_trait::async_trait;
use keeper_schema::{ContainerId, VolumeMount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Destination for forwarded container output.
pub type LogSink = dyn AsyncWrite + Send + Unpin;

/// Lifecycle state of a backend container, collapsed to what reconciliation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    #[default]
    Unknown,
    Created,
    Running,
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Unknown => "unknown",
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// The backend's view of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub status: ContainerStatus,
    pub labels: BTreeMap<String, String>,
    /// Meaningful only when `status` is [`ContainerStatus::Stopped`].
    pub exit_code: i64,
}

/// Everything a backend needs to allocate a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    pub command: Vec<String>,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<VolumeMount>,
}

/// Capability set every container backend exposes.
///
/// Containers are addressed by the opaque id the backend hands out from
/// [`Driver::create_container`]. Every call takes a cancellation token and
/// must return [`RuntimeError::Cancelled`] promptly once it fires.
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup after construction (connect, verify the engine is reachable).
    async fn provision(&self, _cancel: &CancellationToken) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn pull_image(&self, image: &str, cancel: &CancellationToken)
        -> Result<(), RuntimeError>;

    /// Find the single container called `name` carrying all of `labels`.
    ///
    /// Returns `Ok(None)` when nothing matches and
    /// [`RuntimeError::AmbiguousContainer`] when more than one record does.
    async fn find_container(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<ContainerRecord>, RuntimeError>;

    async fn container_status(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<ContainerRecord, RuntimeError>;

    /// Allocate a container in the `created` state without starting it.
    async fn create_container(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<ContainerId, RuntimeError>;

    async fn start_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError>;

    /// Request graceful termination. Does not promise the container has
    /// exited on return; use [`Driver::wait_for_exit`] for that.
    async fn stop_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError>;

    async fn remove_container(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError>;

    /// Suspend until the container's process has exited.
    async fn wait_for_exit(
        &self,
        id: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError>;

    /// Forward live output until the container exits or `cancel` fires.
    async fn stream_logs(
        &self,
        id: &ContainerId,
        stdout: &mut LogSink,
        stderr: &mut LogSink,
        cancel: &CancellationToken,
    ) -> Result<(), RuntimeError>;
}
