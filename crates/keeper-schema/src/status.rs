use crate::types::{ContainerId, Fingerprint};
use serde::{Deserialize, Serialize};

/// Point-in-time report on the container managed for a spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub id: ContainerId,
    pub status: String,
    /// Fingerprint label stored on the record; empty if the label is missing.
    pub fingerprint: Fingerprint,
    /// Only present once the container has stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}
