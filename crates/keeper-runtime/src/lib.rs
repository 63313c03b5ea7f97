//! Container backends for keeper.
//!
//! This crate defines the execution layer: the async `Driver` trait every
//! backend implements, the backend's view of a container (`ContainerRecord`),
//! the explicitly-constructed `DriverRegistry` mapping backend identifiers to
//! factories, a driver for docker-compatible engine CLIs (docker, podman,
//! nerdctl), and an in-memory mock driver used by tests.

pub mod driver;
pub mod engine;
pub mod mock;
pub mod registry;

pub use driver::{ContainerRecord, ContainerStatus, CreateRequest, Driver, LogSink};
pub use engine::{EngineCliConfig, EngineCliDriver, EngineFlavor};
pub use mock::{MockCall, MockConfig, MockDriver};
pub use registry::{DriverFactory, DriverRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("unknown driver: {0}")]
    UnknownDriver(String),
    #[error("invalid configuration for driver '{driver}': {reason}")]
    InvalidConfig { driver: String, reason: String },
    #[error("`{command}` failed (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("found {count} containers named '{name}'")]
    AmbiguousContainer { name: String, count: usize },
    #[error("container name already in use: {0}")]
    NameConflict(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("unknown container status: {0}")]
    UnknownStatus(String),
    #[error("failed to decode backend output: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RuntimeError {
    /// True when the operation ended because its cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuntimeError::Cancelled)
    }
}
