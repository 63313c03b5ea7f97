//! Reconciliation and run orchestration for keeper.
//!
//! This crate ties the spec model and the container drivers together into the
//! `Engine`: it discovers the record keeper manages for a logical name,
//! converges it to the desired spec (attach, replace, or create), supervises
//! the running container while forwarding its logs, and tears it down within
//! a bounded time when the run is cancelled.

pub mod discovery;
pub mod engine;
pub mod labels;
pub mod reconcile;
pub mod run;
pub mod signal;
pub mod teardown;

pub use discovery::find_managed;
pub use engine::Engine;
pub use labels::{
    discovery_labels, management_labels, stored_fingerprint, LABEL_FINGERPRINT, LABEL_MANAGED,
    LABEL_NAME,
};
pub use reconcile::{create_request, reconcile, Action, Reconciliation};
pub use run::{run, RunOptions, DEFAULT_TEARDOWN_TIMEOUT, LOG_REATTACH_DELAY};
pub use signal::install_signal_handler;

use keeper_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("spec error: {0}")]
    Spec(#[from] keeper_schema::SpecError),
    #[error("failed to {op}: {source}")]
    Driver {
        op: &'static str,
        source: RuntimeError,
    },
    #[error("found {count} managed containers named '{name}'; remove the extras manually")]
    Ambiguous { name: String, count: usize },
    #[error("timed out trying to {op}")]
    Timeout { op: &'static str },
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Wrap a driver failure with the operation that produced it.
    ///
    /// Ambiguous discovery results are lifted into [`CoreError::Ambiguous`]
    /// so callers never mistake them for an ordinary backend failure.
    pub fn driver(op: &'static str, source: RuntimeError) -> Self {
        match source {
            RuntimeError::AmbiguousContainer { name, count } => CoreError::Ambiguous { name, count },
            source => CoreError::Driver { op, source },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Driver { source, .. } if source.is_cancelled())
    }
}
