//! Container specification model, file loading, and fingerprinting for keeper.
//!
//! This crate defines the input side of keeper: the `ContainerSpec` decoded
//! from JSON or YAML, its validation rules, the deterministic `fingerprint`
//! used to detect drift between the desired spec and the spec a running
//! container was created from, and the identifier newtypes shared with the
//! runtime and core crates.

pub mod fingerprint;
pub mod spec;
pub mod status;
pub mod types;

pub use fingerprint::fingerprint;
pub use spec::{
    parse_spec_file, parse_spec_str, ContainerSpec, EnvVar, SpecError, SpecFormat, VolumeMount,
};
pub use status::ContainerState;
pub use types::{ContainerId, Fingerprint};
