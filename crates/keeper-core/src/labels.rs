//! Labels keeper attaches to every container it creates.
//!
//! They are the only state keeper persists: there is no datastore, the
//! backend's own records carry everything needed to find and compare them.

use keeper_runtime::ContainerRecord;
use keeper_schema::Fingerprint;
use std::collections::BTreeMap;

pub const LABEL_MANAGED: &str = "io.keeper.managed";
pub const LABEL_NAME: &str = "io.keeper.name";
pub const LABEL_FINGERPRINT: &str = "io.keeper.fingerprint";

/// Filter selecting the record keeper manages for `name`.
pub fn discovery_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED.to_owned(), "true".to_owned()),
        (LABEL_NAME.to_owned(), name.to_owned()),
    ])
}

/// Full label set for a new container created from a spec with `fingerprint`.
pub fn management_labels(name: &str, fingerprint: &Fingerprint) -> BTreeMap<String, String> {
    let mut labels = discovery_labels(name);
    labels.insert(LABEL_FINGERPRINT.to_owned(), fingerprint.to_string());
    labels
}

pub fn stored_fingerprint(record: &ContainerRecord) -> Option<&str> {
    record.labels.get(LABEL_FINGERPRINT).map(String::as_str)
}
