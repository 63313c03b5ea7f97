//! Identifiers that travel through backend labels and status reports as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Length of the abbreviated form used in log lines and terminal output.
const SHORT_LEN: usize = 12;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Leading characters only; backend ids are not guaranteed to be ASCII.
            pub fn short(&self) -> &str {
                self.0
                    .char_indices()
                    .nth(SHORT_LEN)
                    .map_or(&self.0[..], |(i, _)| &self.0[..i])
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Opaque backend-assigned container identifier.
    ContainerId
);

string_id!(
    /// Hex blake3 digest of the semantically significant fields of a [`crate::ContainerSpec`].
    Fingerprint
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_displays_inner_string() {
        let id = ContainerId::new("abc123");
        assert_eq!(id.to_string(), "abc123");
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.len(), 6);
    }

    #[test]
    fn fingerprint_serde_is_a_plain_string() {
        let fp = Fingerprint::new("deadbeef");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn short_truncates_long_ids() {
        let id = ContainerId::from("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
    }

    #[test]
    fn short_keeps_short_ids_whole() {
        let id = ContainerId::from("abc");
        assert_eq!(id.short(), "abc");
        assert_eq!(ContainerId::from("0123456789ab").short(), "0123456789ab");
    }

    #[test]
    fn short_counts_characters_not_bytes() {
        let id = ContainerId::from("ééééééééééééééé");
        assert_eq!(id.short(), "éééééééééééé");
        let id = ContainerId::from("01234567890é-tail");
        assert_eq!(id.short(), "01234567890é");
    }
}
