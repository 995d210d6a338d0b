//! Validated identifier newtypes shared across the data model.

use std::fmt;
use std::str::FromStr;

/// What kind of value failed validation, for structured error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An `IssueId`/`SpecId` stable identifier was malformed.
    StableId,
    /// A UUID string failed to parse.
    Uuid,
}

/// A validation failure on an identifier, carrying enough structure for
/// [`crate::error::EngineError`] to render an actionable message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of identifier was being validated.
    pub kind: ErrorKind,
    /// The raw value that was rejected.
    pub value: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {:?} {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

macro_rules! stable_id {
    ($name:ident, $prefix:literal) => {
        #[doc = concat!("A stable, human-readable ", $prefix, " identifier, e.g. `", $prefix, "-42`.")]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = "Create a new identifier, validating the `"]
            #[doc = $prefix]
            #[doc = "-<number>` shape."]
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                let expected_prefix = concat!($prefix, "-");
                let Some(suffix) = value.strip_prefix(expected_prefix) else {
                    return Err(ValidationError {
                        kind: ErrorKind::StableId,
                        value,
                        reason: format!("must start with '{expected_prefix}'"),
                    });
                };
                // Accept a plain number ("42") or a renumbered collision
                // suffix ("42.1", "42.2", ...).
                let valid = suffix
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
                if suffix.is_empty() || !valid {
                    return Err(ValidationError {
                        kind: ErrorKind::StableId,
                        value,
                        reason: "suffix after the prefix must be a number, optionally with a '.N' collision suffix".to_owned(),
                    });
                }
                Ok(Self(value))
            }

            /// Construct a new id from a monotonically-assigned sequence number.
            #[must_use]
            pub fn from_sequence(n: u64) -> Self {
                Self(format!("{}-{n}", $prefix))
            }

            /// Return the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The numeric suffix, for renumbering during collision resolution.
            #[must_use]
            pub fn sequence(&self) -> u64 {
                self.0
                    .rsplit('-')
                    .next()
                    .and_then(|s| s.split('.').next())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

stable_id!(IssueId, "ISSUE");
stable_id!(SpecId, "SPEC");

/// Opaque, immutable identity for any entity; stable ids may be renumbered
/// on collision, but a UUID never changes for the life of the entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct EntityUuid(uuid::Uuid);

impl EntityUuid {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn new(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random UUID (used when allocating a renumbered id
    /// during collision resolution does *not* apply — the UUID itself never
    /// changes; see [`IssueId::from_sequence`] for renumbering stable ids).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The wrapped UUID.
    #[must_use]
    pub const fn inner(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[doc = concat!("Identity for a ", stringify!($name), ".")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }

            /// The wrapped UUID.
            #[must_use]
            pub const fn inner(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(StreamId);
uuid_id!(ExecutionId);
uuid_id!(CheckpointId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_id_accepts_valid_shape() {
        assert!(IssueId::new("ISSUE-42").is_ok());
    }

    #[test]
    fn issue_id_rejects_wrong_prefix() {
        assert!(IssueId::new("SPEC-42").is_err());
    }

    #[test]
    fn issue_id_rejects_non_numeric_suffix() {
        assert!(IssueId::new("ISSUE-abc").is_err());
    }

    #[test]
    fn issue_id_from_sequence_roundtrips() {
        let id = IssueId::from_sequence(7);
        assert_eq!(id.as_str(), "ISSUE-7");
        assert_eq!(id.sequence(), 7);
    }

    #[test]
    fn renumbered_id_sequence_ignores_dotted_suffix() {
        let id = IssueId::new("ISSUE-7.1").expect("dotted renumbering suffix is valid");
        assert_eq!(id.sequence(), 7);
    }

    #[test]
    fn spec_id_is_independent_namespace() {
        assert!(SpecId::new("ISSUE-1").is_err());
        assert!(SpecId::new("SPEC-1").is_ok());
    }

    #[test]
    fn stream_id_generate_is_unique() {
        assert_ne!(StreamId::generate(), StreamId::generate());
    }
}
