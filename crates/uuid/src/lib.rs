//! Strongly typed UUID newtypes.
//!
//! Mirrors the pattern used throughout the fleet-manager's `carbide-uuid`
//! crate: every entity gets its own newtype around `uuid::Uuid` so that a
//! `NetworkUuid` and a `VpcUuid` can never be accidentally swapped at a call
//! site, while still being trivially convertible to/from a bare `Uuid` at
//! the serialization boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum UuidConversionError {
    #[error("invalid {ty} uuid: {value}")]
    InvalidUuid { ty: &'static str, value: String },
}

/// Defines a newtype wrapper around [`uuid::Uuid`] with the usual
/// conversions (`Display`, `FromStr`, `From`/`Into` bare `Uuid`) and
/// transparent JSON (de)serialization.
macro_rules! typed_uuid {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = UuidConversionError;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(input)
                    .map(Self)
                    .map_err(|_| UuidConversionError::InvalidUuid {
                        ty: stringify!($name),
                        value: input.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_uuid!(NetworkUuid);
typed_uuid!(NetworkPoolUuid);
typed_uuid!(VpcUuid);
/// The UUID of whatever owns a resource (an account/tenant).
typed_uuid!(OwnerUuid);
/// The UUID of the thing a NIC or IP is attached to (`belongs_to_uuid`):
/// an instance, a compute node, a zone, etc. `belongs_to_type` says which.
typed_uuid!(BelongsToUuid);
/// The UUID of a compute node (`cn_uuid`).
typed_uuid!(ComputeNodeUuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = NetworkUuid::new_v4();
        let parsed: NetworkUuid = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let raw = uuid::Uuid::new_v4();
        let id = NetworkUuid::from(raw);
        assert_eq!(
            serde_json::to_string(&raw).unwrap(),
            serde_json::to_string(&id).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(NetworkUuid::from_str("not-a-uuid").is_err());
    }
}
