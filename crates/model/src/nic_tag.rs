//! `NicTag` and the regexes used to validate name-like fields across the
//! model (shared with `netreg-engine`'s validation kernel, C8).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicTag {
    pub uuid: Uuid,
    pub name: String,
    pub mtu: u32,
}

impl NicTag {
    pub const MAX_NAME_LEN: usize = 31;

    pub fn validate_name(name: &str) -> Result<(), ModelError> {
        if name.is_empty() || name.len() > Self::MAX_NAME_LEN {
            return Err(ModelError::Invalid(format!(
                "nic_tag name must be 1..={} characters",
                Self::MAX_NAME_LEN
            )));
        }
        if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(ModelError::Invalid(
                "nic_tag name must match [A-Za-z0-9_]+".into(),
            ));
        }
        Ok(())
    }

    /// A tag's MTU must be >= the MTU of every network using it (spec.md
    /// §3). The engine, which has visibility across networks, enforces the
    /// cross-record half of this; this checks one network at a time.
    pub fn bounds_network_mtu(&self, network_mtu: u32) -> bool {
        self.mtu >= network_mtu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_name_too_long() {
        let name = "a".repeat(32);
        assert!(NicTag::validate_name(&name).is_err());
    }

    #[test]
    fn rejects_non_alnum_underscore() {
        assert!(NicTag::validate_name("bad-name").is_err());
    }

    #[test]
    fn accepts_reasonable_name() {
        assert!(NicTag::validate_name("external_0").is_ok());
    }
}
