//! The `IPRecord` entity (spec.md §3) — one per concrete address ever
//! touched inside a network, including sentinels and freed tombstones.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use netreg_uuid::{BelongsToUuid, NetworkUuid, OwnerUuid};
use serde::{Deserialize, Serialize};

use crate::etag::Etag;
use crate::ModelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRecord {
    pub address: IpAddr,
    pub network_uuid: NetworkUuid,
    pub reserved: bool,
    pub belongs_to_type: Option<String>,
    pub belongs_to_uuid: Option<BelongsToUuid>,
    pub owner_uuid: Option<OwnerUuid>,
    pub etag: Etag,
    pub mtime: DateTime<Utc>,
}

impl IpRecord {
    pub fn sentinel(address: IpAddr, network_uuid: NetworkUuid) -> Self {
        Self {
            address,
            network_uuid,
            reserved: true,
            belongs_to_type: None,
            belongs_to_uuid: None,
            owner_uuid: None,
            etag: Etag::generate(),
            mtime: Utc::now(),
        }
    }

    /// A record with no owner and `reserved=false`: the definition of
    /// *freed* per the glossary.
    pub fn is_freed(&self) -> bool {
        !self.reserved && self.belongs_to_uuid.is_none()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.belongs_to_uuid.is_some()
            && (self.belongs_to_type.is_none() || self.owner_uuid.is_none())
        {
            return Err(ModelError::Invalid(
                "belongs_to_uuid requires belongs_to_type and owner_uuid".into(),
            ));
        }
        Ok(())
    }

    /// Turn an in-use record back into a freed tombstone, as the NIC
    /// engine's delete path does when it doesn't merely unassign.
    pub fn free(&mut self) {
        self.reserved = false;
        self.belongs_to_type = None;
        self.belongs_to_uuid = None;
        self.owner_uuid = None;
        self.etag = Etag::generate();
        self.mtime = Utc::now();
    }

    /// Unassign without freeing: keep `reserved=true`, clear ownership.
    /// Used when delete should retain the slot out of the allocator's gap
    /// scan (e.g. a sentinel-adjacent record).
    pub fn unassign(&mut self) {
        self.belongs_to_type = None;
        self.belongs_to_uuid = None;
        self.owner_uuid = None;
        self.etag = Etag::generate();
        self.mtime = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sentinel_is_reserved_and_ownerless() {
        let s = IpRecord::sentinel(IpAddr::from_str("10.0.2.4").unwrap(), NetworkUuid::new_v4());
        assert!(s.reserved);
        assert!(!s.is_freed());
    }

    #[test]
    fn free_clears_ownership_and_reservation() {
        let mut r = IpRecord::sentinel(IpAddr::from_str("10.0.2.4").unwrap(), NetworkUuid::new_v4());
        r.belongs_to_uuid = Some(BelongsToUuid::new_v4());
        r.belongs_to_type = Some("instance".into());
        r.owner_uuid = Some(OwnerUuid::new_v4());
        r.reserved = false;
        r.free();
        assert!(r.is_freed());
    }

    #[test]
    fn validate_requires_owner_and_type_with_belongs_to() {
        let mut r = IpRecord::sentinel(IpAddr::from_str("10.0.2.4").unwrap(), NetworkUuid::new_v4());
        r.belongs_to_uuid = Some(BelongsToUuid::new_v4());
        assert!(r.validate().is_err());
    }
}
