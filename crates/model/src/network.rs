//! The `Network` entity (spec.md §3).

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use netreg_network::AddressFamily;
use netreg_uuid::{NetworkPoolUuid, NetworkUuid, OwnerUuid, VpcUuid};
use serde::{Deserialize, Serialize};

use crate::etag::Etag;
use crate::ModelError;

/// VLAN IDs run `0..=4094` but `1` is reserved, matching the teacher's
/// `carbide-api-model` VLAN validation.
pub const VLAN_RANGE: std::ops::RangeInclusive<u16> = 0..=4094;
pub const VLAN_RESERVED: u16 = 1;

pub const VXLAN_MAX: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub uuid: NetworkUuid,
    pub name: String,
    pub nic_tag: String,
    pub vlan_id: u16,
    pub vnet_id: Option<u32>,
    pub family: AddressFamily,
    pub subnet: IpNet,
    pub provision_start: IpAddr,
    pub provision_end: IpAddr,
    pub gateway: Option<IpAddr>,
    pub resolvers: Vec<IpAddr>,
    pub routes: BTreeMap<IpNet, IpAddr>,
    pub mtu: u32,
    pub owner_uuids: Option<Vec<OwnerUuid>>,
    pub fabric: bool,
    pub vpc_uuid: Option<VpcUuid>,
    pub etag: Etag,
}

impl Network {
    /// Validates the invariants spec.md §3 states for a standalone `Network`
    /// value: the provision range lies inside `subnet`, `start <= end`, and
    /// `gateway` (if any) is inside `subnet`. Cross-network invariants
    /// (subnet non-overlap, `nic_tag.mtu` bound) are checked by the engine,
    /// which has visibility across records.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.subnet.contains(&self.provision_start) || !self.subnet.contains(&self.provision_end) {
            return Err(ModelError::Invalid(
                "provision_start/provision_end must lie inside subnet".into(),
            ));
        }
        if netreg_network::address::compare(self.provision_start, self.provision_end)
            == std::cmp::Ordering::Greater
        {
            return Err(ModelError::Invalid(
                "provision_start must not be greater than provision_end".into(),
            ));
        }
        if let Some(gw) = self.gateway {
            if !self.subnet.contains(&gw) {
                return Err(ModelError::Invalid("gateway must lie inside subnet".into()));
            }
        }
        if self.vlan_id > *VLAN_RANGE.end() || self.vlan_id == VLAN_RESERVED {
            return Err(ModelError::Invalid(format!(
                "vlan_id {} is out of range or reserved",
                self.vlan_id
            )));
        }
        if let Some(vnet) = self.vnet_id {
            if vnet > VXLAN_MAX {
                return Err(ModelError::Invalid(format!("vnet_id {vnet} exceeds 2^24-1")));
            }
        }
        Ok(())
    }

    pub fn broadcast(&self) -> Option<IpAddr> {
        match self.subnet {
            IpNet::V4(v4) => Some(IpAddr::V4(v4.broadcast())),
            IpNet::V6(_) => None,
        }
    }
}

/// A network pool: a named grouping of networks, used by C6 pool
/// intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPool {
    pub uuid: NetworkPoolUuid,
    pub name: String,
    pub networks: Vec<NetworkUuid>,
    pub etag: Etag,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample() -> Network {
        Network {
            uuid: NetworkUuid::new_v4(),
            name: "prod".into(),
            nic_tag: "external".into(),
            vlan_id: 46,
            vnet_id: None,
            family: AddressFamily::V4,
            subnet: IpNet::from_str("10.0.2.0/24").unwrap(),
            provision_start: IpAddr::from_str("10.0.2.5").unwrap(),
            provision_end: IpAddr::from_str("10.0.2.250").unwrap(),
            gateway: Some(IpAddr::from_str("10.0.2.1").unwrap()),
            resolvers: vec![],
            routes: BTreeMap::new(),
            mtu: 1500,
            owner_uuids: None,
            fabric: false,
            vpc_uuid: None,
            etag: Etag::generate(),
        }
    }

    #[test]
    fn validates_a_well_formed_network() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_gateway_outside_subnet() {
        let mut n = sample();
        n.gateway = Some(IpAddr::from_str("10.0.3.1").unwrap());
        assert!(n.validate().is_err());
    }

    #[test]
    fn rejects_provision_start_after_end() {
        let mut n = sample();
        std::mem::swap(&mut n.provision_start, &mut n.provision_end);
        n.provision_start = IpAddr::from_str("10.0.2.250").unwrap();
        n.provision_end = IpAddr::from_str("10.0.2.5").unwrap();
        assert!(n.validate().is_err());
    }

    #[test]
    fn rejects_reserved_vlan() {
        let mut n = sample();
        n.vlan_id = 1;
        assert!(n.validate().is_err());
    }
}
