//! Fabric VLAN and VPC entities (spec.md §3).

use netreg_uuid::{OwnerUuid, VpcUuid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricVlan {
    pub vlan_id: u16,
    pub owner_uuid: OwnerUuid,
    pub vnet_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpc {
    pub vpc_uuid: VpcUuid,
    pub owner_uuid: OwnerUuid,
    pub vnet_id: u32,
    pub name: String,
}
