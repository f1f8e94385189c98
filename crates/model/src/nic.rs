//! The `NIC` entity (spec.md §3).

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use netreg_network::address::Mac;
use netreg_uuid::{BelongsToUuid, ComputeNodeUuid, NetworkUuid, OwnerUuid};
use serde::{Deserialize, Serialize};

use crate::etag::Etag;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NicState {
    #[default]
    Provisioning,
    Running,
    Stopped,
}

impl NicState {
    /// Every transition is allowed by the server (spec.md §4.5); callers
    /// own the real state. Kept as a function so the rule has one place to
    /// change if that ever stops being true.
    pub fn transition_allowed(_from: NicState, _to: NicState) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntiSpoof {
    pub dhcp: Option<bool>,
    pub ip: Option<bool>,
    pub mac: Option<bool>,
    pub restricted: Option<bool>,
}

impl AntiSpoof {
    /// Anti-spoof booleans that become `false` are removed from the stored
    /// record rather than written as `false` (spec.md §4.5).
    pub fn normalize(&mut self) {
        for flag in [&mut self.dhcp, &mut self.ip, &mut self.mac, &mut self.restricted] {
            if *flag == Some(false) {
                *flag = None;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nic {
    pub mac: Mac,
    pub owner_uuid: OwnerUuid,
    pub belongs_to_type: String,
    pub belongs_to_uuid: BelongsToUuid,
    pub cn_uuid: Option<ComputeNodeUuid>,
    pub primary: bool,
    pub state: NicState,
    pub nic_tag: Option<String>,
    pub nic_tags_provided: Vec<String>,
    pub network_uuid: Option<NetworkUuid>,
    pub ip: Option<IpAddr>,
    pub anti_spoof: AntiSpoof,
    pub underlay: Option<bool>,
    pub model: Option<String>,
    pub etag: Etag,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
}

impl Nic {
    /// `if ip is set so is network_uuid` (spec.md §3).
    pub fn has_consistent_ip_binding(&self) -> bool {
        self.ip.is_none() || self.network_uuid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anti_spoof_normalize_removes_false_flags() {
        let mut spoof = AntiSpoof {
            dhcp: Some(false),
            ip: Some(true),
            mac: None,
            restricted: Some(false),
        };
        spoof.normalize();
        assert_eq!(spoof.dhcp, None);
        assert_eq!(spoof.ip, Some(true));
        assert_eq!(spoof.restricted, None);
    }
}
