//! `Aggregation` — a LACP bonding of NICs on a single compute node.

use netreg_network::address::Mac;
use netreg_uuid::ComputeNodeUuid;
use serde::{Deserialize, Serialize};

use crate::ModelError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LacpMode {
    Off,
    Active,
    Passive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub belongs_to_uuid: ComputeNodeUuid,
    pub name: String,
    pub macs: Vec<Mac>,
    pub lacp_mode: LacpMode,
    pub nic_tags_provided: Vec<String>,
}

impl Aggregation {
    /// `id = <cn_uuid>-<name>` (spec.md §3).
    pub fn id(&self) -> String {
        format!("{}-{}", self.belongs_to_uuid, self.name)
    }

    pub fn validate_name(name: &str) -> Result<(), ModelError> {
        match name.bytes().last() {
            Some(b) if b.is_ascii_digit() => Ok(()),
            _ => Err(ModelError::Invalid(
                "aggregation name must end in a digit".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_concatenates_cn_uuid_and_name() {
        let cn = ComputeNodeUuid::new_v4();
        let agg = Aggregation {
            belongs_to_uuid: cn,
            name: "aggr0".into(),
            macs: vec![],
            lacp_mode: LacpMode::Active,
            nic_tags_provided: vec![],
        };
        assert_eq!(agg.id(), format!("{cn}-aggr0"));
    }

    #[test]
    fn validate_name_requires_trailing_digit() {
        assert!(Aggregation::validate_name("aggr0").is_ok());
        assert!(Aggregation::validate_name("aggr").is_err());
    }
}
