//! Declarative parameter validator (C8): every API-facing operation runs
//! its raw parameters through this before touching C3-C7, per spec.md §4.8.
//!
//! Grounded on the teacher's `carbide-api`/`carbide-api-model` validation
//! layer, which likewise accumulates a structured list of field/code errors
//! rather than failing fast on the first bad parameter, and uses
//! `once_cell`-cached `regex::Regex` statics for the pattern rules.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use netreg_model::{Network, NicTag};
use netreg_network::address::{self, Mac};

use crate::error::{EngineError, FieldError};
use crate::subnet_allocator::overlaps;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// `[A-Za-z0-9_]{0,31}[0-9]+` — spec.md §4.8.
static INTERFACE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{0,31}[0-9]+$").unwrap());

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    Uuid,
    Mac,
    Ip,
    VlanId,
    VxlanId,
    Offset,
    Limit,
    /// Non-empty string, at most `max_len` bytes.
    StringLen { max_len: usize },
    InterfaceName,
    Enum(&'static [&'static str]),
}

impl Rule {
    fn check(&self, field: &str, value: &Value) -> Result<(), FieldError> {
        let fail = |code: &str, message: String| {
            Err(FieldError {
                field: field.to_string(),
                code: code.to_string(),
                message,
            })
        };
        match self {
            Rule::Uuid => {
                let s = value.as_str().ok_or_else(|| FieldError {
                    field: field.to_string(),
                    code: "INVALID_UUID".into(),
                    message: format!("{field} must be a string"),
                })?;
                if UUID_RE.is_match(s) {
                    Ok(())
                } else {
                    fail("INVALID_UUID", format!("{s} is not a uuid"))
                }
            }
            Rule::Mac => {
                let s = value.as_str().unwrap_or_default();
                Mac::parse(s).map(|_| ()).map_err(|e| FieldError {
                    field: field.to_string(),
                    code: "INVALID_MAC".into(),
                    message: e.to_string(),
                })
            }
            Rule::Ip => {
                let s = value.as_str().unwrap_or_default();
                address::parse(s).map(|_| ()).map_err(|e| FieldError {
                    field: field.to_string(),
                    code: "INVALID_IP".into(),
                    message: e.to_string(),
                })
            }
            Rule::VlanId => {
                let n = value.as_u64().unwrap_or(u64::MAX);
                if n <= 4094 && n != 1 {
                    Ok(())
                } else {
                    fail("INVALID_VLAN", format!("{n} is outside 0..4094 or reserved"))
                }
            }
            Rule::VxlanId => {
                let n = value.as_u64().unwrap_or(u64::MAX);
                if n <= (1u64 << 24) - 1 {
                    Ok(())
                } else {
                    fail("INVALID_VXLAN", format!("{n} exceeds 2^24-1"))
                }
            }
            Rule::Offset => {
                let n = value.as_i64().unwrap_or(-1);
                if n >= 0 {
                    Ok(())
                } else {
                    fail("INVALID_OFFSET", "offset must be >= 0".into())
                }
            }
            Rule::Limit => {
                let n = value.as_i64().unwrap_or(0);
                if (1..=1000).contains(&n) {
                    Ok(())
                } else {
                    fail("INVALID_LIMIT", "limit must be in 1..1000".into())
                }
            }
            Rule::StringLen { max_len } => {
                let s = value.as_str().unwrap_or_default();
                if !s.is_empty() && s.len() <= *max_len {
                    Ok(())
                } else {
                    fail("INVALID_STRING", format!("{field} must be 1..={max_len} bytes"))
                }
            }
            Rule::InterfaceName => {
                let s = value.as_str().unwrap_or_default();
                if INTERFACE_NAME_RE.is_match(s) {
                    Ok(())
                } else {
                    fail("INVALID_NAME", format!("{s} is not a valid interface name"))
                }
            }
            Rule::Enum(members) => {
                let s = value.as_str().unwrap_or_default();
                if members.contains(&s) {
                    Ok(())
                } else {
                    fail("INVALID_ENUM", format!("{s} is not one of {members:?}"))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub rule: Rule,
    pub required: bool,
}

/// Accumulates field errors across a whole request instead of failing on
/// the first bad parameter, per spec.md §4.8.
pub struct Validation<'a> {
    params: &'a HashMap<String, Value>,
    errors: Vec<FieldError>,
}

impl<'a> Validation<'a> {
    pub fn new(params: &'a HashMap<String, Value>) -> Self {
        Self { params, errors: Vec::new() }
    }

    pub fn check(&mut self, spec: ParamSpec) -> &mut Self {
        match self.params.get(spec.name) {
            Some(value) => {
                if let Err(e) = spec.rule.check(spec.name, value) {
                    self.errors.push(e);
                }
            }
            None if spec.required => self.errors.push(FieldError {
                field: spec.name.to_string(),
                code: "MISSING_PARAMETER".into(),
                message: format!("{} is required", spec.name),
            }),
            None => {}
        }
        self
    }

    /// Strict mode: reject any parameter not named in `known`.
    pub fn strict(&mut self, known: &[&str]) -> &mut Self {
        for key in self.params.keys() {
            if !known.contains(&key.as_str()) {
                self.errors.push(FieldError {
                    field: key.clone(),
                    code: "UNKNOWN_PARAMETER".into(),
                    message: format!("{key} is not a recognized parameter"),
                });
            }
        }
        self
    }

    /// A configurable cross-field check run only if nothing has failed yet
    /// (spec.md §4.8's "after" step — e.g. IP lies inside the network's
    /// subnet).
    pub fn after(&mut self, f: impl FnOnce(&HashMap<String, Value>) -> Result<(), FieldError>) -> &mut Self {
        if self.errors.is_empty() {
            if let Err(e) = f(self.params) {
                self.errors.push(e);
            }
        }
        self
    }

    pub fn finish(self) -> Result<(), EngineError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidParameters(self.errors))
        }
    }
}

/// Cross-network invariants spec.md §3 names that `Network::validate()`
/// can't see on its own, since it has no visibility beyond one record:
/// no two non-fabric networks sharing `nic_tag`+`vlan_id` may have
/// overlapping subnets, and a network's `mtu` must not exceed the `mtu`
/// ceiling of the `nic_tag` it uses.
pub fn check_network_invariants(
    candidate: &Network,
    others: &[Network],
    tag: Option<&NicTag>,
) -> Result<(), EngineError> {
    if let Some(tag) = tag {
        if !tag.bounds_network_mtu(candidate.mtu) {
            return Err(EngineError::invalid(
                "mtu",
                "MTU_EXCEEDS_NIC_TAG",
                format!("mtu {} exceeds nic_tag {}'s mtu {}", candidate.mtu, tag.name, tag.mtu),
            ));
        }
    }

    if !candidate.fabric {
        for other in others {
            if other.uuid == candidate.uuid || other.fabric {
                continue;
            }
            if other.nic_tag == candidate.nic_tag
                && other.vlan_id == candidate.vlan_id
                && overlaps(candidate.subnet, other.subnet)
            {
                return Err(EngineError::invalid(
                    "subnet",
                    "SUBNET_OVERLAP",
                    format!(
                        "subnet overlaps network {} on nic_tag {}/vlan {}",
                        other.uuid, candidate.nic_tag, candidate.vlan_id
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn rejects_garbage_uuid() {
        let p = params(&[("owner_uuid", json!("not-a-uuid"))]);
        let err = Validation::new(&p)
            .check(ParamSpec { name: "owner_uuid", rule: Rule::Uuid, required: true })
            .finish()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(errs) if errs.len() == 1));
    }

    #[test]
    fn vlan_range_rejects_reserved_and_out_of_range() {
        let p = params(&[("vlan_id", json!(1))]);
        assert!(Validation::new(&p)
            .check(ParamSpec { name: "vlan_id", rule: Rule::VlanId, required: true })
            .finish()
            .is_err());

        let p = params(&[("vlan_id", json!(5000))]);
        assert!(Validation::new(&p)
            .check(ParamSpec { name: "vlan_id", rule: Rule::VlanId, required: true })
            .finish()
            .is_err());
    }

    #[test]
    fn interface_name_requires_trailing_digit() {
        let p = params(&[("nic_tag", json!("eth"))]);
        assert!(Validation::new(&p)
            .check(ParamSpec { name: "nic_tag", rule: Rule::InterfaceName, required: true })
            .finish()
            .is_err());

        let p = params(&[("nic_tag", json!("eth0"))]);
        assert!(Validation::new(&p)
            .check(ParamSpec { name: "nic_tag", rule: Rule::InterfaceName, required: true })
            .finish()
            .is_ok());
    }

    #[test]
    fn strict_mode_rejects_unknown_parameters() {
        let p = params(&[("mystery", json!("x"))]);
        let err = Validation::new(&p).strict(&["owner_uuid"]).finish().unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[test]
    fn after_step_runs_cross_field_checks() {
        let p = params(&[("ip", json!("10.0.0.1")), ("subnet", json!("10.0.1.0/24"))]);
        let err = Validation::new(&p)
            .after(|params| {
                let ip: std::net::IpAddr = params["ip"].as_str().unwrap().parse().unwrap();
                let subnet: ipnet::IpNet = params["subnet"].as_str().unwrap().parse().unwrap();
                if subnet.contains(&ip) {
                    Ok(())
                } else {
                    Err(FieldError {
                        field: "ip".into(),
                        code: "IP_OUTSIDE_SUBNET".into(),
                        message: "ip does not lie inside subnet".into(),
                    })
                }
            })
            .finish()
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    fn net(nic_tag: &str, vlan_id: u16, subnet: &str, mtu: u32, fabric: bool) -> Network {
        use std::collections::BTreeMap;
        use std::net::IpAddr;
        use std::str::FromStr;
        Network {
            uuid: netreg_uuid::NetworkUuid::new_v4(),
            name: nic_tag.into(),
            nic_tag: nic_tag.into(),
            vlan_id,
            vnet_id: None,
            family: netreg_network::AddressFamily::V4,
            subnet: ipnet::IpNet::from_str(subnet).unwrap(),
            provision_start: IpAddr::from_str("10.0.0.5").unwrap(),
            provision_end: IpAddr::from_str("10.0.0.250").unwrap(),
            gateway: None,
            resolvers: vec![],
            routes: BTreeMap::new(),
            mtu,
            owner_uuids: None,
            fabric,
            vpc_uuid: None,
            etag: netreg_model::Etag::generate(),
        }
    }

    #[test]
    fn rejects_overlapping_subnet_on_same_tag_and_vlan() {
        let existing = net("external", 46, "10.0.0.0/24", 1500, false);
        let candidate = net("external", 46, "10.0.0.128/25", 1500, false);
        let err = check_network_invariants(&candidate, &[existing], None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[test]
    fn allows_overlapping_subnet_on_different_vlan() {
        let existing = net("external", 46, "10.0.0.0/24", 1500, false);
        let candidate = net("external", 47, "10.0.0.128/25", 1500, false);
        assert!(check_network_invariants(&candidate, &[existing], None).is_ok());
    }

    #[test]
    fn fabric_networks_are_exempt_from_overlap_check() {
        let existing = net("external", 46, "10.0.0.0/24", 1500, false);
        let candidate = net("external", 46, "10.0.0.128/25", 1500, true);
        assert!(check_network_invariants(&candidate, &[existing], None).is_ok());
    }

    #[test]
    fn rejects_mtu_exceeding_nic_tag_ceiling() {
        let candidate = net("external", 46, "10.0.0.0/24", 9000, false);
        let tag = NicTag { uuid: "2f9c6b2e-0000-4000-8000-000000000000".parse().unwrap(), name: "external".into(), mtu: 1500 };
        let err = check_network_invariants(&candidate, &[], Some(&tag)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }
}
