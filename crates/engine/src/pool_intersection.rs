//! Pool intersection (C6): the set of `(nic_tag, vlan_id, vnet_id, mtu)`
//! tuples usable across several pools.
//!
//! Style grounded on `carbide-api-model`'s `resource_pool::{common,define}`
//! (`CommonPools`/`EthernetPools`/`ResourcePool<T>`); the tuple-intersection
//! algorithm itself has no teacher counterpart (the teacher's pools don't
//! intersect this way) and is new logic built on that shape.

use std::collections::BTreeSet;

use netreg_model::Network;

use crate::error::EngineError;

/// A pool-membership tuple: `(nic_tag, vlan_id, vnet_id, mtu)`.
pub type PoolTuple = (String, u16, Option<u32>, u32);

#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    pub nic_tag: Option<String>,
    pub nic_tags_available: Option<Vec<String>>,
    pub mtu: Option<u32>,
    pub vlan_id: Option<u16>,
    pub vnet_id: Option<u32>,
}

impl PoolFilter {
    fn allows(&self, tuple: &PoolTuple) -> bool {
        let (nic_tag, vlan_id, vnet_id, mtu) = tuple;
        if let Some(want) = &self.nic_tag {
            if want != nic_tag {
                return false;
            }
        }
        if let Some(allowed) = &self.nic_tags_available {
            if !allowed.contains(nic_tag) {
                return false;
            }
        }
        if let Some(want) = self.mtu {
            if want != *mtu {
                return false;
            }
        }
        if let Some(want) = self.vlan_id {
            if want != *vlan_id {
                return false;
            }
        }
        if let Some(want) = self.vnet_id {
            if Some(want) != *vnet_id {
                return false;
            }
        }
        true
    }
}

/// One pool's member networks, reduced to the tuple shape C6 intersects on.
pub fn tuples_for_pool(networks: &[Network], filter: &PoolFilter) -> Vec<PoolTuple> {
    networks
        .iter()
        .map(|n| (n.nic_tag.clone(), n.vlan_id, n.vnet_id, n.mtu))
        .filter(|t| filter.allows(t))
        .collect()
}

/// Intersect `pools` (each already reduced to its member networks) under
/// `filter`, per spec.md §4.6.
pub fn intersect(
    pools: &[(String, Vec<Network>)],
    filter: &PoolFilter,
) -> Result<Vec<PoolTuple>, EngineError> {
    let mut sets: Vec<BTreeSet<PoolTuple>> = Vec::with_capacity(pools.len());

    for (name, networks) in pools {
        let tuples: BTreeSet<_> = tuples_for_pool(networks, filter).into_iter().collect();
        if tuples.is_empty() {
            return Err(EngineError::invalid(
                "pool",
                "POOL_FAILS_CONSTRAINTS",
                format!("pool {name} has no networks matching the filter"),
            ));
        }
        let distinct_tags: BTreeSet<&str> = tuples.iter().map(|t| t.0.as_str()).collect();
        if distinct_tags.len() > 1 && filter.nic_tag.is_none() && filter.nic_tags_available.is_none() {
            return Err(EngineError::invalid(
                "nic_tag",
                "POOL_NIC_TAGS_AMBIGUOUS",
                format!("pool {name} spans multiple nic_tags and none was requested"),
            ));
        }
        sets.push(tuples);
    }

    let mut iter = sets.into_iter();
    let mut acc = match iter.next() {
        Some(first) => first,
        None => return Ok(vec![]),
    };
    for set in iter {
        acc = acc.intersection(&set).cloned().collect();
    }

    if acc.is_empty() {
        return Err(EngineError::invalid(
            "pool",
            "NO_POOL_INTERSECTION",
            "no (nic_tag, vlan_id, vnet_id, mtu) tuple is common to every pool",
        ));
    }
    Ok(acc.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netreg_network::AddressFamily;
    use netreg_uuid::NetworkUuid;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use std::str::FromStr;

    fn net(nic_tag: &str, vlan_id: u16) -> Network {
        Network {
            uuid: NetworkUuid::new_v4(),
            name: nic_tag.into(),
            nic_tag: nic_tag.into(),
            vlan_id,
            vnet_id: None,
            family: AddressFamily::V4,
            subnet: ipnet::IpNet::from_str("10.0.0.0/24").unwrap(),
            provision_start: IpAddr::from_str("10.0.0.5").unwrap(),
            provision_end: IpAddr::from_str("10.0.0.250").unwrap(),
            gateway: None,
            resolvers: vec![],
            routes: BTreeMap::new(),
            mtu: 1500,
            owner_uuids: None,
            fabric: false,
            vpc_uuid: None,
            etag: netreg_model::Etag::generate(),
        }
    }

    #[test]
    fn scenario_6_intersection_with_tag_filter() {
        let pools = vec![
            ("p1".to_string(), vec![net("a", 0), net("b", 0)]),
            ("p2".to_string(), vec![net("a", 0), net("c", 0)]),
        ];
        let filter = PoolFilter {
            nic_tags_available: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        let result = intersect(&pools, &filter).unwrap();
        assert_eq!(result, vec![("a".to_string(), 0, None, 1500)]);
    }

    #[test]
    fn ambiguous_nic_tags_without_filter_is_rejected() {
        let pools = vec![("p1".to_string(), vec![net("a", 0), net("b", 0)])];
        let err = intersect(&pools, &PoolFilter::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[test]
    fn empty_intersection_is_rejected() {
        let pools = vec![
            ("p1".to_string(), vec![net("a", 0)]),
            ("p2".to_string(), vec![net("b", 0)]),
        ];
        let filter = PoolFilter {
            nic_tags_available: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        let err = intersect(&pools, &filter).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }
}
