//! IP allocator (C3): gap-first then freed-first selection, bounded retry.
//!
//! Grounded on `carbide-api-db`'s `ip_allocator.rs` — specifically its
//! `IpAllocator` iterator shape (an object that hands out one candidate at a
//! time and is re-driven on conflict) and its free-function style for the
//! pure parts (`build_allocated_networks`/`next_available_prefix` there
//! correspond to the gap queue here). Design note in spec.md §9 asks for the
//! source's nested-callback retry loop to become an explicit value threaded
//! through a bounded loop; `IpAllocationAttempt` is that value.

use std::collections::VecDeque;
use std::net::IpAddr;

use netreg_model::{IpRecord, Network};
use netreg_store::{Filter, FindOptions, Precondition, SortOrder, Store, StoreError};
use serde_json::json;
use tracing::warn;

use crate::error::EngineError;

/// Fixed per spec.md §4.3.3.
pub const IP_PROVISION_RETRIES: u32 = 20;

pub fn ip_bucket(network_uuid: &netreg_uuid::NetworkUuid) -> String {
    format!("ips:{network_uuid}")
}

fn record_to_json(record: &IpRecord) -> serde_json::Value {
    json!({
        "ipaddr": record.address.to_string(),
        "network_uuid": record.network_uuid.to_string(),
        "reserved": record.reserved,
        "belongs_to_type": record.belongs_to_type,
        "belongs_to_uuid": record.belongs_to_uuid.map(|u| u.to_string()),
        "owner_uuid": record.owner_uuid.map(|u| u.to_string()),
    })
}

/// Seeds the four sentinel records spec.md §4.3 describes. Idempotent:
/// conflicts (already seeded) are logged and ignored rather than propagated,
/// since seeding only ever needs to happen once per network.
pub async fn seed_network(store: &dyn Store, network: &Network) -> Result<(), EngineError> {
    let bucket = ip_bucket(&network.uuid);
    let mut sentinels = Vec::new();

    if let Some(gateway) = network.gateway {
        sentinels.push(IpRecord::sentinel(gateway, network.uuid));
    }
    if let Some(broadcast) = network.broadcast() {
        sentinels.push(IpRecord::sentinel(broadcast, network.uuid));
    }
    let lo = netreg_network::address::minus(network.provision_start, 1)
        .map_err(|_| EngineError::Underflow)?;
    let hi = netreg_network::address::plus(network.provision_end, 1).map_err(|_| EngineError::Overflow)?;
    sentinels.push(IpRecord::sentinel(lo, network.uuid));
    sentinels.push(IpRecord::sentinel(hi, network.uuid));

    for sentinel in sentinels {
        let key = sentinel.address.to_string();
        let result = store
            .put(&bucket, &key, record_to_json(&sentinel), Precondition::CreateOnly)
            .await;
        if let Err(StoreError::Conflict { .. }) = result {
            warn!(%key, "sentinel already seeded, skipping");
        } else {
            result?;
        }
    }
    Ok(())
}

/// One candidate address plus the precondition the NIC engine should write
/// it with.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: IpAddr,
    pub precondition: Precondition,
}

/// Threads the gap-first/freed-first selection and retry budget through a
/// provisioning call, replacing the source's nested-callback queue
/// (`opts.ipProvisionQueue`) with an explicit value (spec.md §9).
pub struct IpAllocationAttempt {
    network: Network,
    bucket: String,
    queue: VecDeque<IpAddr>,
    retries: u32,
    tried_freed_first: bool,
}

impl IpAllocationAttempt {
    pub fn new(network: Network) -> Self {
        let bucket = ip_bucket(&network.uuid);
        Self {
            network,
            bucket,
            queue: VecDeque::new(),
            retries: 0,
            tried_freed_first: false,
        }
    }

    /// Produce the next candidate, refilling the queue via gap-scan then
    /// freed-first if it's empty. Returns `SubnetFull` once both sources
    /// are exhausted.
    pub async fn next_candidate(&mut self, store: &dyn Store) -> Result<Candidate, EngineError> {
        if let Some(addr) = self.queue.pop_front() {
            return Ok(Candidate {
                address: addr,
                precondition: Precondition::CreateOnly,
            });
        }

        let lo = netreg_network::address::minus(self.network.provision_start, 1)
            .map_err(|_| EngineError::Underflow)?;
        let hi = netreg_network::address::plus(self.network.provision_end, 1)
            .map_err(|_| EngineError::Overflow)?;
        let max_gap = netreg_network::address::diff(lo, hi).unwrap_or(1).max(1) as u32;

        if let Some(gap) = store
            .sql_gap_scan(&self.bucket, "ipaddr", lo, hi, max_gap)
            .await?
        {
            let mut addr = gap.gap_start;
            for _ in 0..gap.gap_length.max(1) {
                self.queue.push_back(addr);
                addr = match netreg_network::address::plus(addr, 1) {
                    Ok(a) => a,
                    Err(_) => break,
                };
            }
            if let Some(addr) = self.queue.pop_front() {
                return Ok(Candidate {
                    address: addr,
                    precondition: Precondition::CreateOnly,
                });
            }
        }

        if !self.tried_freed_first {
            self.tried_freed_first = true;
            let filter = Filter::new().eq("reserved", json!(false));
            let mut freed: Vec<_> = store
                .find(
                    &self.bucket,
                    filter,
                    FindOptions {
                        sort_field: Some("mtime".into()),
                        sort_order: SortOrder::Ascending,
                        limit: None,
                        offset: 0,
                    },
                )
                .await?
                .into_iter()
                .filter(|r| r.value.get("belongs_to_uuid").map(|v| v.is_null()).unwrap_or(true))
                .collect();
            freed.sort_by_key(|r| r.mtime);
            for rec in freed {
                if let Ok(addr) = rec.key.parse::<IpAddr>() {
                    self.queue.push_back(addr);
                }
            }
            if let Some(addr) = self.queue.pop_front() {
                let etag = store.get(&self.bucket, &addr.to_string()).await?.etag;
                return Ok(Candidate {
                    address: addr,
                    precondition: Precondition::MatchEtag(etag),
                });
            }
        }

        Err(EngineError::SubnetFull)
    }

    /// Called when a batch conflicts on this allocator's bucket. Consumes
    /// one unit of retry budget and fails with `SubnetFull` once exhausted.
    pub fn record_conflict(&mut self) -> Result<(), EngineError> {
        self.retries += 1;
        if self.retries >= IP_PROVISION_RETRIES {
            return Err(EngineError::SubnetFull);
        }
        Ok(())
    }
}

/// A caller-specified address bypasses §4.3.1 selection entirely.
pub async fn propose_specific(
    store: &dyn Store,
    network: &Network,
    address: IpAddr,
) -> Result<Candidate, EngineError> {
    let bucket = ip_bucket(&network.uuid);
    match store.get(&bucket, &address.to_string()).await {
        Ok(existing) => {
            let belongs_to = existing.value.get("belongs_to_uuid").cloned().unwrap_or(json!(null));
            if !belongs_to.is_null() {
                return Err(EngineError::invalid(
                    "ip",
                    "IP_IN_USE",
                    format!("{address} is already in use"),
                ));
            }
            Ok(Candidate {
                address,
                precondition: Precondition::MatchEtag(existing.etag),
            })
        }
        Err(StoreError::NotFound { .. }) => Ok(Candidate {
            address,
            precondition: Precondition::CreateOnly,
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netreg_network::AddressFamily;
    use netreg_store::memory::InMemoryStore;
    use netreg_uuid::NetworkUuid;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn sample_network() -> Network {
        Network {
            uuid: NetworkUuid::new_v4(),
            name: "t".into(),
            nic_tag: "t".into(),
            vlan_id: 46,
            vnet_id: None,
            family: AddressFamily::V4,
            subnet: ipnet::IpNet::from_str("10.0.2.0/24").unwrap(),
            provision_start: IpAddr::from_str("10.0.2.5").unwrap(),
            provision_end: IpAddr::from_str("10.0.2.250").unwrap(),
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

    #[tokio::test]
    async fn scenario_1_first_three_allocations_are_sequential() {
        let store = InMemoryStore::new();
        let network = sample_network();
        seed_network(&store, &network).await.unwrap();

        let mut addrs = vec![];
        for _ in 0..3 {
            let mut attempt = IpAllocationAttempt::new(network.clone());
            let candidate = attempt.next_candidate(&store).await.unwrap();
            store
                .put(
                    &ip_bucket(&network.uuid),
                    &candidate.address.to_string(),
                    json!({"ipaddr": candidate.address.to_string(), "reserved": true, "belongs_to_uuid": "x"}),
                    candidate.precondition,
                )
                .await
                .unwrap();
            addrs.push(candidate.address.to_string());
        }
        assert_eq!(addrs, vec!["10.0.2.5", "10.0.2.6", "10.0.2.7"]);
    }

    async fn allocate_one(store: &InMemoryStore, network: &Network) -> String {
        let mut attempt = IpAllocationAttempt::new(network.clone());
        let candidate = attempt.next_candidate(store).await.unwrap();
        store
            .put(
                &ip_bucket(&network.uuid),
                &candidate.address.to_string(),
                json!({"ipaddr": candidate.address.to_string(), "reserved": true, "belongs_to_uuid": "x"}),
                candidate.precondition,
            )
            .await
            .unwrap();
        candidate.address.to_string()
    }

    /// Mirrors `NicEngine::delete`'s IP-side effect: the record stays in the
    /// bucket (so gap-scan never sees a hole there) but is marked
    /// unassigned, making it eligible for freed-first reuse.
    async fn free_address(store: &InMemoryStore, network: &Network, addr: &str) {
        let bucket = ip_bucket(&network.uuid);
        let current = store.get(&bucket, addr).await.unwrap();
        let mut freed = current.value.clone();
        freed["reserved"] = json!(false);
        freed["belongs_to_uuid"] = serde_json::Value::Null;
        store
            .put(&bucket, addr, freed, Precondition::MatchEtag(current.etag))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scenario_2_gap_first_not_freed_after_one_deletion() {
        let store = InMemoryStore::new();
        let network = sample_network();
        seed_network(&store, &network).await.unwrap();

        let mut addrs = vec![];
        for _ in 0..3 {
            addrs.push(allocate_one(&store, &network).await);
        }
        assert_eq!(addrs, vec!["10.0.2.5", "10.0.2.6", "10.0.2.7"]);

        free_address(&store, &network, "10.0.2.6").await;

        let fourth = allocate_one(&store, &network).await;
        assert_eq!(fourth, "10.0.2.8", "gap-first must prefer the untouched tail over the freed hole");
    }

    #[tokio::test]
    async fn scenario_3_subnet_full_after_range_exhaustion_then_freed_reuse() {
        let store = InMemoryStore::new();
        let network = sample_network();
        seed_network(&store, &network).await.unwrap();

        // Provision 10.0.2.5 .. 10.0.2.9, delete the second (10.0.2.6), then
        // exhaust the remaining range, then expect the freed hole to be
        // handed back, then SubnetFull.
        let mut addrs = vec![];
        for _ in 0..5 {
            addrs.push(allocate_one(&store, &network).await);
        }
        assert_eq!(addrs[1], "10.0.2.6");
        free_address(&store, &network, "10.0.2.6").await;

        // Exhaust the rest of the range: 10.0.2.10 .. 10.0.2.250 (241 more).
        let mut last = String::new();
        for _ in 0..241 {
            last = allocate_one(&store, &network).await;
        }
        assert_eq!(last, "10.0.2.250", "range must be fully exhausted before freed-first kicks in");

        let freed = allocate_one(&store, &network).await;
        assert_eq!(freed, "10.0.2.6", "once the range is exhausted, the freed hole is reused");

        let mut attempt = IpAllocationAttempt::new(network.clone());
        let result = attempt.next_candidate(&store).await;
        assert!(matches!(result, Err(EngineError::SubnetFull)));
    }
}
