//! NIC engine (C5): validates, composes IP+MAC reservations into a single
//! batched write, performs updates/deletes preserving cross-record
//! invariants.
//!
//! Grounded on `carbide-api-db`'s compound-transaction shape (assemble a
//! batch, commit, retry on conflict) and the teacher's "engine calls two
//! sub-allocators" layering between `ip_allocator.rs` and the NIC
//! create/update paths that consume it.

use std::net::IpAddr;

use chrono::Utc;
use netreg_model::nic::{AntiSpoof, Nic, NicState};
use netreg_model::Network;
use netreg_store::{BatchOp, Precondition, Store, StoreError};
use netreg_uuid::{BelongsToUuid, ComputeNodeUuid, NetworkUuid, OwnerUuid};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::EngineError;
use crate::ip_allocator::{self, Candidate, IpAllocationAttempt};
use crate::mac_allocator::{self, Oui};

pub const NIC_BUCKET: &str = "nics";
pub const NETWORKS_BUCKET: &str = "networks";

/// Fixed retry budget for `update`/`delete`'s read-modify-write batch,
/// matching `IP_PROVISION_RETRIES`/`MAC_RETRIES`'s "fixed, e.g. N" shape
/// (spec.md §4.3.3/§4.4): a `StoreError::Conflict` means the NIC record
/// moved since it was read, so the record is re-fetched and the batch
/// rebuilt against its current etag.
pub const NIC_BATCH_RETRIES: u32 = 20;

#[derive(Debug, Clone, Default)]
pub struct CreateNicRequest {
    pub mac: Option<String>,
    pub owner_uuid: OwnerUuid,
    pub belongs_to_type: String,
    pub belongs_to_uuid: BelongsToUuid,
    pub cn_uuid: Option<ComputeNodeUuid>,
    pub network_uuid: Option<NetworkUuid>,
    pub nic_tag: Option<String>,
    pub vlan_id: Option<u16>,
    pub ip: Option<IpAddr>,
    pub primary: bool,
    pub state: NicState,
    pub nic_tags_provided: Vec<String>,
    pub anti_spoof: AntiSpoof,
    pub underlay: Option<bool>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateNicRequest {
    pub mac: Option<String>,
    pub primary: Option<bool>,
    pub state: Option<NicState>,
    pub network_uuid: Option<NetworkUuid>,
    pub ip: Option<IpAddr>,
    pub anti_spoof: Option<AntiSpoof>,
    pub nic_tags_provided: Option<Vec<String>>,
}

fn nic_to_json(nic: &Nic) -> Value {
    json!({
        "mac": nic.mac.as_u64(),
        "owner_uuid": nic.owner_uuid.to_string(),
        "belongs_to_type": nic.belongs_to_type,
        "belongs_to_uuid": nic.belongs_to_uuid.to_string(),
        "cn_uuid": nic.cn_uuid.map(|u| u.to_string()),
        "primary": nic.primary,
        "state": nic.state,
        "nic_tag": nic.nic_tag,
        "nic_tags_provided": nic.nic_tags_provided,
        "network_uuid": nic.network_uuid.map(|u| u.to_string()),
        "ip": nic.ip.map(|a| a.to_string()),
        "anti_spoof": nic.anti_spoof,
        "underlay": nic.underlay,
        "model": nic.model,
        "ctime": nic.ctime,
        "mtime": nic.mtime,
    })
}

fn nic_from_json(mac: netreg_network::address::Mac, value: &Value, etag: netreg_model::Etag) -> Option<Nic> {
    Some(Nic {
        mac,
        owner_uuid: value.get("owner_uuid")?.as_str()?.parse().ok()?,
        belongs_to_type: value.get("belongs_to_type")?.as_str()?.to_string(),
        belongs_to_uuid: value.get("belongs_to_uuid")?.as_str()?.parse().ok()?,
        cn_uuid: value
            .get("cn_uuid")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok()),
        primary: value.get("primary")?.as_bool()?,
        state: serde_json::from_value(value.get("state")?.clone()).ok()?,
        nic_tag: value.get("nic_tag").and_then(|v| v.as_str()).map(String::from),
        nic_tags_provided: serde_json::from_value(value.get("nic_tags_provided")?.clone()).ok()?,
        network_uuid: value
            .get("network_uuid")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok()),
        ip: value.get("ip").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()),
        anti_spoof: serde_json::from_value(value.get("anti_spoof")?.clone()).ok()?,
        underlay: value.get("underlay").and_then(|v| v.as_bool()),
        model: value.get("model").and_then(|v| v.as_str()).map(String::from),
        etag,
        ctime: serde_json::from_value(value.get("ctime")?.clone()).ok()?,
        mtime: serde_json::from_value(value.get("mtime")?.clone()).ok()?,
    })
}

async fn load_network(store: &dyn Store, uuid: &NetworkUuid) -> Result<Network, EngineError> {
    let rec = store.get(NETWORKS_BUCKET, &uuid.to_string()).await?;
    serde_json::from_value(rec.value).map_err(|e| EngineError::InternalError(e.to_string()))
}

async fn find_network_by_tag_vlan(
    store: &dyn Store,
    nic_tag: &str,
    vlan_id: u16,
) -> Result<Option<Network>, EngineError> {
    let filter = netreg_store::Filter::new()
        .eq("nic_tag", json!(nic_tag))
        .eq("vlan_id", json!(vlan_id));
    let mut results = store
        .find(NETWORKS_BUCKET, filter, netreg_store::FindOptions::default())
        .await?;
    if results.len() > 1 {
        return Err(EngineError::invalid(
            "nic_tag",
            "AMBIGUOUS_NETWORK",
            "nic_tag/vlan_id matched more than one network",
        ));
    }
    match results.pop() {
        Some(rec) => Ok(Some(
            serde_json::from_value(rec.value).map_err(|e| EngineError::InternalError(e.to_string()))?,
        )),
        None => Ok(None),
    }
}

/// Every other NIC with the same `belongs_to_uuid` demoted to
/// `primary=false`, for the batch that's about to promote one NIC to
/// primary (spec.md §4.5).
async fn demote_other_primaries(
    store: &dyn Store,
    belongs_to_uuid: BelongsToUuid,
    except_mac: u64,
) -> Result<Vec<BatchOp>, EngineError> {
    let filter = netreg_store::Filter::new()
        .eq("belongs_to_uuid", json!(belongs_to_uuid.to_string()))
        .eq("primary", json!(true));
    let others = store
        .find(NIC_BUCKET, filter, netreg_store::FindOptions::default())
        .await?;
    let mut ops = Vec::new();
    for rec in others {
        let mac: u64 = rec.key.parse().map_err(|_| EngineError::InternalError("bad mac key".into()))?;
        if mac == except_mac {
            continue;
        }
        let mut value = rec.value.clone();
        value["primary"] = json!(false);
        ops.push(BatchOp::Put {
            bucket: NIC_BUCKET.into(),
            key: rec.key,
            value,
            precondition: Precondition::MatchEtag(rec.etag),
        });
    }
    Ok(ops)
}

pub struct NicEngine<'a> {
    store: &'a dyn Store,
    oui: Oui,
}

impl<'a> NicEngine<'a> {
    pub fn new(store: &'a dyn Store, oui: Oui) -> Self {
        Self { store, oui }
    }

    async fn resolve_network(&self, req: &CreateNicRequest) -> Result<Option<Network>, EngineError> {
        if let Some(uuid) = req.network_uuid {
            return Ok(Some(load_network(self.store, &uuid).await?));
        }
        if let (Some(tag), Some(vlan)) = (&req.nic_tag, req.vlan_id) {
            return find_network_by_tag_vlan(self.store, tag, vlan).await;
        }
        if req.ip.is_some() {
            return Err(EngineError::InvalidParameters(vec![
                crate::error::FieldError {
                    field: "nic_tag".into(),
                    code: "MISSING_NETWORK".into(),
                    message: "an ip requires a network_uuid or (nic_tag, vlan_id)".into(),
                },
                crate::error::FieldError {
                    field: "vlan_id".into(),
                    code: "MISSING_NETWORK".into(),
                    message: "an ip requires a network_uuid or (nic_tag, vlan_id)".into(),
                },
            ]));
        }
        Ok(None)
    }

    pub async fn create(&self, req: CreateNicRequest) -> Result<Nic, EngineError> {
        let network = self.resolve_network(&req).await?;

        let mut ip_attempt = network.as_ref().map(|n| IpAllocationAttempt::new(n.clone()));

        loop {
            let (mac, mac_precondition) = mac_allocator::allocate(self.store, self.oui, req.mac.as_deref()).await?;

            let ip_candidate: Option<Candidate> = match (&network, req.ip) {
                (Some(n), Some(addr)) => Some(ip_allocator::propose_specific(self.store, n, addr).await?),
                (Some(_), None) => Some(ip_attempt.as_mut().unwrap().next_candidate(self.store).await?),
                (None, _) => None,
            };

            let now = Utc::now();
            let mut anti_spoof = req.anti_spoof.clone();
            anti_spoof.normalize();
            let nic = Nic {
                mac,
                owner_uuid: req.owner_uuid,
                belongs_to_type: req.belongs_to_type.clone(),
                belongs_to_uuid: req.belongs_to_uuid,
                cn_uuid: req.cn_uuid,
                primary: req.primary,
                state: req.state,
                nic_tag: network.as_ref().map(|n| n.nic_tag.clone()).or_else(|| req.nic_tag.clone()),
                nic_tags_provided: req.nic_tags_provided.clone(),
                network_uuid: network.as_ref().map(|n| n.uuid),
                ip: ip_candidate.as_ref().map(|c| c.address),
                anti_spoof,
                underlay: req.underlay,
                model: req.model.clone(),
                etag: netreg_model::Etag::generate(),
                ctime: now,
                mtime: now,
            };

            let mut ops = vec![BatchOp::Put {
                bucket: NIC_BUCKET.into(),
                key: mac.as_u64().to_string(),
                value: nic_to_json(&nic),
                precondition: mac_precondition.clone(),
            }];
            if let (Some(candidate), Some(n)) = (&ip_candidate, &network) {
                ops.push(BatchOp::Put {
                    bucket: ip_allocator::ip_bucket(&n.uuid),
                    key: candidate.address.to_string(),
                    value: json!({
                        "ipaddr": candidate.address.to_string(),
                        "network_uuid": n.uuid.to_string(),
                        "reserved": true,
                        "belongs_to_type": nic.belongs_to_type,
                        "belongs_to_uuid": nic.belongs_to_uuid.to_string(),
                        "owner_uuid": nic.owner_uuid.to_string(),
                    }),
                    precondition: candidate.precondition.clone(),
                });
            }
            if req.primary {
                ops.extend(demote_other_primaries(self.store, req.belongs_to_uuid, mac.as_u64()).await?);
            }

            match self.store.batch(ops).await {
                Ok(_) => {
                    debug!(mac = %mac, "nic created");
                    return Ok(nic);
                }
                Err(StoreError::Conflict { bucket, .. }) if bucket == NIC_BUCKET => {
                    if req.mac.is_some() {
                        return Err(EngineError::DuplicateParameter("mac".into()));
                    }
                    continue;
                }
                Err(StoreError::Conflict { bucket, .. })
                    if network.as_ref().is_some_and(|n| bucket == ip_allocator::ip_bucket(&n.uuid)) =>
                {
                    if req.ip.is_some() {
                        return Err(EngineError::invalid("ip", "IP_IN_USE", "ip is already in use"));
                    }
                    ip_attempt.as_mut().unwrap().record_conflict()?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get(&self, mac: netreg_network::address::Mac) -> Result<Nic, EngineError> {
        let rec = self.store.get(NIC_BUCKET, &mac.as_u64().to_string()).await?;
        nic_from_json(mac, &rec.value, rec.etag).ok_or_else(|| EngineError::InternalError("corrupt nic record".into()))
    }

    pub async fn list(&self) -> Result<Vec<Nic>, EngineError> {
        let recs = self
            .store
            .find(NIC_BUCKET, netreg_store::Filter::new(), netreg_store::FindOptions::default())
            .await?;
        let mut nics = Vec::with_capacity(recs.len());
        for rec in recs {
            let mac = netreg_network::address::Mac::from_u64(
                rec.key.parse().map_err(|_| EngineError::InternalError("bad mac key".into()))?,
            )
            .map_err(|e| EngineError::InternalError(e.to_string()))?;
            if let Some(nic) = nic_from_json(mac, &rec.value, rec.etag) {
                nics.push(nic);
            }
        }
        Ok(nics)
    }

    pub async fn update(&self, mac: netreg_network::address::Mac, req: UpdateNicRequest) -> Result<Nic, EngineError> {
        // Changing `mac` is rejected silently: the field is simply ignored,
        // since it is the record's key (spec.md §4.5).
        for _ in 0..NIC_BATCH_RETRIES {
            let current_rec = self.store.get(NIC_BUCKET, &mac.as_u64().to_string()).await?;
            let mut nic = nic_from_json(mac, &current_rec.value, current_rec.etag.clone())
                .ok_or_else(|| EngineError::InternalError("corrupt nic record".into()))?;

            let old_network_uuid = nic.network_uuid;
            let old_ip = nic.ip;
            let old_belongs_to = nic.belongs_to_uuid;

            if let Some(primary) = req.primary {
                nic.primary = primary;
            }
            if let Some(state) = req.state {
                nic.state = state;
            }
            if let Some(anti_spoof) = req.anti_spoof.clone() {
                nic.anti_spoof = anti_spoof;
            }
            nic.anti_spoof.normalize();
            if let Some(tags) = req.nic_tags_provided.clone() {
                nic.nic_tags_provided = tags;
            }

            let network_changed = req.network_uuid.is_some() && req.network_uuid != old_network_uuid;
            let ip_changed = req.ip.is_some() && req.ip != old_ip;

            let mut new_candidate: Option<(Candidate, Network)> = None;
            if network_changed || ip_changed {
                let target_uuid = req.network_uuid.or(old_network_uuid).ok_or_else(|| {
                    EngineError::invalid("network_uuid", "MISSING_NETWORK", "no network to allocate the new ip on")
                })?;
                let network = load_network(self.store, &target_uuid).await?;
                let candidate = match req.ip {
                    Some(addr) => ip_allocator::propose_specific(self.store, &network, addr).await?,
                    None => IpAllocationAttempt::new(network.clone()).next_candidate(self.store).await?,
                };
                nic.network_uuid = Some(network.uuid);
                nic.nic_tag = Some(network.nic_tag.clone());
                nic.ip = Some(candidate.address);
                new_candidate = Some((candidate, network));
            }

            nic.etag = netreg_model::Etag::generate();
            nic.mtime = Utc::now();

            let mut ops = vec![BatchOp::Put {
                bucket: NIC_BUCKET.into(),
                key: mac.as_u64().to_string(),
                value: nic_to_json(&nic),
                precondition: Precondition::MatchEtag(current_rec.etag),
            }];

            if let Some((candidate, network)) = &new_candidate {
                ops.push(BatchOp::Put {
                    bucket: ip_allocator::ip_bucket(&network.uuid),
                    key: candidate.address.to_string(),
                    value: json!({
                        "ipaddr": candidate.address.to_string(),
                        "network_uuid": network.uuid.to_string(),
                        "reserved": true,
                        "belongs_to_type": nic.belongs_to_type,
                        "belongs_to_uuid": nic.belongs_to_uuid.to_string(),
                        "owner_uuid": nic.owner_uuid.to_string(),
                    }),
                    precondition: candidate.precondition.clone(),
                });

                // Free the old IP only if it's still ours (spec.md §4.5).
                if let (Some(old_net), Some(old_addr)) = (old_network_uuid, old_ip) {
                    if old_net != network.uuid || old_addr != candidate.address {
                        let old_bucket = ip_allocator::ip_bucket(&old_net);
                        if let Ok(old_rec) = self.store.get(&old_bucket, &old_addr.to_string()).await {
                            let still_ours = old_rec
                                .value
                                .get("belongs_to_uuid")
                                .and_then(|v| v.as_str())
                                .map(|s| s == old_belongs_to.to_string())
                                .unwrap_or(false);
                            if still_ours {
                                let mut freed = old_rec.value.clone();
                                freed["reserved"] = json!(false);
                                freed["belongs_to_type"] = Value::Null;
                                freed["belongs_to_uuid"] = Value::Null;
                                freed["owner_uuid"] = Value::Null;
                                ops.push(BatchOp::Put {
                                    bucket: old_bucket,
                                    key: old_addr.to_string(),
                                    value: freed,
                                    precondition: Precondition::MatchEtag(old_rec.etag),
                                });
                            }
                        }
                    }
                }
            }

            if req.primary == Some(true) {
                ops.extend(demote_other_primaries(self.store, nic.belongs_to_uuid, mac.as_u64()).await?);
            }

            match self.store.batch(ops).await {
                Ok(_) => return Ok(nic),
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::InternalError(format!(
            "update on nic {mac} did not converge after {NIC_BATCH_RETRIES} retries"
        )))
    }

    pub async fn delete(&self, mac: netreg_network::address::Mac) -> Result<(), EngineError> {
        for _ in 0..NIC_BATCH_RETRIES {
            let current_rec = self.store.get(NIC_BUCKET, &mac.as_u64().to_string()).await?;
            let nic = nic_from_json(mac, &current_rec.value, current_rec.etag.clone())
                .ok_or_else(|| EngineError::InternalError("corrupt nic record".into()))?;

            let mut ops = vec![BatchOp::Delete {
                bucket: NIC_BUCKET.into(),
                key: mac.as_u64().to_string(),
                precondition: Precondition::MatchEtag(current_rec.etag),
            }];

            if let (Some(network_uuid), Some(addr)) = (nic.network_uuid, nic.ip) {
                let bucket = ip_allocator::ip_bucket(&network_uuid);
                if let Ok(ip_rec) = self.store.get(&bucket, &addr.to_string()).await {
                    let still_ours = ip_rec
                        .value
                        .get("belongs_to_uuid")
                        .and_then(|v| v.as_str())
                        .map(|s| s == nic.belongs_to_uuid.to_string())
                        .unwrap_or(false);
                    if still_ours {
                        let mut freed = ip_rec.value.clone();
                        freed["reserved"] = json!(false);
                        freed["belongs_to_type"] = Value::Null;
                        freed["belongs_to_uuid"] = Value::Null;
                        freed["owner_uuid"] = Value::Null;
                        ops.push(BatchOp::Put {
                            bucket,
                            key: addr.to_string(),
                            value: freed,
                            precondition: Precondition::MatchEtag(ip_rec.etag),
                        });
                    }
                }
            }

            match self.store.batch(ops).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::InternalError(format!(
            "delete of nic {mac} did not converge after {NIC_BATCH_RETRIES} retries"
        )))
    }
}
