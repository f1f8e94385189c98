//! `/fabrics/:owner/vlans[/:id]`, `/fabrics/:owner/networks[/:uuid]`
//! (spec.md §6). VLANs are keyed `<owner>:<vlan_id>`; the networks surface
//! is the same `Network` CRUD as `networks.rs`, scoped to `fabric=true`
//! networks owned by `:owner`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NETWORKS_BUCKET;
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::{FabricVlan, Network};
use netreg_store::{Filter, FindOptions, Precondition};
use netreg_uuid::OwnerUuid;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::networks::{check_cross_network, validate_network};
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

const VLAN_BUCKET: &str = "fabric_vlans";

const VLAN_PARAMS: &[&str] = &["vlan_id", "owner_uuid", "vnet_id"];

fn validate_vlan(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "vlan_id", rule: Rule::VlanId, required: true })
        .check(ParamSpec { name: "owner_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "vnet_id", rule: Rule::VxlanId, required: true })
        .strict(VLAN_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

fn parse_owner(raw: &str) -> Result<OwnerUuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(EngineError::invalid("owner", "INVALID_UUID", "not a valid owner uuid")))
}

fn vlan_key(owner: &OwnerUuid, vlan_id: u16) -> String {
    format!("{owner}:{vlan_id}")
}

fn to_vlan(rec: &netreg_store::StoredRecord) -> Result<FabricVlan, ApiError> {
    serde_json::from_value(rec.value.clone()).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))
}

pub async fn list_vlans(State(state): State<Arc<AppState>>, Path(owner): Path<String>) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    let filter = Filter::new().eq("owner_uuid", serde_json::json!(owner.to_string()));
    let recs = state.store.find(VLAN_BUCKET, filter, FindOptions::default()).await?;
    let vlans: Vec<FabricVlan> = recs.iter().filter_map(|r| to_vlan(r).ok()).collect();
    Ok(Json(vlans).into_response())
}

pub async fn get_vlan(
    State(state): State<Arc<AppState>>,
    Path((owner, id)): Path<(String, u16)>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    let rec = crate::crud::get(&*state.store, VLAN_BUCKET, &vlan_key(&owner, id)).await?;
    Ok(Json(to_vlan(&rec)?).into_response())
}

pub async fn create_vlan(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    validate_vlan(&raw)?;
    let vlan: FabricVlan = from_validated(raw)?;
    if vlan.owner_uuid != owner {
        return Err(ApiError(EngineError::invalid("owner_uuid", "OWNER_MISMATCH", "body owner_uuid must match the path")));
    }
    let value = serde_json::to_value(&vlan).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::create(&*state.store, VLAN_BUCKET, &vlan_key(&owner, vlan.vlan_id), value).await?;
    Ok((StatusCode::OK, Json(vlan)).into_response())
}

pub async fn update_vlan(
    State(state): State<Arc<AppState>>,
    Path((owner, id)): Path<(String, u16)>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    validate_vlan(&raw)?;
    let vlan: FabricVlan = from_validated(raw)?;
    let value = serde_json::to_value(&vlan).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, VLAN_BUCKET, &vlan_key(&owner, id), if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(vlan)).into_response())
}

pub async fn delete_vlan(
    State(state): State<Arc<AppState>>,
    Path((owner, id)): Path<(String, u16)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let owner = parse_owner(&owner)?;
    crate::crud::delete(&*state.store, VLAN_BUCKET, &vlan_key(&owner, id), if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn owned_by(network: &Network, owner: &OwnerUuid) -> bool {
    network.fabric && network.owner_uuids.as_ref().is_some_and(|owners| owners.contains(owner))
}

pub async fn list_networks(State(state): State<Arc<AppState>>, Path(owner): Path<String>) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    let recs = crate::crud::list(&*state.store, NETWORKS_BUCKET).await?;
    let networks: Vec<Network> = recs
        .into_iter()
        .filter_map(|r| serde_json::from_value::<Network>(r.value).ok())
        .filter(|n| owned_by(n, &owner))
        .collect();
    Ok(Json(networks).into_response())
}

pub async fn get_network(
    State(state): State<Arc<AppState>>,
    Path((owner, uuid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    let rec = crate::crud::get(&*state.store, NETWORKS_BUCKET, &uuid).await?;
    let network: Network =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    if !owned_by(&network, &owner) {
        return Err(ApiError(EngineError::ResourceNotFound(format!("networks/{uuid}"))));
    }
    Ok(Json(network).into_response())
}

pub async fn create_network(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    validate_network(&raw)?;
    let mut network: Network = from_validated(raw)?;
    network.fabric = true;
    network.owner_uuids.get_or_insert_with(Vec::new);
    if !network.owner_uuids.as_ref().unwrap().contains(&owner) {
        network.owner_uuids.as_mut().unwrap().push(owner);
    }
    network
        .validate()
        .map_err(|e| ApiError(EngineError::invalid("network", "INVALID_NETWORK", e.to_string())))?;
    check_cross_network(&state, &network).await?;
    let value = serde_json::to_value(&network).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    state
        .store
        .put(NETWORKS_BUCKET, &network.uuid.to_string(), value, Precondition::CreateOnly)
        .await
        .map_err(ApiError::from)?;
    netreg_engine::ip_allocator::seed_network(&*state.store, &network).await?;
    Ok((StatusCode::OK, Json(network)).into_response())
}

pub async fn update_network(
    State(state): State<Arc<AppState>>,
    Path((owner, uuid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let owner = parse_owner(&owner)?;
    validate_network(&raw)?;
    let mut network: Network = from_validated(raw)?;
    network.fabric = true;
    if !owned_by(&network, &owner) {
        return Err(ApiError(EngineError::invalid(
            "owner_uuid",
            "OWNER_MISMATCH",
            "network must list the path owner among its owner_uuids",
        )));
    }
    network
        .validate()
        .map_err(|e| ApiError(EngineError::invalid("network", "INVALID_NETWORK", e.to_string())))?;
    check_cross_network(&state, &network).await?;
    network.etag = netreg_model::Etag::generate();
    let value = serde_json::to_value(&network).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, NETWORKS_BUCKET, &uuid, if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(network)).into_response())
}

pub async fn delete_network(
    State(state): State<Arc<AppState>>,
    Path((owner, uuid)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let owner = parse_owner(&owner)?;
    let rec = crate::crud::get(&*state.store, NETWORKS_BUCKET, &uuid).await?;
    let network: Network =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    if !owned_by(&network, &owner) {
        return Err(ApiError(EngineError::ResourceNotFound(format!("networks/{uuid}"))));
    }
    crate::crud::delete(&*state.store, NETWORKS_BUCKET, &uuid, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
