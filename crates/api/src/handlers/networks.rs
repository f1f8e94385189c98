//! `/networks`, `/networks/:uuid` (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NETWORKS_BUCKET;
use netreg_engine::validation::{check_network_invariants, ParamSpec, Rule, Validation};
use netreg_engine::{ip_allocator, EngineError};
use netreg_model::{NicTag, Network};
use netreg_store::{Filter, FindOptions, Precondition};
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{from_validated, if_match, object_params};
use crate::handlers::nic_tags::NIC_TAGS_BUCKET;
use crate::AppState;

const NETWORK_PARAMS: &[&str] = &[
    "uuid",
    "name",
    "nic_tag",
    "vlan_id",
    "vnet_id",
    "family",
    "subnet",
    "provision_start",
    "provision_end",
    "gateway",
    "resolvers",
    "routes",
    "mtu",
    "owner_uuids",
    "fabric",
    "vpc_uuid",
    "etag",
];

pub(crate) fn validate_network(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "name", rule: Rule::StringLen { max_len: 64 }, required: true })
        .check(ParamSpec { name: "nic_tag", rule: Rule::StringLen { max_len: 31 }, required: true })
        .check(ParamSpec { name: "vlan_id", rule: Rule::VlanId, required: true })
        .check(ParamSpec { name: "vnet_id", rule: Rule::VxlanId, required: false })
        .check(ParamSpec { name: "provision_start", rule: Rule::Ip, required: true })
        .check(ParamSpec { name: "provision_end", rule: Rule::Ip, required: true })
        .check(ParamSpec { name: "gateway", rule: Rule::Ip, required: false })
        .strict(NETWORK_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

/// Loads every other network and the candidate's `nic_tag` record, then
/// runs the cross-network invariants `Network::validate` can't see on its
/// own (spec.md §3).
pub(crate) async fn check_cross_network(state: &AppState, candidate: &Network) -> Result<(), ApiError> {
    let recs = state.store.find(NETWORKS_BUCKET, Filter::new(), FindOptions::default()).await?;
    let others: Vec<Network> = recs.into_iter().filter_map(|r| serde_json::from_value(r.value).ok()).collect();
    let tag = match state.store.get(NIC_TAGS_BUCKET, &candidate.nic_tag).await {
        Ok(rec) => serde_json::from_value::<NicTag>(rec.value).ok(),
        Err(_) => None,
    };
    check_network_invariants(candidate, &others, tag.as_ref())?;
    Ok(())
}

fn with_etag(net: &Network, etag: &netreg_model::Etag) -> Response {
    let mut res = (StatusCode::OK, Json(net)).into_response();
    if let Ok(value) = etag.to_string().parse() {
        res.headers_mut().insert("etag", value);
    }
    res
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let recs = crate::crud::list(&*state.store, NETWORKS_BUCKET).await?;
    let networks: Vec<Network> = recs
        .into_iter()
        .filter_map(|r| serde_json::from_value(r.value).ok())
        .collect();
    Ok(Json(networks).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Result<Response, ApiError> {
    let rec = crate::crud::get(&*state.store, NETWORKS_BUCKET, &uuid).await?;
    let network: Network =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    Ok(with_etag(&network, &rec.etag))
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_network(&raw)?;
    let network: Network = from_validated(raw)?;
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
    ip_allocator::seed_network(&*state.store, &network).await?;

    Ok((StatusCode::OK, Json(network)).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    validate_network(&raw)?;
    let mut network: Network = from_validated(raw)?;
    network
        .validate()
        .map_err(|e| ApiError(EngineError::invalid("network", "INVALID_NETWORK", e.to_string())))?;
    check_cross_network(&state, &network).await?;
    network.etag = netreg_model::Etag::generate();

    let value = serde_json::to_value(&network).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    let rec = crate::crud::update(&*state.store, NETWORKS_BUCKET, &uuid, if_match(&headers).as_deref(), value).await?;
    Ok(with_etag(&network, &rec.etag))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    crate::crud::delete(&*state.store, NETWORKS_BUCKET, &uuid, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
