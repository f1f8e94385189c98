//! `/network_pools`, `/network_pools/:uuid` (spec.md §6). Validates that
//! every member network exists at creation time (spec.md §3's invariant).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NETWORKS_BUCKET;
use netreg_engine::pool_intersection::{self, PoolFilter};
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::{NetworkPool, Network};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

const BUCKET: &str = "network_pools";

const NETWORK_POOL_PARAMS: &[&str] = &["uuid", "name", "networks", "etag"];

fn validate_network_pool(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "name", rule: Rule::StringLen { max_len: 64 }, required: true })
        .strict(NETWORK_POOL_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

fn to_model(rec: &netreg_store::StoredRecord) -> Result<NetworkPool, ApiError> {
    serde_json::from_value(rec.value.clone()).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))
}

async fn check_members_exist(state: &AppState, pool: &NetworkPool) -> Result<(), ApiError> {
    for uuid in &pool.networks {
        state.store.get(NETWORKS_BUCKET, &uuid.to_string()).await.map_err(|_| {
            ApiError(EngineError::invalid(
                "networks",
                "NETWORK_NOT_FOUND",
                format!("member network {uuid} does not exist"),
            ))
        })?;
    }
    Ok(())
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let recs = crate::crud::list(&*state.store, BUCKET).await?;
    let pools: Vec<NetworkPool> = recs.iter().filter_map(|r| to_model(r).ok()).collect();
    Ok(Json(pools).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Result<Response, ApiError> {
    let rec = crate::crud::get(&*state.store, BUCKET, &uuid).await?;
    Ok(Json(to_model(&rec)?).into_response())
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_network_pool(&raw)?;
    let pool: NetworkPool = from_validated(raw)?;
    check_members_exist(&state, &pool).await?;
    let value = serde_json::to_value(&pool).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::create(&*state.store, BUCKET, &pool.uuid.to_string(), value).await?;
    Ok((StatusCode::OK, Json(pool)).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    validate_network_pool(&raw)?;
    let mut pool: NetworkPool = from_validated(raw)?;
    check_members_exist(&state, &pool).await?;
    pool.etag = netreg_model::Etag::generate();
    let value = serde_json::to_value(&pool).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, BUCKET, &uuid, if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(pool)).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    crate::crud::delete(&*state.store, BUCKET, &uuid, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct IntersectParams {
    /// Comma-separated pool uuids (spec.md §4.6 takes a set of pools).
    pub pools: String,
    pub nic_tag: Option<String>,
    pub nic_tags_available: Option<String>,
    pub mtu: Option<u32>,
    pub vlan_id: Option<u16>,
    pub vnet_id: Option<u32>,
}

async fn load_pool_networks(state: &AppState, pool: &NetworkPool) -> Result<Vec<Network>, ApiError> {
    let mut networks = Vec::with_capacity(pool.networks.len());
    for uuid in &pool.networks {
        let rec = state.store.get(NETWORKS_BUCKET, &uuid.to_string()).await?;
        let network: Network =
            serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
        networks.push(network);
    }
    Ok(networks)
}

/// `GET /network_pools/intersect?pools=<uuid>,<uuid>,...` (spec.md §4.6,
/// C6): resolves each pool to its member networks and returns the
/// `(nic_tag, vlan_id, vnet_id, mtu)` tuples common to all of them.
pub async fn intersect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IntersectParams>,
) -> Result<Response, ApiError> {
    let uuids: Vec<&str> = params.pools.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if uuids.is_empty() {
        return Err(ApiError(EngineError::invalid(
            "pools",
            "MISSING_PARAMETER",
            "pools must name at least one pool uuid",
        )));
    }

    let mut pools = Vec::with_capacity(uuids.len());
    for uuid in uuids {
        let rec = crate::crud::get(&*state.store, BUCKET, uuid).await?;
        let pool = to_model(&rec)?;
        let networks = load_pool_networks(&state, &pool).await?;
        pools.push((pool.name, networks));
    }

    let filter = PoolFilter {
        nic_tag: params.nic_tag,
        nic_tags_available: params.nic_tags_available.map(|s| s.split(',').map(str::to_string).collect()),
        mtu: params.mtu,
        vlan_id: params.vlan_id,
        vnet_id: params.vnet_id,
    };
    let tuples = pool_intersection::intersect(&pools, &filter)?;
    Ok(Json(tuples).into_response())
}
