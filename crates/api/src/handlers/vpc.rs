//! `/vpc[/:uuid]`, `/vpc/:uuid/networks[/:uuid]` (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NETWORKS_BUCKET;
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::{Network, Vpc};
use netreg_store::Precondition;
use netreg_uuid::VpcUuid;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::networks::{check_cross_network, validate_network};
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

const BUCKET: &str = "vpcs";

const VPC_PARAMS: &[&str] = &["vpc_uuid", "owner_uuid", "vnet_id", "name"];

fn validate_vpc(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "vpc_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "owner_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "vnet_id", rule: Rule::VxlanId, required: true })
        .check(ParamSpec { name: "name", rule: Rule::StringLen { max_len: 64 }, required: true })
        .strict(VPC_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

fn parse_vpc_uuid(raw: &str) -> Result<VpcUuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(EngineError::invalid("uuid", "INVALID_UUID", "not a valid vpc uuid")))
}

fn to_model(rec: &netreg_store::StoredRecord) -> Result<Vpc, ApiError> {
    serde_json::from_value(rec.value.clone()).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let recs = crate::crud::list(&*state.store, BUCKET).await?;
    let vpcs: Vec<Vpc> = recs.iter().filter_map(|r| to_model(r).ok()).collect();
    Ok(Json(vpcs).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Result<Response, ApiError> {
    let rec = crate::crud::get(&*state.store, BUCKET, &uuid).await?;
    Ok(Json(to_model(&rec)?).into_response())
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_vpc(&raw)?;
    let vpc: Vpc = from_validated(raw)?;
    let value = serde_json::to_value(&vpc).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::create(&*state.store, BUCKET, &vpc.vpc_uuid.to_string(), value).await?;
    Ok((StatusCode::OK, Json(vpc)).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    validate_vpc(&raw)?;
    let vpc: Vpc = from_validated(raw)?;
    let value = serde_json::to_value(&vpc).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, BUCKET, &uuid, if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(vpc)).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    crate::crud::delete(&*state.store, BUCKET, &uuid, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn in_vpc(network: &Network, vpc_uuid: &VpcUuid) -> bool {
    network.vpc_uuid == Some(*vpc_uuid)
}

pub async fn list_networks(State(state): State<Arc<AppState>>, Path(vpc_uuid): Path<String>) -> Result<Response, ApiError> {
    let vpc_uuid = parse_vpc_uuid(&vpc_uuid)?;
    let recs = crate::crud::list(&*state.store, NETWORKS_BUCKET).await?;
    let networks: Vec<Network> = recs
        .into_iter()
        .filter_map(|r| serde_json::from_value::<Network>(r.value).ok())
        .filter(|n| in_vpc(n, &vpc_uuid))
        .collect();
    Ok(Json(networks).into_response())
}

pub async fn get_network(
    State(state): State<Arc<AppState>>,
    Path((vpc_uuid, uuid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let vpc_uuid = parse_vpc_uuid(&vpc_uuid)?;
    let rec = crate::crud::get(&*state.store, NETWORKS_BUCKET, &uuid).await?;
    let network: Network =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    if !in_vpc(&network, &vpc_uuid) {
        return Err(ApiError(EngineError::ResourceNotFound(format!("networks/{uuid}"))));
    }
    Ok(Json(network).into_response())
}

pub async fn create_network(
    State(state): State<Arc<AppState>>,
    Path(vpc_uuid): Path<String>,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let vpc_uuid = parse_vpc_uuid(&vpc_uuid)?;
    validate_network(&raw)?;
    let mut network: Network = from_validated(raw)?;
    network.vpc_uuid = Some(vpc_uuid);
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
    Path((vpc_uuid, uuid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let vpc_uuid = parse_vpc_uuid(&vpc_uuid)?;
    validate_network(&raw)?;
    let mut network: Network = from_validated(raw)?;
    network.vpc_uuid = Some(vpc_uuid);
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
    Path((vpc_uuid, uuid)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let vpc_uuid = parse_vpc_uuid(&vpc_uuid)?;
    let rec = crate::crud::get(&*state.store, NETWORKS_BUCKET, &uuid).await?;
    let network: Network =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    if !in_vpc(&network, &vpc_uuid) {
        return Err(ApiError(EngineError::ResourceNotFound(format!("networks/{uuid}"))));
    }
    crate::crud::delete(&*state.store, NETWORKS_BUCKET, &uuid, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
