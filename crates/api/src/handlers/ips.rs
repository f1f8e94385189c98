//! `/networks/:uuid/ips`, `/networks/:uuid/ips/:addr` (spec.md §6): list,
//! get, update only — IP records are never created or deleted through this
//! surface, only through NIC provisioning (`nics.rs`).

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::ip_allocator::ip_bucket;
use netreg_engine::EngineError;
use netreg_model::IpRecord;
use netreg_uuid::NetworkUuid;

use crate::error::ApiError;
use crate::handlers::if_match;
use crate::AppState;

fn parse_network_uuid(raw: &str) -> Result<NetworkUuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(EngineError::invalid("uuid", "INVALID_UUID", "not a valid uuid")))
}

pub async fn list(State(state): State<Arc<AppState>>, Path(network_uuid): Path<String>) -> Result<Response, ApiError> {
    let network_uuid = parse_network_uuid(&network_uuid)?;
    let recs = crate::crud::list(&*state.store, &ip_bucket(&network_uuid)).await?;
    let ips: Vec<IpRecord> = recs.into_iter().filter_map(|r| serde_json::from_value(r.value).ok()).collect();
    Ok(Json(ips).into_response())
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((network_uuid, addr)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let network_uuid = parse_network_uuid(&network_uuid)?;
    let rec = crate::crud::get(&*state.store, &ip_bucket(&network_uuid), &addr).await?;
    let record: IpRecord =
        serde_json::from_value(rec.value).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    Ok(Json(record).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((network_uuid, addr)): Path<(String, String)>,
    headers: HeaderMap,
    Json(mut record): Json<IpRecord>,
) -> Result<Response, ApiError> {
    let network_uuid = parse_network_uuid(&network_uuid)?;
    if record.address != addr.parse::<IpAddr>().map_err(|_| ApiError(EngineError::invalid("addr", "INVALID_IP", "not a valid address")))? {
        return Err(ApiError(EngineError::invalid("address", "IMMUTABLE_FIELD", "address cannot be changed via update")));
    }
    record.network_uuid = network_uuid;
    record
        .validate()
        .map_err(|e| ApiError(EngineError::invalid("belongs_to_uuid", "INVALID_IP_RECORD", e.to_string())))?;

    let network_rec = crate::crud::get(&*state.store, netreg_engine::nic_engine::NETWORKS_BUCKET, &network_uuid.to_string()).await?;
    let network: netreg_model::Network = serde_json::from_value(network_rec.value)
        .map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    if let (Some(owners), Some(owner)) = (&network.owner_uuids, record.owner_uuid) {
        if !owners.contains(&owner) {
            return Err(ApiError(EngineError::invalid(
                "owner_uuid",
                "OWNER_NOT_IN_NETWORK",
                "owner_uuid is not among the network's owner_uuids",
            )));
        }
    }

    record.etag = netreg_model::Etag::generate();
    let value = serde_json::to_value(&record).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    let stored = crate::crud::update(&*state.store, &ip_bucket(&network_uuid), &addr, if_match(&headers).as_deref(), value).await?;

    let mut res = (StatusCode::OK, Json(record)).into_response();
    if let Ok(value) = stored.etag.to_string().parse() {
        res.headers_mut().insert("etag", value);
    }
    Ok(res)
}
