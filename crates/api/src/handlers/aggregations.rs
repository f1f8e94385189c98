//! `/aggregations`, `/aggregations/:id` (spec.md §6). `id` is derived
//! (`<cn_uuid>-<name>`), never supplied directly by the caller.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NIC_BUCKET;
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::Aggregation;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

const BUCKET: &str = "aggregations";

const AGGREGATION_PARAMS: &[&str] = &["belongs_to_uuid", "name", "macs", "lacp_mode", "nic_tags_provided"];

fn validate_aggregation(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "belongs_to_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "name", rule: Rule::InterfaceName, required: true })
        .check(ParamSpec { name: "lacp_mode", rule: Rule::Enum(&["off", "active", "passive"]), required: true })
        .strict(AGGREGATION_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

fn to_model(rec: &netreg_store::StoredRecord) -> Result<Aggregation, ApiError> {
    serde_json::from_value(rec.value.clone()).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))
}

/// Every MAC in `macs` must reference a NIC with `belongs_to_type=server`
/// and the same `belongs_to_uuid` as the aggregation (spec.md §3).
async fn check_macs(state: &AppState, agg: &Aggregation) -> Result<(), ApiError> {
    for mac in &agg.macs {
        let rec = state.store.get(NIC_BUCKET, &mac.as_u64().to_string()).await.map_err(|_| {
            ApiError(EngineError::invalid("macs", "NIC_NOT_FOUND", format!("{mac} is not a known nic")))
        })?;
        let belongs_to_type = rec.value.get("belongs_to_type").and_then(|v| v.as_str()).unwrap_or_default();
        let belongs_to_uuid = rec.value.get("belongs_to_uuid").and_then(|v| v.as_str()).unwrap_or_default();
        if belongs_to_type != "server" || belongs_to_uuid != agg.belongs_to_uuid.to_string() {
            return Err(ApiError(EngineError::invalid(
                "macs",
                "NIC_NOT_ON_NODE",
                format!("{mac} does not belong to a server on this compute node"),
            )));
        }
    }
    Ok(())
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let recs = crate::crud::list(&*state.store, BUCKET).await?;
    let aggs: Vec<Aggregation> = recs.iter().filter_map(|r| to_model(r).ok()).collect();
    Ok(Json(aggs).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let rec = crate::crud::get(&*state.store, BUCKET, &id).await?;
    Ok(Json(to_model(&rec)?).into_response())
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_aggregation(&raw)?;
    let agg: Aggregation = from_validated(raw)?;
    Aggregation::validate_name(&agg.name)
        .map_err(|e| ApiError(EngineError::invalid("name", "INVALID_AGGREGATION_NAME", e.to_string())))?;
    check_macs(&state, &agg).await?;
    let value = serde_json::to_value(&agg).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::create(&*state.store, BUCKET, &agg.id(), value).await?;
    Ok((StatusCode::OK, Json(agg)).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    validate_aggregation(&raw)?;
    let agg: Aggregation = from_validated(raw)?;
    Aggregation::validate_name(&agg.name)
        .map_err(|e| ApiError(EngineError::invalid("name", "INVALID_AGGREGATION_NAME", e.to_string())))?;
    check_macs(&state, &agg).await?;
    let value = serde_json::to_value(&agg).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, BUCKET, &id, if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(agg)).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    crate::crud::delete(&*state.store, BUCKET, &id, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
