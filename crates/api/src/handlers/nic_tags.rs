//! `/nic_tags`, `/nic_tags/:name` (spec.md §6): keyed by name, generic
//! bucket CRUD plus [`NicTag::validate_name`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::NicTag;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

pub(crate) const NIC_TAGS_BUCKET: &str = "nic_tags";
const BUCKET: &str = NIC_TAGS_BUCKET;

const NIC_TAG_PARAMS: &[&str] = &["uuid", "name", "mtu"];

fn validate_nic_tag(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    Validation::new(&params)
        .check(ParamSpec { name: "uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "name", rule: Rule::StringLen { max_len: NicTag::MAX_NAME_LEN }, required: true })
        .strict(NIC_TAG_PARAMS)
        .finish()
        .map_err(ApiError::from)
}

fn to_model(rec: &netreg_store::StoredRecord) -> Result<NicTag, ApiError> {
    serde_json::from_value(rec.value.clone()).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let recs = crate::crud::list(&*state.store, BUCKET).await?;
    let tags: Vec<NicTag> = recs.iter().filter_map(|r| to_model(r).ok()).collect();
    Ok(Json(tags).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let rec = crate::crud::get(&*state.store, BUCKET, &name).await?;
    Ok(Json(to_model(&rec)?).into_response())
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_nic_tag(&raw)?;
    let tag: NicTag = from_validated(raw)?;
    NicTag::validate_name(&tag.name)
        .map_err(|e| ApiError(EngineError::invalid("name", "INVALID_NIC_TAG_NAME", e.to_string())))?;
    let value = serde_json::to_value(&tag).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::create(&*state.store, BUCKET, &tag.name, value).await?;
    Ok((StatusCode::OK, Json(tag)).into_response())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    validate_nic_tag(&raw)?;
    let tag: NicTag = from_validated(raw)?;
    NicTag::validate_name(&tag.name)
        .map_err(|e| ApiError(EngineError::invalid("name", "INVALID_NIC_TAG_NAME", e.to_string())))?;
    let value = serde_json::to_value(&tag).map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
    crate::crud::update(&*state.store, BUCKET, &name, if_match(&headers).as_deref(), value).await?;
    Ok((StatusCode::OK, Json(tag)).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    crate::crud::delete(&*state.store, BUCKET, &name, if_match(&headers).as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}
