//! `/nics`, `/nics/:mac` (spec.md §6), plus `/networks/:uuid/nics` (provision).
//!
//! MAC path segments accept colon/dash/bare-hex per spec.md §4.1/§6;
//! responses always carry the colon form via [`Nic`]'s `Serialize` impl.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::{CreateNicRequest, NicEngine, UpdateNicRequest};
use netreg_engine::validation::{ParamSpec, Rule, Validation};
use netreg_engine::EngineError;
use netreg_model::Nic;
use netreg_network::address::Mac;
use netreg_uuid::NetworkUuid;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::{from_validated, if_match, object_params};
use crate::AppState;

const CREATE_NIC_PARAMS: &[&str] = &[
    "mac",
    "owner_uuid",
    "belongs_to_type",
    "belongs_to_uuid",
    "cn_uuid",
    "network_uuid",
    "nic_tag",
    "vlan_id",
    "ip",
    "primary",
    "state",
    "nic_tags_provided",
    "anti_spoof",
    "underlay",
    "model",
];

fn validate_create_nic(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    let mut v = Validation::new(&params);
    v.check(ParamSpec { name: "owner_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "belongs_to_uuid", rule: Rule::Uuid, required: true })
        .check(ParamSpec { name: "belongs_to_type", rule: Rule::StringLen { max_len: 64 }, required: true })
        .check(ParamSpec { name: "mac", rule: Rule::Mac, required: false })
        .check(ParamSpec { name: "network_uuid", rule: Rule::Uuid, required: false })
        .check(ParamSpec { name: "cn_uuid", rule: Rule::Uuid, required: false })
        .check(ParamSpec { name: "nic_tag", rule: Rule::StringLen { max_len: 31 }, required: false })
        .check(ParamSpec { name: "vlan_id", rule: Rule::VlanId, required: false })
        .check(ParamSpec { name: "ip", rule: Rule::Ip, required: false })
        .strict(CREATE_NIC_PARAMS);
    v.finish().map_err(ApiError::from)
}

const UPDATE_NIC_PARAMS: &[&str] =
    &["mac", "primary", "state", "network_uuid", "ip", "anti_spoof", "nic_tags_provided"];

fn validate_update_nic(raw: &Value) -> Result<(), ApiError> {
    let params = object_params(raw)?;
    let mut v = Validation::new(&params);
    v.check(ParamSpec { name: "mac", rule: Rule::Mac, required: false })
        .check(ParamSpec { name: "network_uuid", rule: Rule::Uuid, required: false })
        .check(ParamSpec { name: "ip", rule: Rule::Ip, required: false })
        .strict(UPDATE_NIC_PARAMS);
    v.finish().map_err(ApiError::from)
}

fn parse_mac(raw: &str) -> Result<Mac, ApiError> {
    Mac::parse(raw).map_err(|_| ApiError(EngineError::invalid("mac", "INVALID_MAC", "not a valid mac address")))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let engine = NicEngine::new(&*state.store, state.oui);
    let nics: Vec<Nic> = engine.list().await?;
    Ok(Json(nics).into_response())
}

pub async fn get(State(state): State<Arc<AppState>>, Path(mac): Path<String>) -> Result<Response, ApiError> {
    let mac = parse_mac(&mac)?;
    let engine = NicEngine::new(&*state.store, state.oui);
    let nic = engine.get(mac).await?;
    Ok(Json(nic).into_response())
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct CreateNicBody {
    pub mac: Option<String>,
    pub owner_uuid: netreg_uuid::OwnerUuid,
    pub belongs_to_type: String,
    pub belongs_to_uuid: netreg_uuid::BelongsToUuid,
    pub cn_uuid: Option<netreg_uuid::ComputeNodeUuid>,
    pub network_uuid: Option<NetworkUuid>,
    pub nic_tag: Option<String>,
    pub vlan_id: Option<u16>,
    pub ip: Option<std::net::IpAddr>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub state: netreg_model::NicState,
    #[serde(default)]
    pub nic_tags_provided: Vec<String>,
    #[serde(default)]
    pub anti_spoof: netreg_model::AntiSpoof,
    pub underlay: Option<bool>,
    pub model: Option<String>,
}

impl From<CreateNicBody> for CreateNicRequest {
    fn from(b: CreateNicBody) -> Self {
        CreateNicRequest {
            mac: b.mac,
            owner_uuid: b.owner_uuid,
            belongs_to_type: b.belongs_to_type,
            belongs_to_uuid: b.belongs_to_uuid,
            cn_uuid: b.cn_uuid,
            network_uuid: b.network_uuid,
            nic_tag: b.nic_tag,
            vlan_id: b.vlan_id,
            ip: b.ip,
            primary: b.primary,
            state: b.state,
            nic_tags_provided: b.nic_tags_provided,
            anti_spoof: b.anti_spoof,
            underlay: b.underlay,
            model: b.model,
        }
    }
}

pub async fn create(State(state): State<Arc<AppState>>, Json(raw): Json<Value>) -> Result<Response, ApiError> {
    validate_create_nic(&raw)?;
    let body: CreateNicBody = from_validated(raw)?;
    let engine = NicEngine::new(&*state.store, state.oui);
    let nic = engine.create(body.into()).await?;
    Ok((StatusCode::OK, Json(nic)).into_response())
}

/// `/networks/:uuid/nics`: the same creation path with the network fixed
/// by the path segment (spec.md §6's "provision" operation).
pub async fn provision(
    State(state): State<Arc<AppState>>,
    Path(network_uuid): Path<String>,
    Json(mut raw): Json<Value>,
) -> Result<Response, ApiError> {
    let network_uuid: NetworkUuid = network_uuid
        .parse()
        .map_err(|_| ApiError(EngineError::invalid("uuid", "INVALID_UUID", "not a valid uuid")))?;
    validate_create_nic(&raw)?;
    if let Some(obj) = raw.as_object_mut() {
        obj.insert("network_uuid".into(), serde_json::json!(network_uuid.to_string()));
    }
    let body: CreateNicBody = from_validated(raw)?;
    let engine = NicEngine::new(&*state.store, state.oui);
    let nic = engine.create(body.into()).await?;
    Ok((StatusCode::OK, Json(nic)).into_response())
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct UpdateNicBody {
    pub mac: Option<String>,
    pub primary: Option<bool>,
    pub state: Option<netreg_model::NicState>,
    pub network_uuid: Option<NetworkUuid>,
    pub ip: Option<std::net::IpAddr>,
    pub anti_spoof: Option<netreg_model::AntiSpoof>,
    pub nic_tags_provided: Option<Vec<String>>,
}

impl From<UpdateNicBody> for UpdateNicRequest {
    fn from(b: UpdateNicBody) -> Self {
        UpdateNicRequest {
            mac: b.mac,
            primary: b.primary,
            state: b.state,
            network_uuid: b.network_uuid,
            ip: b.ip,
            anti_spoof: b.anti_spoof,
            nic_tags_provided: b.nic_tags_provided,
        }
    }
}

/// Checks a caller-supplied `If-Match` against the NIC's current etag up
/// front. `NicEngine::update`/`delete` re-read and match the etag
/// internally for their own batch precondition, so this only needs to
/// catch the case spec.md §6 cares about: a stale client retrying against
/// a record someone else already changed.
async fn check_if_match(engine: &NicEngine<'_>, mac: Mac, headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(expected) = if_match(headers) {
        let current = engine.get(mac).await?;
        if expected != current.etag.to_string() {
            return Err(ApiError(EngineError::PreconditionFailed {
                expected,
                incoming: current.etag.to_string(),
            }));
        }
    }
    Ok(())
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
    headers: HeaderMap,
    Json(raw): Json<Value>,
) -> Result<Response, ApiError> {
    let mac = parse_mac(&mac)?;
    validate_update_nic(&raw)?;
    let body: UpdateNicBody = from_validated(raw)?;
    let engine = NicEngine::new(&*state.store, state.oui);
    check_if_match(&engine, mac, &headers).await?;
    let nic = engine.update(mac, body.into()).await?;
    Ok((StatusCode::OK, Json(nic)).into_response())
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let mac = parse_mac(&mac)?;
    let engine = NicEngine::new(&*state.store, state.oui);
    check_if_match(&engine, mac, &headers).await?;
    engine.delete(mac).await?;
    Ok(StatusCode::NO_CONTENT)
}
