//! Maps [`EngineError`]/[`StoreError`] onto the status codes and JSON error
//! body spec.md §6/§7 define.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::{EngineError, FieldError, UsedBy};
use netreg_store::StoreError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub field: Option<String>,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<Vec<UsedByJson>>,
}

#[derive(Debug, Serialize)]
pub struct UsedByJson {
    pub resource: String,
    pub uuid: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorEntry>,
}

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(EngineError::from(err))
    }
}

fn field_entries(mut errs: Vec<FieldError>) -> Vec<ErrorEntry> {
    // "sorted by field name for test stability" (spec.md §7).
    errs.sort_by(|a, b| a.field.cmp(&b.field));
    errs.into_iter()
        .map(|e| ErrorEntry {
            field: Some(e.field),
            code: e.code,
            message: e.message,
            used_by: None,
        })
        .collect()
}

fn used_by_entries(used_by: Vec<UsedBy>) -> Vec<ErrorEntry> {
    vec![ErrorEntry {
        field: None,
        code: "IN_USE".into(),
        message: "resource is still in use".into(),
        used_by: Some(
            used_by
                .into_iter()
                .map(|u| UsedByJson { resource: u.resource, uuid: u.uuid })
                .collect(),
        ),
    }]
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, entries) = match self.0 {
            EngineError::InvalidParameters(errs) => (StatusCode::UNPROCESSABLE_ENTITY, field_entries(errs)),
            EngineError::MissingParameter(field) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![ErrorEntry {
                    field: Some(field),
                    code: "MISSING_PARAMETER".into(),
                    message: "required parameter is missing".into(),
                    used_by: None,
                }],
            ),
            EngineError::DuplicateParameter(field) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![ErrorEntry {
                    field: Some(field),
                    code: "DUPLICATE_PARAMETER".into(),
                    message: "value collides with an existing record".into(),
                    used_by: None,
                }],
            ),
            EngineError::UnknownParameter(field) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                vec![ErrorEntry {
                    field: Some(field),
                    code: "UNKNOWN_PARAMETER".into(),
                    message: "parameter is not recognized".into(),
                    used_by: None,
                }],
            ),
            EngineError::InUse(used_by) => (StatusCode::UNPROCESSABLE_ENTITY, used_by_entries(used_by)),
            EngineError::ResourceNotFound(what) => (
                StatusCode::NOT_FOUND,
                vec![ErrorEntry {
                    field: None,
                    code: "RESOURCE_NOT_FOUND".into(),
                    message: what,
                    used_by: None,
                }],
            ),
            EngineError::PreconditionFailed { expected, incoming } => (
                StatusCode::PRECONDITION_FAILED,
                vec![ErrorEntry {
                    field: None,
                    code: "PRECONDITION_FAILED".into(),
                    message: format!("expected etag {expected}, got {incoming}"),
                    used_by: None,
                }],
            ),
            EngineError::SubnetFull => (
                StatusCode::INSUFFICIENT_STORAGE,
                vec![ErrorEntry {
                    field: None,
                    code: "SUBNET_FULL".into(),
                    message: "no address left to allocate".into(),
                    used_by: None,
                }],
            ),
            EngineError::Overflow => (
                StatusCode::INTERNAL_SERVER_ERROR,
                vec![ErrorEntry {
                    field: None,
                    code: "OVERFLOW".into(),
                    message: "arithmetic overflow".into(),
                    used_by: None,
                }],
            ),
            EngineError::Underflow => (
                StatusCode::INTERNAL_SERVER_ERROR,
                vec![ErrorEntry {
                    field: None,
                    code: "UNDERFLOW".into(),
                    message: "arithmetic underflow".into(),
                    used_by: None,
                }],
            ),
            EngineError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                vec![ErrorEntry { field: None, code: "INTERNAL_ERROR".into(), message: msg, used_by: None }],
            ),
        };
        (status, Json(ErrorBody { errors: entries })).into_response()
    }
}
