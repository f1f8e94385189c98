pub mod aggregations;
pub mod fabrics;
pub mod ips;
pub mod network_pools;
pub mod networks;
pub mod nic_tags;
pub mod nics;
pub mod search;
pub mod vpc;

use std::collections::HashMap;

use axum::http::HeaderMap;
use netreg_engine::EngineError;
use serde_json::Value;

use crate::error::ApiError;

/// Pulls `If-Match` off an incoming request, stripping the quoting most
/// HTTP clients wrap an etag in.
pub fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get("if-match")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
}

/// Flattens a request body's top-level JSON object into the
/// `&HashMap<String, Value>` shape `netreg_engine::validation::Validation`
/// runs against (spec.md §4.8: "every API-facing operation passes its raw
/// parameters through a declarative validator" before anything else sees
/// them).
pub fn object_params(value: &Value) -> Result<HashMap<String, Value>, ApiError> {
    value
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .ok_or_else(|| ApiError(EngineError::invalid("body", "INVALID_BODY", "request body must be a JSON object")))
}

/// Deserializes `raw` into `T` after it has already passed `Validation`,
/// mapping the (now-unexpected) residual failure to a 422 rather than the
/// catch-all 500 a plain `serde_json` error would otherwise surface as.
pub fn from_validated<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, ApiError> {
    serde_json::from_value(raw)
        .map_err(|e| ApiError(EngineError::invalid("body", "INVALID_BODY", e.to_string())))
}
