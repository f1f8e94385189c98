//! `/search/ips?ip=<addr>` (spec.md §6): locate every IP record for `addr`
//! across all networks. There's no cross-network index, so this fans out
//! over every network's bucket — acceptable since it's a diagnostic path,
//! not one on the provisioning hot path.

use std::net::IpAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use netreg_engine::nic_engine::NETWORKS_BUCKET;
use netreg_engine::EngineError;
use netreg_model::{IpRecord, Network};
use serde::Deserialize;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub ip: IpAddr,
}

pub async fn search_ips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let network_recs = crate::crud::list(&*state.store, NETWORKS_BUCKET).await?;
    let mut hits = Vec::new();
    for rec in network_recs {
        let network: Network = match serde_json::from_value(rec.value) {
            Ok(n) => n,
            Err(_) => continue,
        };
        let bucket = netreg_engine::ip_allocator::ip_bucket(&network.uuid);
        match state.store.get(&bucket, &params.ip.to_string()).await {
            Ok(ip_rec) => {
                let record: IpRecord = serde_json::from_value(ip_rec.value)
                    .map_err(|e| ApiError(EngineError::InternalError(e.to_string())))?;
                hits.push(record);
            }
            Err(_) => continue,
        }
    }
    Ok(Json(hits).into_response())
}
