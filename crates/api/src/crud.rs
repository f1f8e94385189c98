//! Generic bucket-backed CRUD shared by the resources that don't need
//! bespoke engine logic (`nic_tags`, `network_pools`, `aggregations`,
//! fabric VLANs, VPCs): a record is just a JSON value keyed by its own
//! identity field, written through [`netreg_store::Store`] with the usual
//! `If-Match`/create-only preconditions.

use netreg_engine::EngineError;
use netreg_store::{Filter, FindOptions, Precondition, Store, StoredRecord};
use serde_json::Value;

use crate::error::ApiError;

pub async fn list(store: &dyn Store, bucket: &str) -> Result<Vec<StoredRecord>, ApiError> {
    Ok(store.find(bucket, Filter::new(), FindOptions::default()).await?)
}

pub async fn get(store: &dyn Store, bucket: &str, key: &str) -> Result<StoredRecord, ApiError> {
    Ok(store.get(bucket, key).await?)
}

pub async fn create(store: &dyn Store, bucket: &str, key: &str, value: Value) -> Result<StoredRecord, ApiError> {
    let etag = store.put(bucket, key, value.clone(), Precondition::CreateOnly).await?;
    Ok(StoredRecord { bucket: bucket.into(), key: key.into(), value, etag, mtime: chrono::Utc::now() })
}

/// Checks `if_match` against the record's current etag up front, so a
/// mismatch is reported as [`EngineError::PreconditionFailed`] with both
/// etags rather than surfacing as an opaque store conflict.
async fn checked_precondition(store: &dyn Store, bucket: &str, key: &str, if_match: Option<&str>) -> Result<Precondition, ApiError> {
    let current = store.get(bucket, key).await?;
    match if_match {
        Some(expected) if expected != current.etag.to_string() => {
            Err(ApiError(EngineError::PreconditionFailed {
                expected: expected.to_string(),
                incoming: current.etag.to_string(),
            }))
        }
        _ => Ok(Precondition::MatchEtag(current.etag)),
    }
}

pub async fn update(
    store: &dyn Store,
    bucket: &str,
    key: &str,
    if_match: Option<&str>,
    value: Value,
) -> Result<StoredRecord, ApiError> {
    let precondition = checked_precondition(store, bucket, key, if_match).await?;
    let etag = store.put(bucket, key, value.clone(), precondition).await?;
    Ok(StoredRecord { bucket: bucket.into(), key: key.into(), value, etag, mtime: chrono::Utc::now() })
}

pub async fn delete(store: &dyn Store, bucket: &str, key: &str, if_match: Option<&str>) -> Result<(), ApiError> {
    let precondition = checked_precondition(store, bucket, key, if_match).await?;
    store.delete(bucket, key, precondition).await?;
    Ok(())
}
