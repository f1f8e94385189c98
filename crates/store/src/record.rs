use chrono::{DateTime, Utc};
use netreg_model::Etag;
use serde_json::Value;

use crate::precondition::Precondition;

/// A bucket entry as the store sees it: an opaque JSON value plus its
/// version metadata. Typed access lives in `netreg-engine`, which knows how
/// to deserialize each bucket's value type.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub bucket: String,
    pub key: String,
    pub value: Value,
    pub etag: Etag,
    pub mtime: DateTime<Utc>,
}

/// One unit of a [`super::Store::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put {
        bucket: String,
        key: String,
        value: Value,
        precondition: Precondition,
    },
    Delete {
        bucket: String,
        key: String,
        precondition: Precondition,
    },
}

impl BatchOp {
    pub fn bucket(&self) -> &str {
        match self {
            BatchOp::Put { bucket, .. } => bucket,
            BatchOp::Delete { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } => key,
            BatchOp::Delete { key, .. } => key,
        }
    }
}
