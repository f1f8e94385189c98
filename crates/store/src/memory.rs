use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use netreg_model::Etag;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::filter::{Filter, FindOptions, Gap, SortOrder};
use crate::precondition::Precondition;
use crate::record::{BatchOp, StoredRecord};
use crate::{BatchResult, Store, StoreError};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct RecordKey {
    bucket: String,
    key: String,
}

/// The reference `Store` implementation: a single `RwLock`-guarded map,
/// exercising every other crate's tests since the real persistent store is
/// out of scope (spec.md §1). Grounded on the single-transaction-at-a-time
/// discipline of `carbide-api-db`'s `SafePgPool` — here realized as one
/// write lock guarding the whole map rather than one Postgres connection.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<RecordKey, StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(bucket: &str, key: &str) -> RecordKey {
        RecordKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredRecord, StoreError> {
        let records = self.records.read().await;
        records
            .get(&Self::key(bucket, key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<Etag, StoreError> {
        let mut records = self.records.write().await;
        let rk = Self::key(bucket, key);
        let current = records.get(&rk).map(|r| &r.etag);
        if !precondition.satisfied_by(current) {
            return Err(StoreError::Conflict {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let etag = Etag::generate();
        records.insert(
            rk,
            StoredRecord {
                bucket: bucket.to_string(),
                key: key.to_string(),
                value,
                etag: etag.clone(),
                mtime: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn delete(&self, bucket: &str, key: &str, precondition: Precondition) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let rk = Self::key(bucket, key);
        let current = records.get(&rk).map(|r| &r.etag);
        if !precondition.satisfied_by(current) {
            return Err(StoreError::Conflict {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        records.remove(&rk);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchResult>, StoreError> {
        let mut records = self.records.write().await;

        // Validate every precondition against the pre-batch state first, so
        // the batch either lands in full or not at all (spec.md §5: partial
        // batches are never issued).
        for op in &ops {
            let rk = Self::key(op.bucket(), op.key());
            let current = records.get(&rk).map(|r| &r.etag);
            let precondition = match op {
                BatchOp::Put { precondition, .. } => precondition,
                BatchOp::Delete { precondition, .. } => precondition,
            };
            if !precondition.satisfied_by(current) {
                warn!(bucket = op.bucket(), key = op.key(), "batch conflict");
                return Err(StoreError::Conflict {
                    bucket: op.bucket().to_string(),
                    key: op.key().to_string(),
                });
            }
        }

        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                BatchOp::Put { bucket, key, value, .. } => {
                    let etag = Etag::generate();
                    let rk = Self::key(&bucket, &key);
                    records.insert(
                        rk,
                        StoredRecord {
                            bucket,
                            key,
                            value,
                            etag: etag.clone(),
                            mtime: Utc::now(),
                        },
                    );
                    results.push(BatchResult::Put { etag });
                }
                BatchOp::Delete { bucket, key, .. } => {
                    records.remove(&Self::key(&bucket, &key));
                    results.push(BatchResult::Deleted);
                }
            }
        }
        debug!(count = results.len(), "batch committed");
        Ok(results)
    }

    async fn find(
        &self,
        bucket: &str,
        filter: Filter,
        opts: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.bucket == bucket)
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        if let Some(field) = &opts.sort_field {
            matched.sort_by(|a, b| {
                let av = a.value.get(field).map(|v| v.to_string()).unwrap_or_default();
                let bv = b.value.get(field).map(|v| v.to_string()).unwrap_or_default();
                av.cmp(&bv)
            });
            if opts.sort_order == SortOrder::Descending {
                matched.reverse();
            }
        }

        let start = opts.offset.min(matched.len());
        let end = match opts.limit {
            Some(limit) => (start + limit).min(matched.len()),
            None => matched.len(),
        };
        Ok(matched[start..end].to_vec())
    }

    async fn sql_gap_scan(
        &self,
        bucket: &str,
        addr_column: &str,
        lo: IpAddr,
        hi: IpAddr,
        max_gap: u32,
    ) -> Result<Option<Gap>, StoreError> {
        let records = self.records.read().await;
        let mut addrs: Vec<IpAddr> = records
            .values()
            .filter(|r| r.bucket == bucket)
            .filter_map(|r| r.value.get(addr_column).and_then(|v| v.as_str()))
            .filter_map(|s| IpAddr::from_str(s).ok())
            .filter(|a| {
                netreg_network::address::compare(lo, *a) != std::cmp::Ordering::Greater
                    && netreg_network::address::compare(*a, hi) != std::cmp::Ordering::Greater
            })
            .collect();
        addrs.sort_by(|a, b| netreg_network::address::compare(*a, *b));
        addrs.dedup();

        for pair in addrs.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let distance = netreg_network::address::diff(prev, next)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            if distance > 1 {
                let gap_start = netreg_network::address::plus(prev, 1)
                    .map_err(|e| StoreError::Internal(e.to_string()))?;
                let gap_length = ((distance - 1) as u32).min(max_gap);
                return Ok(Some(Gap { gap_start, gap_length }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = InMemoryStore::new();
        store
            .put("nics", "aa", json!({"mac": "aa"}), Precondition::CreateOnly)
            .await
            .unwrap();
        let rec = store.get("nics", "aa").await.unwrap();
        assert_eq!(rec.value["mac"], "aa");
    }

    #[tokio::test]
    async fn create_only_rejects_existing_key() {
        let store = InMemoryStore::new();
        store
            .put("nics", "aa", json!({}), Precondition::CreateOnly)
            .await
            .unwrap();
        let err = store
            .put("nics", "aa", json!({}), Precondition::CreateOnly)
            .await
            .unwrap_err();
        assert!(err.is_conflict_on("nics"));
    }

    #[tokio::test]
    async fn match_etag_rejects_stale_etag() {
        let store = InMemoryStore::new();
        let etag = store
            .put("nics", "aa", json!({}), Precondition::CreateOnly)
            .await
            .unwrap();
        store
            .put("nics", "aa", json!({"v": 1}), Precondition::MatchEtag(etag.clone()))
            .await
            .unwrap();
        let err = store
            .put("nics", "aa", json!({"v": 2}), Precondition::MatchEtag(etag))
            .await
            .unwrap_err();
        assert!(err.is_conflict_on("nics"));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store
            .put("ips", "10.0.0.5", json!({}), Precondition::CreateOnly)
            .await
            .unwrap();
        let ops = vec![
            BatchOp::Put {
                bucket: "nics".into(),
                key: "aa".into(),
                value: json!({}),
                precondition: Precondition::CreateOnly,
            },
            BatchOp::Put {
                bucket: "ips".into(),
                key: "10.0.0.5".into(),
                value: json!({}),
                precondition: Precondition::CreateOnly,
            },
        ];
        let err = store.batch(ops).await.unwrap_err();
        assert!(err.is_conflict_on("ips"));
        // The NIC write must not have landed either.
        assert!(store.get("nics", "aa").await.is_err());
    }

    #[tokio::test]
    async fn gap_scan_finds_first_absent_address_bounded_by_sentinels() {
        let store = InMemoryStore::new();
        for addr in ["10.0.2.4", "10.0.2.5", "10.0.2.251"] {
            store
                .put("ips", addr, json!({"ipaddr": addr}), Precondition::CreateOnly)
                .await
                .unwrap();
        }
        let gap = store
            .sql_gap_scan(
                "ips",
                "ipaddr",
                IpAddr::from_str("10.0.2.4").unwrap(),
                IpAddr::from_str("10.0.2.251").unwrap(),
                20,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gap.gap_start, IpAddr::from_str("10.0.2.6").unwrap());
        assert_eq!(gap.gap_length, 20.min((251 - 6) as u32));
    }
}
