//! The store adapter (C2): versioned get/put/batch, indexed find, and the
//! SQL-style gap scan the IP allocator depends on. This crate owns the
//! *contract* (the [`Store`] trait) plus an in-memory reference
//! implementation; spec.md §1 places the real persistent store out of
//! scope, so `InMemoryStore` is what every other crate's tests run against.
//!
//! Grounded on `carbide-api-db`'s `safe_pg_pool.rs` (single-transaction
//! discipline per call) and `network_prefix.rs` (`DatabaseError::query`
//! idiom, typed column filters) — adapted to a bucket/key abstraction
//! instead of a fixed Postgres schema.

pub mod error;
pub mod filter;
pub mod memory;
pub mod precondition;
pub mod record;

pub use error::StoreError;
pub use filter::{Filter, FindOptions, Gap, SortOrder};
pub use precondition::Precondition;
pub use record::{BatchOp, StoredRecord};

use std::net::IpAddr;

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of one op within a [`Store::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchResult {
    Put { etag: netreg_model::Etag },
    Deleted,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredRecord, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<netreg_model::Etag, StoreError>;

    async fn delete(&self, bucket: &str, key: &str, precondition: Precondition) -> Result<(), StoreError>;

    /// Apply every op atomically. On a precondition violation, no op in the
    /// batch is applied and the error names the first bucket/key that
    /// failed.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchResult>, StoreError>;

    async fn find(
        &self,
        bucket: &str,
        filter: Filter,
        opts: FindOptions,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// The first gap in `(lo, hi)`: an address absent from the bucket whose
    /// predecessor is present, bounded by `max_gap`.
    async fn sql_gap_scan(
        &self,
        bucket: &str,
        addr_column: &str,
        lo: IpAddr,
        hi: IpAddr,
        max_gap: u32,
    ) -> Result<Option<Gap>, StoreError>;
}
