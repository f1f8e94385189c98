//! The store's error kind, adapted from `carbide-api-db`'s `DatabaseError`
//! (`DatabaseError::query(sql, e)`/`DatabaseError::acquire` idiom) — one
//! small enum naming every way a bucket operation can fail.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no record at {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// A precondition was violated. Carries the bucket name so callers
    /// (principally C3/C4/C5's retry loops) can tell whether the conflict
    /// is "theirs" to retry.
    #[error("precondition failed writing {bucket}/{key}")]
    Conflict { bucket: String, key: String },

    #[error("store operation failed: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_conflict_on(&self, bucket: &str) -> bool {
        matches!(self, StoreError::Conflict { bucket: b, .. } if b == bucket)
    }
}
