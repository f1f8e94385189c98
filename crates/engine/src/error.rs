//! `EngineError` — the tagged-variant error kind spec.md §7/§9 calls for,
//! adapted from the teacher's per-crate `thiserror` enums (`DatabaseError`,
//! `PrefixError`, ...) into one shared kind since every C3-C8 component
//! ultimately answers to the same API boundary (C9).

use netreg_store::StoreError;

#[derive(Debug, Clone)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UsedBy {
    pub resource: String,
    pub uuid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid parameters: {0:?}")]
    InvalidParameters(Vec<FieldError>),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("resource in use")]
    InUse(Vec<UsedBy>),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("precondition failed")]
    PreconditionFailed { expected: String, incoming: String },

    #[error("subnet full")]
    SubnetFull,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("internal error: {0}")]
    InternalError(String),
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::InvalidParameters(vec![FieldError {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }])
    }
}

/// Store conflicts are handled by each retry loop; any conflict that
/// survives to the API boundary (budget exhausted on a bucket the caller
/// didn't know about) becomes an internal error, matching spec.md §7's
/// "everything else is surfaced" rule.
impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { bucket, key } => {
                EngineError::ResourceNotFound(format!("{bucket}/{key}"))
            }
            StoreError::Conflict { bucket, key } => {
                EngineError::InternalError(format!("unresolved conflict on {bucket}/{key}"))
            }
            StoreError::Internal(msg) => EngineError::InternalError(msg),
        }
    }
}
