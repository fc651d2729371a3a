use service_core::error::AppError;
use thiserror::Error;

use crate::models::{CodeRejection, Role};
use crate::services::policy::Capability;

/// Failures of the document store or the local key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Local storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transaction on {collection}/{id} gave up after {attempts} conflicting attempts")]
    Contention {
        collection: &'static str,
        id: String,
        attempts: u32,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Errors surfaced by the access-control and registration operations.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Invalid invite code")]
    InvalidCode,

    #[error("Invite code has expired")]
    CodeExpired,

    #[error("Invite code has already been used")]
    CodeAlreadyUsed,

    #[error("Invite code has no remaining uses")]
    CodeExhausted,

    #[error("Invite code not found")]
    CodeNotFound,

    #[error("Cannot change role from {current} to {target}: upgrades must raise the role")]
    IllegalDowngrade { current: Role, target: Role },

    #[error("Session is bound to a different device")]
    DeviceMismatch,

    #[error("Permission denied: requires {0}")]
    PermissionDenied(Capability),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Event not found")]
    EventNotFound,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AccessError {
    /// Store failures may succeed on a later attempt; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::Store(_))
    }
}

impl From<CodeRejection> for AccessError {
    fn from(rejection: CodeRejection) -> Self {
        match rejection {
            CodeRejection::AlreadyUsed => AccessError::CodeAlreadyUsed,
            CodeRejection::Exhausted => AccessError::CodeExhausted,
            CodeRejection::Expired => AccessError::CodeExpired,
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::InvalidCode
            | AccessError::CodeExpired
            | AccessError::CodeAlreadyUsed
            | AccessError::CodeExhausted
            | AccessError::IllegalDowngrade { .. }
            | AccessError::InvalidInput(_) => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            AccessError::CodeNotFound | AccessError::EventNotFound => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            AccessError::DeviceMismatch | AccessError::NotAuthenticated => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            AccessError::PermissionDenied(_) => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            AccessError::Validation(e) => AppError::ValidationError(e),
            AccessError::Store(StoreError::Contention { .. }) => {
                AppError::ServiceUnavailable(anyhow::anyhow!(err.to_string()))
            }
            AccessError::Store(StoreError::Redis(e)) => AppError::RedisError(e),
            AccessError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
