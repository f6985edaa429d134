// Domain errors
// Every failure a caller can act on maps to exactly one variant here.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CivicError {
    /// Missing or malformed input (mandatory fields, negative income, ...)
    #[error("{0}")]
    Validation(String),

    /// A referenced citizen/family/record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested service type is unknown
    #[error("Invalid service type: {0}")]
    InvalidServiceType(String),

    /// A previous issuance is still inside its validity window
    #[error("{message}")]
    Conflict {
        message: String,
        expires_at: DateTime<Utc>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CivicResult<T> = Result<T, CivicError>;

impl CivicError {
    pub fn validation(message: impl Into<String>) -> Self {
        CivicError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CivicError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable code, used in HTTP bodies and log fields
    pub fn code(&self) -> &'static str {
        match self {
            CivicError::Validation(_) => "validation",
            CivicError::NotFound { .. } => "not_found",
            CivicError::InvalidServiceType(_) => "invalid_service_type",
            CivicError::Conflict { .. } => "conflict",
            CivicError::Storage(_) => "storage",
            CivicError::Serialization(_) => "serialization",
        }
    }

    /// True for errors caused by the caller rather than the backend
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            CivicError::Storage(_) | CivicError::Serialization(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CivicError::not_found("Family", "abc");
        assert_eq!(err.to_string(), "Family not found: abc");
        assert_eq!(err.code(), "not_found");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_is_server_error() {
        let err: CivicError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.code(), "storage");
        assert!(!err.is_client_error());
    }
}
