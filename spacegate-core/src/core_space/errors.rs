//! Error types for the space subsystem

use thiserror::Error;

/// Result type for space operations
pub type SpaceResult<T> = Result<T, SpaceError>;

/// Errors surfaced by resolution, enumeration and organization management
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpaceError {
    /// Malformed selector or input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User, organization or tenant binding absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Space id mismatch, non-member access or privilege escalation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate membership, duplicate slug, last-owner removal
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store-layer failure or corrupt record
    #[error("Database error: {0}")]
    Database(String),

    /// Tenant provisioner failure
    #[error("External service error: {0}")]
    ExternalService(String),
}

impl SpaceError {
    /// Stable, lowercase name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SpaceError::BadRequest(_) => "bad_request",
            SpaceError::NotFound(_) => "not_found",
            SpaceError::Forbidden(_) => "forbidden",
            SpaceError::Conflict(_) => "conflict",
            SpaceError::Unavailable(_) => "unavailable",
            SpaceError::Database(_) => "database",
            SpaceError::ExternalService(_) => "external_service",
        }
    }

    /// Whether the error denies access rather than reporting a failure
    pub fn is_denial(&self) -> bool {
        matches!(self, SpaceError::Forbidden(_) | SpaceError::NotFound(_))
    }
}

impl From<rusqlite::Error> for SpaceError {
    fn from(e: rusqlite::Error) -> Self {
        SpaceError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for SpaceError {
    fn from(e: r2d2::Error) -> Self {
        SpaceError::Unavailable(e.to_string())
    }
}
