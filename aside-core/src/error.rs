//! Error types for ASIDE operations

use thiserror::Error;

/// Cache store errors.
///
/// These are soft by policy: the accessor absorbs them at the lowest
/// possible point, surfaces them only as log warnings, and falls back to
/// the repository. Callers of the accessor never observe this type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache read failed for key {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Cache write failed for key {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Cache delete failed for key {key}: {reason}")]
    DeleteFailed { key: String, reason: String },
}

/// Repository errors.
///
/// The repository is authoritative, so these are hard errors: they cross
/// the accessor boundary verbatim. Absence of an entity is NOT an error;
/// it is represented as `Option::None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Repository query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Persist failed: {reason}")]
    PersistFailed { reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Repository unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}
