//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates resource state errors, concurrency
//! errors, search errors, indexing errors and transaction errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::search::ExtractionError;

/// The primary error type for all storage operations.
///
/// This enum encompasses all possible errors that can occur during persistence
/// operations, organized by category.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Concurrency and versioning errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Search operation errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Search index derivation errors; the triggering write is rolled back
    #[error("indexing failed: {0}")]
    Indexing(#[from] ExtractionError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested resource was not found.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// A live resource with the given ID already exists.
    #[error("resource already exists: {resource_type}/{id}")]
    AlreadyExists { resource_type: String, id: String },

    /// The requested version is a deletion marker.
    #[error("resource deleted: {resource_type}/{id}")]
    Gone {
        resource_type: String,
        id: String,
        deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// The requested version of the resource was not found.
    #[error("version not found: {resource_type}/{id}/_history/{version_id}")]
    VersionNotFound {
        resource_type: String,
        id: String,
        version_id: u64,
    },
}

/// Errors related to concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The stored version did not match the caller's expected version.
    #[error("version conflict: expected {expected_version}, found {actual_version}")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected_version: u64,
        actual_version: u64,
    },

    /// An `If-Match` value could not be interpreted as a version.
    #[error("invalid version precondition for {resource_type}/{id}: {etag}")]
    InvalidPrecondition {
        resource_type: String,
        id: String,
        etag: String,
    },
}

/// Errors related to resource validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The resource failed validation.
    #[error("invalid resource: {message}")]
    InvalidResource {
        message: String,
        details: Vec<ValidationDetail>,
    },

    /// The search parameter is invalid.
    #[error("invalid search parameter: {parameter}: {message}")]
    InvalidSearchParameter { parameter: String, message: String },

    /// The resource type is not one of the supported kinds.
    #[error("unsupported resource type: {resource_type}")]
    UnsupportedResourceType { resource_type: String },

    /// Missing required field.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },
}

impl ValidationError {
    /// Builds an [`ValidationError::InvalidResource`] with a single detail entry.
    pub fn invalid_at(path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ValidationError::InvalidResource {
            message: message.clone(),
            details: vec![ValidationDetail {
                path: path.into(),
                message,
            }],
        }
    }
}

/// Detailed validation error information.
#[derive(Debug, Clone)]
pub struct ValidationDetail {
    /// The path to the offending element.
    pub path: String,
    /// A human-readable error message.
    pub message: String,
}

/// Errors related to search operations.
///
/// Only unparseable input fails a search; bounded expansion is reported
/// through the search result instead.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The modifier is not supported for this parameter type.
    #[error("unsupported modifier '{modifier}' for parameter type {param_type}")]
    UnsupportedModifier {
        modifier: String,
        param_type: String,
    },

    /// The pagination cursor is invalid or expired.
    #[error("invalid cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Failed to parse the search query.
    #[error("failed to parse search query: {message}")]
    QueryParseError { message: String },

    /// Invalid composite parameter value.
    #[error("invalid composite parameter {parameter}: {message}")]
    InvalidComposite { parameter: String, message: String },
}

/// Errors related to transactions and conditional operations.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// The caller cancelled the operation before it committed.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// A conditional operation matched more than one resource.
    #[error("conditional {operation} matched {count} resources, expected at most 1")]
    MultipleMatches { operation: String, count: usize },
}

/// Errors originating in the database driver or connection pool.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No connection could be checked out of the pool.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization or deserialization of stored content failed.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}
