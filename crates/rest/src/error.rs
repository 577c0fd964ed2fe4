//! REST API error types.
//!
//! [`RestError`] is the single error type returned by handlers. Storage and
//! versioning errors convert into it, and it renders as an HTTP status with
//! an OperationOutcome body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hcs_persistence::error::{
    BackendError, ConcurrencyError, ResourceError, SearchError, StorageError, TransactionError,
    ValidationError,
};
use hcs_persistence::versioning::{CompatibilityLevel, VersionError};
use thiserror::Error;
use tracing::{error, warn};

use crate::responses::operation_outcome::{Issue, IssueType, OperationOutcomeBuilder};

/// Result type for REST handlers.
pub type RestResult<T> = Result<T, RestError>;

/// Errors surfaced to REST clients.
#[derive(Debug, Error)]
pub enum RestError {
    /// Resource not found (404).
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The resource type.
        resource_type: String,
        /// The resource id.
        id: String,
    },

    /// The requested version is a deletion marker (410).
    #[error("Resource deleted: {resource_type}/{id}")]
    Gone {
        /// The resource type.
        resource_type: String,
        /// The resource id.
        id: String,
    },

    /// Version not found (404).
    #[error("Version not found: {resource_type}/{id}/_history/{version_id}")]
    VersionNotFound {
        /// The resource type.
        resource_type: String,
        /// The resource id.
        id: String,
        /// The requested version.
        version_id: u64,
    },

    /// Stale version or duplicate id (409).
    #[error("Version conflict for {resource_type}/{id}: {message}")]
    VersionConflict {
        /// The resource type.
        resource_type: String,
        /// The resource id.
        id: String,
        /// What conflicted.
        message: String,
    },

    /// A precondition header could not be satisfied (412).
    #[error("Precondition failed: {message}")]
    PreconditionFailed {
        /// Description.
        message: String,
    },

    /// Conditional criteria matched more than one resource (412).
    #[error("Multiple matches for conditional {operation}: {count} resources")]
    MultipleMatches {
        /// The conditional operation.
        operation: String,
        /// Number of matches.
        count: usize,
    },

    /// Malformed request (400).
    #[error("Bad request: {message}")]
    BadRequest {
        /// Description.
        message: String,
    },

    /// Invalid resource content (400), with per-element detail.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Summary.
        message: String,
        /// `(path, message)` pairs.
        details: Vec<(String, String)>,
    },

    /// No conversion exists between the dialects for this kind (400).
    #[error("{message}")]
    TransformationUnavailable {
        /// Description.
        message: String,
        /// Compatibility level of the failed pair.
        level: CompatibilityLevel,
    },

    /// Semantically invalid content that could not be indexed (422).
    #[error("Unprocessable entity: {message}")]
    UnprocessableEntity {
        /// Description.
        message: String,
    },

    /// Request body in an unsupported media type or version (415).
    #[error("Unsupported media type: {message}")]
    UnsupportedMediaType {
        /// Description.
        message: String,
    },

    /// None of the requested dialects is served (406).
    #[error("Not acceptable: {message}")]
    NotAcceptable {
        /// Description.
        message: String,
    },

    /// The request was cancelled before completing (408).
    #[error("Request cancelled during {operation}")]
    RequestCancelled {
        /// The interrupted operation.
        operation: String,
    },

    /// The store is temporarily out of capacity (503).
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Description.
        message: String,
    },

    /// Unexpected failure (500).
    #[error("Internal server error: {message}")]
    InternalError {
        /// Description.
        message: String,
    },
}

impl RestError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::NotFound { .. } | RestError::VersionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            RestError::Gone { .. } => StatusCode::GONE,
            RestError::VersionConflict { .. } => StatusCode::CONFLICT,
            RestError::PreconditionFailed { .. } | RestError::MultipleMatches { .. } => {
                StatusCode::PRECONDITION_FAILED
            }
            RestError::BadRequest { .. }
            | RestError::InvalidResource { .. }
            | RestError::TransformationUnavailable { .. } => StatusCode::BAD_REQUEST,
            RestError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RestError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RestError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            RestError::RequestCancelled { .. } => StatusCode::REQUEST_TIMEOUT,
            RestError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RestError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn issue_type(&self) -> IssueType {
        match self {
            RestError::NotFound { .. } | RestError::VersionNotFound { .. } => IssueType::NotFound,
            RestError::Gone { .. } => IssueType::Deleted,
            RestError::VersionConflict { .. } => IssueType::Conflict,
            RestError::PreconditionFailed { .. } => IssueType::Processing,
            RestError::MultipleMatches { .. } => IssueType::MultipleMatches,
            RestError::BadRequest { .. }
            | RestError::InvalidResource { .. }
            | RestError::UnprocessableEntity { .. } => IssueType::Invalid,
            RestError::TransformationUnavailable { .. }
            | RestError::UnsupportedMediaType { .. }
            | RestError::NotAcceptable { .. } => IssueType::NotSupported,
            RestError::RequestCancelled { .. } => IssueType::Timeout,
            RestError::ServiceUnavailable { .. } => IssueType::Transient,
            RestError::InternalError { .. } => IssueType::Exception,
        }
    }

    /// Builds the OperationOutcome body for this error.
    pub fn to_operation_outcome(&self) -> serde_json::Value {
        let mut builder = OperationOutcomeBuilder::new();
        match self {
            RestError::InvalidResource { message, details } if !details.is_empty() => {
                for (path, detail) in details {
                    builder = builder.add_issue(
                        Issue::error(IssueType::Invalid, detail.as_str()).with_expression(path),
                    );
                }
                if details.iter().all(|(_, detail)| detail != message) {
                    builder = builder.error(IssueType::Invalid, message.as_str());
                }
            }
            RestError::TransformationUnavailable { message, level } => {
                builder = builder.error(
                    self.issue_type(),
                    format!("{} (compatibility: {})", message, level.as_str()),
                );
            }
            _ => builder = builder.error(self.issue_type(), self.to_string()),
        }
        builder.build()
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(self.to_operation_outcome())).into_response()
    }
}

impl From<StorageError> for RestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Resource(e) => e.into(),
            StorageError::Concurrency(e) => e.into(),
            StorageError::Validation(e) => e.into(),
            StorageError::Search(e) => e.into(),
            StorageError::Indexing(e) => RestError::UnprocessableEntity {
                message: e.to_string(),
            },
            StorageError::Transaction(e) => e.into(),
            StorageError::Backend(e) => e.into(),
        }
    }
}

impl From<ResourceError> for RestError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotFound { resource_type, id } => {
                RestError::NotFound { resource_type, id }
            }
            ResourceError::AlreadyExists { resource_type, id } => RestError::VersionConflict {
                message: format!("Resource {}/{} already exists", resource_type, id),
                resource_type,
                id,
            },
            ResourceError::Gone {
                resource_type, id, ..
            } => RestError::Gone { resource_type, id },
            ResourceError::VersionNotFound {
                resource_type,
                id,
                version_id,
            } => RestError::VersionNotFound {
                resource_type,
                id,
                version_id,
            },
        }
    }
}

impl From<ConcurrencyError> for RestError {
    fn from(err: ConcurrencyError) -> Self {
        match err {
            ConcurrencyError::VersionConflict {
                resource_type,
                id,
                expected_version,
                actual_version,
            } => RestError::VersionConflict {
                resource_type,
                id,
                message: format!(
                    "Expected version {}, but found {}",
                    expected_version, actual_version
                ),
            },
            ConcurrencyError::InvalidPrecondition { .. } => RestError::PreconditionFailed {
                message: err.to_string(),
            },
        }
    }
}

impl From<ValidationError> for RestError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidResource { message, details } => RestError::InvalidResource {
                message,
                details: details.into_iter().map(|d| (d.path, d.message)).collect(),
            },
            ValidationError::InvalidSearchParameter { .. }
            | ValidationError::UnsupportedResourceType { .. }
            | ValidationError::MissingRequiredField { .. } => RestError::BadRequest {
                message: err.to_string(),
            },
        }
    }
}

impl From<SearchError> for RestError {
    fn from(err: SearchError) -> Self {
        RestError::BadRequest {
            message: err.to_string(),
        }
    }
}

impl From<TransactionError> for RestError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::MultipleMatches { operation, count } => {
                RestError::MultipleMatches { operation, count }
            }
            TransactionError::Cancelled { operation } => RestError::RequestCancelled { operation },
            TransactionError::RolledBack { .. } => RestError::InternalError {
                message: err.to_string(),
            },
        }
    }
}

impl From<BackendError> for RestError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PoolExhausted { .. } => RestError::ServiceUnavailable {
                message: err.to_string(),
            },
            BackendError::Internal { .. } | BackendError::SerializationError { .. } => {
                RestError::InternalError {
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<VersionError> for RestError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::NoAcceptableVersion { .. } => RestError::NotAcceptable {
                message: err.to_string(),
            },
            VersionError::TransformationUnavailable {
                ref compatibility, ..
            } => RestError::TransformationUnavailable {
                level: compatibility.level,
                message: err.to_string(),
            },
            VersionError::UnsupportedVersion { .. } | VersionError::InvalidDocument { .. } => {
                RestError::BadRequest {
                    message: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcs_persistence::versioning::FhirDialect;

    #[test]
    fn test_status_mapping() {
        let not_found: RestError = StorageError::Resource(ResourceError::NotFound {
            resource_type: "Patient".into(),
            id: "1".into(),
        })
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: RestError = StorageError::Concurrency(ConcurrencyError::VersionConflict {
            resource_type: "Patient".into(),
            id: "1".into(),
            expected_version: 1,
            actual_version: 2,
        })
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let ambiguous: RestError = StorageError::Transaction(TransactionError::MultipleMatches {
            operation: "delete".into(),
            count: 2,
        })
        .into();
        assert_eq!(ambiguous.status(), StatusCode::PRECONDITION_FAILED);

        let cancelled: RestError = StorageError::Transaction(TransactionError::Cancelled {
            operation: "create".into(),
        })
        .into();
        assert_eq!(cancelled.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_no_acceptable_version_is_406() {
        let err: RestError = VersionError::NoAcceptableVersion {
            requested: vec!["3.0".into()],
            supported: vec![FhirDialect::R4],
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_validation_details_become_issues() {
        let err: RestError = StorageError::Validation(ValidationError::invalid_at(
            "Patient.id",
            "id does not match the URL",
        ))
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let outcome = err.to_operation_outcome();
        let issues = outcome["issue"].as_array().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["expression"][0], "Patient.id");
        assert_eq!(issues[0]["code"], "invalid");
    }

    #[test]
    fn test_outcome_body() {
        let err = RestError::MultipleMatches {
            operation: "create".into(),
            count: 3,
        };
        let outcome = err.to_operation_outcome();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert_eq!(outcome["issue"][0]["severity"], "error");
        assert_eq!(outcome["issue"][0]["code"], "multiple-matches");
    }
}
