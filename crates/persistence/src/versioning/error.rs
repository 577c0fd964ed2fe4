//! Errors raised by version negotiation and transformation.
//!
//! Data loss during a successful transformation is never an error; it is
//! reported on the [`TransformationResult`](super::TransformationResult).

#![allow(missing_docs)]

use thiserror::Error;

use super::compatibility::VersionCompatibility;
use super::dialect::FhirDialect;

/// Errors from the versioning module.
#[derive(Error, Debug, Clone)]
pub enum VersionError {
    /// The version string names no supported dialect.
    #[error("unsupported FHIR version: {version}")]
    UnsupportedVersion { version: String },

    /// None of the client's requested versions is served.
    #[error("none of the requested FHIR versions ({}) is supported", requested.join(", "))]
    NoAcceptableVersion {
        requested: Vec<String>,
        supported: Vec<FhirDialect>,
    },

    /// No conversion path exists for this kind between the two dialects.
    #[error("cannot transform {resource_type} from {source_dialect} to {target_dialect}")]
    TransformationUnavailable {
        resource_type: String,
        source_dialect: FhirDialect,
        target_dialect: FhirDialect,
        compatibility: Box<VersionCompatibility>,
    },

    /// The document is not a JSON object.
    #[error("cannot transform {resource_type}: document is not a JSON object")]
    InvalidDocument { resource_type: String },
}
