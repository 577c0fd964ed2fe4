//! Axum extractors for request data.
//!
//! - [`RequestContextExtractor`] - Request id and cancellation token
//! - [`FhirVersionExtractor`] - Body dialect and `Accept` preferences
//! - [`FhirResource`] - Parsed resource body
//! - [`ConditionalHeaders`] - `If-Match`, `If-None-Match`, `If-None-Exist`

mod conditional;
mod context;
mod fhir_resource;
mod fhir_version;

pub use conditional::ConditionalHeaders;
pub use context::{REQUEST_ID_HEADER, RequestContextExtractor};
pub use fhir_resource::{FhirResource, FhirResourceRejection};
pub use fhir_version::FhirVersionExtractor;
