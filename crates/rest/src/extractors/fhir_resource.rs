//! Resource body extractor.
//!
//! Parses a JSON request body and checks that it is an object naming a
//! supported resource type. Path/body agreement and id checks are left to
//! the store.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header,
    response::{IntoResponse, Response},
};
use hcs_persistence::types::ResourceKind;
use serde_json::Value;

use crate::error::RestError;

/// A resource document taken from the request body.
///
/// # Example
///
/// ```rust,ignore
/// use hcs_rest::extractors::FhirResource;
///
/// async fn create_handler(FhirResource(resource): FhirResource) {
///     println!("Resource type: {}", resource["resourceType"]);
/// }
/// ```
#[derive(Debug)]
pub struct FhirResource(pub Value);

impl FhirResource {
    /// Returns the resource type.
    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(|v| v.as_str())
    }

    /// Returns the resource id if present.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(|v| v.as_str())
    }

    /// Consumes the extractor and returns the document.
    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Reasons a body is rejected before reaching a handler.
#[derive(Debug)]
pub enum FhirResourceRejection {
    /// The body is not valid JSON.
    InvalidJson(String),
    /// The body is JSON but not an object.
    NotAnObject,
    /// The object has no `resourceType`.
    MissingResourceType,
    /// The content type is not JSON.
    UnsupportedMediaType(String),
    /// The resource type is unknown to the server.
    UnsupportedResourceType(String),
}

impl IntoResponse for FhirResourceRejection {
    fn into_response(self) -> Response {
        let error = match self {
            FhirResourceRejection::InvalidJson(msg) => RestError::BadRequest {
                message: format!("Invalid JSON: {}", msg),
            },
            FhirResourceRejection::NotAnObject => RestError::BadRequest {
                message: "Resource must be a JSON object".to_string(),
            },
            FhirResourceRejection::MissingResourceType => RestError::BadRequest {
                message: "Resource must contain resourceType".to_string(),
            },
            FhirResourceRejection::UnsupportedMediaType(ct) => RestError::UnsupportedMediaType {
                message: format!("Content-Type {} is not supported", ct),
            },
            FhirResourceRejection::UnsupportedResourceType(rt) => RestError::BadRequest {
                message: format!("Unsupported resource type: {}", rt),
            },
        };
        error.into_response()
    }
}

impl<S> FromRequest<S> for FhirResource
where
    S: Send + Sync,
{
    type Rejection = FhirResourceRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/fhir+json")
            .to_string();

        if !is_json_media_type(&content_type) {
            return Err(FhirResourceRejection::UnsupportedMediaType(content_type));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| FhirResourceRejection::InvalidJson(e.to_string()))?;

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| FhirResourceRejection::InvalidJson(e.to_string()))?;

        if !value.is_object() {
            return Err(FhirResourceRejection::NotAnObject);
        }

        let resource_type = value
            .get("resourceType")
            .and_then(|v| v.as_str())
            .ok_or(FhirResourceRejection::MissingResourceType)?;

        if !ResourceKind::parse(resource_type).is_supported() {
            return Err(FhirResourceRejection::UnsupportedResourceType(
                resource_type.to_string(),
            ));
        }

        Ok(FhirResource(value))
    }
}

/// Returns true for `application/json` and `application/fhir+json`,
/// with or without parameters.
fn is_json_media_type(content_type: &str) -> bool {
    match content_type.parse::<mime::Mime>() {
        Ok(mime) => {
            mime.type_() == mime::APPLICATION
                && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON))
        }
        Err(_) => false,
    }
}
