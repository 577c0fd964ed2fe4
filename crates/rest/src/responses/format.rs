//! JSON response bodies.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{RestError, RestResult};
use crate::responses::headers::content_type;

/// Serializes `content` as the body of a response with `headers`.
///
/// `headers` keep their own `Content-Type` when they carry one; otherwise
/// the untagged FHIR JSON type is used.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    mut headers: HeaderMap,
    content: &T,
) -> RestResult<Response> {
    let body = serde_json::to_vec(content).map_err(|e| RestError::InternalError {
        message: format!("Failed to serialize response: {}", e),
    })?;

    if !headers.contains_key(header::CONTENT_TYPE) {
        if let Ok(value) = HeaderValue::from_str(&content_type(None)) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }

    Ok((status, headers, Body::from(body)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keeps_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json; fhirVersion=6.0.0"),
        );
        let response = json_response(StatusCode::OK, headers, &json!({"a": 1})).unwrap();

        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/fhir+json; fhirVersion=6.0.0"
        );
    }

    #[test]
    fn test_defaults_content_type() {
        let response =
            json_response(StatusCode::CREATED, HeaderMap::new(), &json!({"a": 1})).unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/fhir+json"
        );
    }
}
