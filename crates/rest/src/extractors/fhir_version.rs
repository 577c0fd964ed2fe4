//! Dialect extractor.
//!
//! Reads the `fhirVersion` media-type parameter from `Content-Type` (the
//! dialect of a request body) and the weighted preference list from
//! `Accept` (the dialects the client will take back).

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use hcs_persistence::versioning::{FhirDialect, VersionPreference, parse_accept_preferences};

use crate::error::RestError;

/// Dialect information from request headers.
///
/// A `Content-Type` naming an unknown version is rejected with 415. Unknown
/// versions in `Accept` are kept; the negotiator decides whether anything
/// acceptable remains.
#[derive(Debug, Clone, Default)]
pub struct FhirVersionExtractor {
    content_version: Option<FhirDialect>,
    accept: Vec<VersionPreference>,
}

impl FhirVersionExtractor {
    /// Builds the extractor from headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, RestError> {
        let content_version = match content_type_fhir_version(headers) {
            Some(raw) => Some(FhirDialect::parse(&raw).ok_or_else(|| {
                RestError::UnsupportedMediaType {
                    message: format!("fhirVersion {} is not supported", raw),
                }
            })?),
            None => None,
        };

        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(parse_accept_preferences)
            .unwrap_or_default();

        Ok(Self {
            content_version,
            accept,
        })
    }

    /// Returns the dialect declared on the request body, if any.
    pub fn content_version(&self) -> Option<FhirDialect> {
        self.content_version
    }

    /// Returns the client's dialect preferences, best first.
    pub fn accept_preferences(&self) -> &[VersionPreference] {
        &self.accept
    }
}

impl<S> FromRequestParts<S> for FhirVersionExtractor
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Returns the raw `fhirVersion` parameter of `Content-Type`.
fn content_type_fhir_version(headers: &HeaderMap) -> Option<String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())?;
    let mime: mime::Mime = content_type.parse().ok()?;

    mime.params()
        .find(|(name, _)| name.as_str().eq_ignore_ascii_case("fhirversion"))
        .map(|(_, value)| value.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: Option<&str>, accept: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, ct.parse().unwrap());
        }
        if let Some(acc) = accept {
            headers.insert(header::ACCEPT, acc.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_content_type_version() {
        let extracted = FhirVersionExtractor::from_headers(&headers(
            Some("application/fhir+json; fhirVersion=5.0"),
            None,
        ))
        .unwrap();
        assert_eq!(extracted.content_version(), Some(FhirDialect::R5));
        assert!(extracted.accept_preferences().is_empty());
    }

    #[test]
    fn test_unknown_content_version_is_rejected() {
        let err = FhirVersionExtractor::from_headers(&headers(
            Some("application/fhir+json; fhirVersion=3.0"),
            None,
        ))
        .unwrap_err();
        assert!(matches!(err, RestError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_accept_preferences_by_weight() {
        let extracted = FhirVersionExtractor::from_headers(&headers(
            None,
            Some("application/fhir+json; fhirVersion=4.0; q=0.4, application/fhir+json; fhirVersion=6.0"),
        ))
        .unwrap();
        let versions: Vec<&str> = extracted
            .accept_preferences()
            .iter()
            .map(|p| p.version.as_str())
            .collect();
        assert_eq!(versions, vec!["6.0", "4.0"]);
    }

    #[test]
    fn test_no_version_parameters() {
        let extracted = FhirVersionExtractor::from_headers(&headers(
            Some("application/fhir+json"),
            Some("application/fhir+json"),
        ))
        .unwrap();
        assert_eq!(extracted.content_version(), None);
        assert!(extracted.accept_preferences().is_empty());
    }
}
