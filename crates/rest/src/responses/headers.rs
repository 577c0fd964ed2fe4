//! Response header generation.

use axum::http::{HeaderMap, HeaderValue, header};
use hcs_persistence::types::StoredResource;
use hcs_persistence::versioning::FhirDialect;

/// Builder for resource response headers.
///
/// Generates:
/// - `ETag` (weak, from the version id)
/// - `Last-Modified`
/// - `Location` (for created resources)
/// - `Content-Type` with the `fhirVersion` of the body
/// - one `Warning` per conversion note
#[derive(Debug, Default)]
pub struct ResourceHeaders {
    etag: Option<String>,
    last_modified: Option<String>,
    location: Option<String>,
    dialect: Option<FhirDialect>,
    warnings: Vec<String>,
}

impl ResourceHeaders {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates headers for a stored resource rendered in `dialect`.
    pub fn from_stored(stored: &StoredResource, dialect: FhirDialect) -> Self {
        Self {
            etag: Some(stored.etag()),
            last_modified: Some(
                stored
                    .last_modified()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            ),
            dialect: Some(dialect),
            ..Self::default()
        }
    }

    /// Sets the Location URL.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the body dialect.
    pub fn with_dialect(mut self, dialect: FhirDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Adds conversion notes.
    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Converts to a header map.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&content_type(self.dialect)) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        if let Some(etag) = &self.etag {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(header::ETAG, value);
            }
        }

        if let Some(last_modified) = &self.last_modified {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }

        if let Some(location) = &self.location {
            if let Ok(value) = HeaderValue::from_str(location) {
                headers.insert(header::LOCATION, value);
            }
        }

        for warning in &self.warnings {
            if let Ok(value) = HeaderValue::from_str(&warning_value(warning)) {
                headers.append(header::WARNING, value);
            }
        }

        headers
    }

    /// Returns the ETag value.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Returns the Location value.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

/// Returns the JSON content type, tagged with a dialect when known.
pub fn content_type(dialect: Option<FhirDialect>) -> String {
    match dialect {
        Some(dialect) => format!(
            "application/fhir+json; fhirVersion={}",
            dialect.as_mime_param()
        ),
        None => "application/fhir+json".to_string(),
    }
}

/// Formats a `Warning` header value (code 299, miscellaneous persistent).
fn warning_value(text: &str) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '"' => '\'',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect();
    format!("299 hcs \"{}\"", sanitized)
}
