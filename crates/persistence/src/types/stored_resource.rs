//! Stored resource types.
//!
//! This module defines the [`StoredResource`] type, which wraps a resource
//! document with persistence metadata such as version, dialect and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ResourceKind;
use crate::versioning::FhirDialect;

/// A resource document with persistence metadata.
///
/// - **Identity**: resource type and logical id
/// - **Versioning**: a positive version number, monotonic per id
/// - **Dialect**: the wire dialect the document was stored in
/// - **Timestamps**: last update and, for deletion markers, deletion time
///
/// # Examples
///
/// ```
/// use hcs_persistence::types::StoredResource;
/// use hcs_persistence::versioning::FhirDialect;
/// use serde_json::json;
///
/// let resource = StoredResource::new(
///     "Patient",
///     "123",
///     json!({
///         "resourceType": "Patient",
///         "id": "123",
///         "name": [{"family": "Smith"}]
///     }),
///     FhirDialect::R4,
/// );
///
/// assert_eq!(resource.url(), "Patient/123");
/// assert_eq!(resource.version_id(), 1);
/// assert_eq!(resource.etag(), "W/\"1\"");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    resource_type: String,
    id: String,
    version_id: u64,
    content: Value,
    fhir_version: FhirDialect,
    last_modified: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    method: Option<ResourceMethod>,
}

/// HTTP method that produced a resource version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceMethod {
    /// Created via POST.
    Post,
    /// Created or updated via PUT.
    Put,
    /// Deleted via DELETE.
    Delete,
}

impl ResourceMethod {
    /// Returns the stored text form of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMethod::Post => "POST",
            ResourceMethod::Put => "PUT",
            ResourceMethod::Delete => "DELETE",
        }
    }

    /// Parses the stored text form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POST" => Some(ResourceMethod::Post),
            "PUT" => Some(ResourceMethod::Put),
            "DELETE" => Some(ResourceMethod::Delete),
            _ => None,
        }
    }
}

impl StoredResource {
    /// Creates a first version of a resource stamped with the current time.
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        content: Value,
        fhir_version: FhirDialect,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: 1,
            content,
            fhir_version,
            last_modified: Utc::now(),
            deleted_at: None,
            method: Some(ResourceMethod::Post),
        }
    }

    /// Creates a stored resource from a database row.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version_id: u64,
        content: Value,
        fhir_version: FhirDialect,
        last_modified: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
        method: Option<ResourceMethod>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id,
            content,
            fhir_version,
            last_modified,
            deleted_at,
            method,
        }
    }

    /// Returns the resource type name.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the resource kind.
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::parse(&self.resource_type)
    }

    /// Returns the resource's logical ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version number.
    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    /// Returns the resource content as JSON.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Consumes self and returns the content.
    pub fn into_content(self) -> Value {
        self.content
    }

    /// Returns the dialect the content is expressed in.
    pub fn fhir_version(&self) -> FhirDialect {
        self.fhir_version
    }

    /// Returns when this version was written.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns when the resource was deleted, for deletion markers.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Returns `true` if this version is a deletion marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns the HTTP method that produced this version.
    pub fn method(&self) -> Option<ResourceMethod> {
        self.method
    }

    /// Returns the weak ETag for this version, e.g. `W/"3"`.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }

    /// Returns the relative URL for this resource (e.g., "Patient/123").
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Returns the versioned URL (e.g., "Patient/123/_history/1").
    pub fn versioned_url(&self) -> String {
        format!(
            "{}/{}/_history/{}",
            self.resource_type, self.id, self.version_id
        )
    }

    /// Checks if the given ETag names this version.
    pub fn matches_etag(&self, etag: &str) -> bool {
        crate::core::normalize_etag(etag) == self.version_id.to_string()
    }

    /// Returns the Meta element for this version.
    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            version_id: self.version_id.to_string(),
            last_updated: self.last_modified,
        }
    }
}

/// Meta element written into stored documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// The version ID.
    #[serde(rename = "versionId")]
    pub version_id: String,

    /// The last update timestamp.
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> StoredResource {
        StoredResource::new(
            "Patient",
            "p1",
            json!({"resourceType": "Patient", "id": "p1"}),
            FhirDialect::R4,
        )
    }

    #[test]
    fn test_new_resource_is_version_one() {
        let resource = patient();
        assert_eq!(resource.version_id(), 1);
        assert!(!resource.is_deleted());
        assert_eq!(resource.method(), Some(ResourceMethod::Post));
        assert_eq!(resource.kind(), ResourceKind::Patient);
    }

    #[test]
    fn test_urls() {
        let resource = patient();
        assert_eq!(resource.url(), "Patient/p1");
        assert_eq!(resource.versioned_url(), "Patient/p1/_history/1");
    }

    #[test]
    fn test_matches_etag_forms() {
        let resource = patient();
        assert!(resource.matches_etag("W/\"1\""));
        assert!(resource.matches_etag("\"1\""));
        assert!(resource.matches_etag("1"));
        assert!(!resource.matches_etag("W/\"2\""));
    }

    #[test]
    fn test_method_text_round_trip() {
        for method in [ResourceMethod::Post, ResourceMethod::Put, ResourceMethod::Delete] {
            assert_eq!(ResourceMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(ResourceMethod::parse("PATCH"), None);
    }

    #[test]
    fn test_meta_serializes_fhir_names() {
        let meta = patient().meta();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["versionId"], "1");
        assert!(json.get("lastUpdated").is_some());
    }
}
