//! Versioned storage trait.
//!
//! This module extends [`ResourceStorage`] with version-aware operations:
//! version reads (vread) and optimistic locking driven by `If-Match` ETags.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{ConcurrencyError, StorageError, StorageResult};
use crate::types::StoredResource;

use super::storage::ResourceStorage;

/// Storage trait with version-aware operations.
///
/// # Optimistic Locking
///
/// `update_with_match` implements HTTP If-Match semantics. The compare against
/// the stored version happens inside the write transaction; a mismatch aborts
/// with `VersionConflict` and holds no lock across requests.
#[async_trait]
pub trait VersionedStorage: ResourceStorage {
    /// Reads a specific version of a resource (vread).
    ///
    /// Deletion markers are returned with [`StoredResource::is_deleted`] set.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(VersionNotFound)` - If the version does not exist
    async fn vread(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<StoredResource>;

    /// Updates a resource only if `etag` names its current version.
    ///
    /// Accepts `W/"3"`, `"3"` or `3`.
    async fn update_with_match(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        etag: &str,
        resource: Value,
    ) -> StorageResult<StoredResource> {
        let expected = parse_etag_version(resource_type, id, etag)?;
        self.update(ctx, resource_type, id, resource, Some(expected))
            .await
    }

    /// Returns the current version of a live resource without its content.
    async fn current_version(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<u64>> {
        Ok(self
            .read(ctx, resource_type, id)
            .await?
            .map(|r| r.version_id()))
    }
}

/// Information about a version conflict.
#[derive(Debug, Clone)]
pub struct VersionConflictInfo {
    /// The resource type.
    pub resource_type: String,
    /// The resource ID.
    pub id: String,
    /// The version that was expected.
    pub expected_version: u64,
    /// The actual current version.
    pub actual_version: u64,
}

impl VersionConflictInfo {
    /// Creates a new version conflict info.
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        expected_version: u64,
        actual_version: u64,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            expected_version,
            actual_version,
        }
    }

    /// Converts this info into a storage error.
    pub fn into_error(self) -> StorageError {
        StorageError::Concurrency(ConcurrencyError::VersionConflict {
            resource_type: self.resource_type,
            id: self.id,
            expected_version: self.expected_version,
            actual_version: self.actual_version,
        })
    }
}

/// Returns `Ok(())` if versions match, or a `VersionConflict` if they don't.
pub fn check_version_match(
    resource_type: &str,
    id: &str,
    expected: u64,
    actual: u64,
) -> StorageResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(VersionConflictInfo::new(resource_type, id, expected, actual).into_error())
    }
}

/// Strips the weak marker and quotes from an ETag.
///
/// ETags may be formatted as `W/"1"`, `"1"`, or just `1`.
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim()
        .trim_start_matches("W/")
        .trim_start_matches('"')
        .trim_end_matches('"')
}

/// Parses an ETag into a version number.
pub fn parse_etag_version(resource_type: &str, id: &str, etag: &str) -> StorageResult<u64> {
    normalize_etag(etag).parse::<u64>().map_err(|_| {
        ConcurrencyError::InvalidPrecondition {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            etag: etag.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_info() {
        let info = VersionConflictInfo::new("Patient", "123", 1, 2);
        let err = info.into_error();
        assert!(matches!(
            err,
            StorageError::Concurrency(ConcurrencyError::VersionConflict {
                expected_version: 1,
                actual_version: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_check_version_match() {
        assert!(check_version_match("Patient", "123", 1, 1).is_ok());
        assert!(check_version_match("Patient", "123", 1, 2).is_err());
    }

    #[test]
    fn test_normalize_etag() {
        assert_eq!(normalize_etag("W/\"1\""), "1");
        assert_eq!(normalize_etag("\"1\""), "1");
        assert_eq!(normalize_etag("1"), "1");
        assert_eq!(normalize_etag(" W/\"42\" "), "42");
    }

    #[test]
    fn test_parse_etag_version() {
        assert_eq!(parse_etag_version("Patient", "1", "W/\"7\"").unwrap(), 7);

        let err = parse_etag_version("Patient", "1", "W/\"abc\"").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Concurrency(ConcurrencyError::InvalidPrecondition { .. })
        ));
    }
}
