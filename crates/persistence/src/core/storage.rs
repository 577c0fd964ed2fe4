//! Core resource storage trait.
//!
//! This module defines the [`ResourceStorage`] trait, which provides the
//! fundamental versioned CRUD operations, and [`ConditionalStorage`] for
//! operations driven by search criteria. Every operation takes a
//! [`RequestContext`] as its first parameter.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::StorageResult;
use crate::types::StoredResource;
use crate::versioning::FhirDialect;

/// Core storage trait for resources.
///
/// # Versioning
///
/// Every successful write produces a new version whose number is exactly one
/// more than the previous version. Version numbers are never reused, even
/// across delete and re-create.
///
/// # Soft Deletes
///
/// `delete` writes a deletion marker version. The body is retained for audit,
/// the resource disappears from `read` and search, and history keeps every
/// prior version.
///
/// # Index consistency
///
/// Implementations replace the search index rows of a resource in the same
/// transaction as the document write, so readers never observe a document
/// without its index.
///
/// # Example
///
/// ```ignore
/// use hcs_persistence::context::RequestContext;
/// use hcs_persistence::core::ResourceStorage;
///
/// async fn example<S: ResourceStorage>(storage: &S) -> Result<(), StorageError> {
///     let ctx = RequestContext::new();
///
///     let patient = serde_json::json!({
///         "resourceType": "Patient",
///         "name": [{"family": "Doe"}]
///     });
///     let stored = storage.create(&ctx, "Patient", patient).await?;
///
///     let mut body = stored.content().clone();
///     body["gender"] = serde_json::json!("female");
///     let updated = storage
///         .update(&ctx, "Patient", stored.id(), body, Some(1))
///         .await?;
///     assert_eq!(updated.version_id(), 2);
///
///     storage.delete(&ctx, "Patient", stored.id()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Returns the dialect documents are stored in.
    fn storage_dialect(&self) -> FhirDialect;

    /// Creates a new resource at version 1.
    ///
    /// The id in the body, if any, is the client-assigned id; otherwise the
    /// store generates one.
    ///
    /// # Errors
    ///
    /// * `StorageError::Validation` - If the body is not a resource of `resource_type`
    /// * `StorageError::Resource(AlreadyExists)` - If the id names a live resource
    /// * `StorageError::Indexing` - If search rows cannot be derived from the body
    async fn create(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
    ) -> StorageResult<StoredResource>;

    /// Creates or updates a resource with a specific id (PUT semantics).
    ///
    /// Returns the stored resource and whether it was newly created.
    async fn create_or_update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        resource: Value,
    ) -> StorageResult<(StoredResource, bool)>;

    /// Reads the current version of a live resource.
    ///
    /// Returns `None` when the resource does not exist or is deleted.
    async fn read(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<StoredResource>>;

    /// Updates a live resource, optionally checking the expected version.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the resource is missing or deleted
    /// * `StorageError::Concurrency(VersionConflict)` - If `expected_version` is stale
    async fn update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        resource: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<StoredResource>;

    /// Soft-deletes a resource and returns the new version number.
    ///
    /// Deleting an already-deleted resource succeeds and still writes a new
    /// version.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the resource never existed
    async fn delete(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<u64>;

    /// Checks if a live resource exists.
    async fn exists(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<bool> {
        Ok(self.read(ctx, resource_type, id).await?.is_some())
    }

    /// Reads several live resources of one type, skipping missing ids.
    async fn read_batch(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        ids: &[&str],
    ) -> StorageResult<Vec<StoredResource>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(resource) = self.read(ctx, resource_type, id).await? {
                results.push(resource);
            }
        }
        Ok(results)
    }

    /// Counts live resources, optionally of a single type.
    async fn count(&self, ctx: &RequestContext, resource_type: Option<&str>)
    -> StorageResult<u64>;
}

/// Result of a conditional create operation.
#[derive(Debug, Clone)]
pub enum ConditionalCreateResult {
    /// No resource matched, so one was created.
    Created(StoredResource),
    /// Exactly one resource matched and the body was written over it.
    Updated(StoredResource),
}

/// Result of a conditional update operation.
#[derive(Debug, Clone)]
pub enum ConditionalUpdateResult {
    /// Exactly one resource matched and was updated.
    Updated(StoredResource),
    /// No resource matched, so one was created.
    Created(StoredResource),
}

/// Result of a conditional delete operation.
#[derive(Debug, Clone)]
pub enum ConditionalDeleteResult {
    /// The single matching resource was deleted at this version.
    Deleted(u64),
    /// Nothing matched.
    NoMatch,
}

/// Operations whose target is chosen by search criteria.
///
/// `search_params` is a raw query string such as `identifier=http://x|123`.
/// More than one match fails with `TransactionError::MultipleMatches`.
#[async_trait]
pub trait ConditionalStorage: ResourceStorage {
    /// Creates the resource when nothing matches the criteria; with exactly
    /// one match the body becomes that resource's next version.
    async fn conditional_create(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalCreateResult>;

    /// Updates the single matching resource, or creates one when none match.
    async fn conditional_update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalUpdateResult>;

    /// Deletes the single matching resource.
    async fn conditional_delete(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        search_params: &str,
    ) -> StorageResult<ConditionalDeleteResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conditional_create_result_debug() {
        let resource = StoredResource::new("Patient", "1", json!({}), FhirDialect::R4);
        let result = ConditionalCreateResult::Updated(resource);
        assert!(format!("{:?}", result).contains("Updated"));
    }

    #[test]
    fn test_conditional_delete_result_variants() {
        assert!(matches!(
            ConditionalDeleteResult::Deleted(3),
            ConditionalDeleteResult::Deleted(3)
        ));
        assert!(matches!(
            ConditionalDeleteResult::NoMatch,
            ConditionalDeleteResult::NoMatch
        ));
    }
}
