//! Instance history.
//!
//! History lists every version of a single resource, newest first, including
//! deletion markers. Pages resume below the last version returned so that a
//! concurrent write never shifts entries between pages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::StorageResult;
use crate::types::{
    Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, Page, ResourceMethod,
    StoredResource,
};

use super::versioned::VersionedStorage;

/// Parameters for a history request.
#[derive(Debug, Clone, Default)]
pub struct HistoryParams {
    /// Only versions written at or after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Page size. Backends clamp it to their own limits.
    pub count: Option<u32>,

    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
}

impl HistoryParams {
    /// Creates empty history parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters to versions at or after `since`.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the page size.
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Resumes from a cursor.
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// A single entry in a history page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The resource version. Deletion markers have `deleted_at` set.
    pub resource: StoredResource,

    /// The method that produced the version.
    pub method: ResourceMethod,
}

impl HistoryEntry {
    /// Builds an entry from a stored version, inferring the method when the
    /// row carries none.
    pub fn from_version(resource: StoredResource) -> Self {
        let method = resource.method().unwrap_or(if resource.is_deleted() {
            ResourceMethod::Delete
        } else if resource.version_id() == 1 {
            ResourceMethod::Post
        } else {
            ResourceMethod::Put
        });
        Self { resource, method }
    }

    /// Converts the entry to a history Bundle entry.
    pub fn to_bundle_entry(&self, base_url: &str) -> BundleEntry {
        let base = base_url.trim_end_matches('/');
        let resource = &self.resource;
        let (url, status) = match self.method {
            ResourceMethod::Post => (resource.resource_type().to_string(), "201 Created"),
            ResourceMethod::Put => (resource.url(), "200 OK"),
            ResourceMethod::Delete => (resource.url(), "204 No Content"),
        };

        BundleEntry {
            full_url: Some(format!("{}/{}", base, resource.url())),
            resource: (!resource.is_deleted()).then(|| resource.content().clone()),
            search: None,
            request: Some(BundleEntryRequest {
                method: self.method.as_str().to_string(),
                url,
            }),
            response: Some(BundleEntryResponse {
                status: status.to_string(),
                etag: Some(resource.etag()),
                last_modified: Some(resource.last_modified().to_rfc3339()),
            }),
        }
    }
}

/// A page of history entries.
pub type HistoryPage = Page<HistoryEntry>;

/// Builds a history Bundle from a page.
pub fn history_bundle(page: &HistoryPage, base_url: &str, self_link: &str) -> Bundle {
    let mut bundle = Bundle::history().with_link("self", self_link);
    if let Some(total) = page.page_info.total {
        bundle = bundle.with_total(total);
    }
    if let Some(cursor) = &page.page_info.next_cursor {
        bundle = bundle.with_link("next", with_cursor(self_link, cursor));
    }
    for entry in &page.items {
        bundle = bundle.with_entry(entry.to_bundle_entry(base_url));
    }
    bundle
}

/// Replaces or appends the `_cursor` query parameter of a link.
pub(crate) fn with_cursor(link: &str, cursor: &str) -> String {
    let (path, query) = link.split_once('?').unwrap_or((link, ""));
    let mut pairs: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("_cursor="))
        .collect();
    let cursor_pair = format!("_cursor={}", cursor);
    pairs.push(&cursor_pair);
    format!("{}?{}", path, pairs.join("&"))
}

/// History of a single resource instance.
#[async_trait]
pub trait InstanceHistoryProvider: VersionedStorage {
    /// Returns the versions of one resource, newest first.
    ///
    /// Fails with `ResourceError::NotFound` when the resource never existed.
    async fn history_instance(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        params: &HistoryParams,
    ) -> StorageResult<HistoryPage>;

    /// Counts the versions of one resource.
    async fn history_instance_count(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<u64>;
}
