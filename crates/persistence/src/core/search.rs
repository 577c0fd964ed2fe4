//! Search provider traits.
//!
//! - [`SearchProvider`] - Single-type search with chains, `_has`, sorting and paging
//! - [`IncludeProvider`] - `_include` / `_revinclude` expansion
//!
//! Bounded expansion never fails a search. When a chain is too deep or an
//! include graph hits its caps, the result is flagged `truncated` and carries a
//! [`SearchWarning`] describing what was cut.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::RequestContext;
use crate::error::StorageResult;
use crate::types::{
    Bundle, BundleEntry, IncludeDirective, Page, PageCursor, SearchQuery, StoredResource,
};

use super::history::with_cursor;
use super::storage::ResourceStorage;

/// Something the planner could not fully honour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchWarning {
    /// A query parameter was not recognised and was not applied.
    IgnoredParameter { name: String },
    /// A chain or `_has` went deeper than the configured bound.
    ChainDepthExceeded { parameter: String, max_depth: usize },
    /// `:iterate` expansion stopped at the depth bound.
    IncludeDepthExceeded { max_depth: usize },
    /// Include expansion stopped at the resource-count bound.
    IncludeLimitReached { max_resources: usize },
    /// The total is a lower bound.
    TotalEstimated { cap: u64 },
}

impl SearchWarning {
    /// FHIR `IssueType` code for the warning.
    pub fn issue_code(&self) -> &'static str {
        match self {
            SearchWarning::IgnoredParameter { .. } => "not-supported",
            SearchWarning::ChainDepthExceeded { .. }
            | SearchWarning::IncludeDepthExceeded { .. }
            | SearchWarning::IncludeLimitReached { .. } => "too-costly",
            SearchWarning::TotalEstimated { .. } => "informational",
        }
    }

    /// Returns true if the warning means results were cut short.
    pub fn truncates(&self) -> bool {
        matches!(
            self,
            SearchWarning::ChainDepthExceeded { .. }
                | SearchWarning::IncludeDepthExceeded { .. }
                | SearchWarning::IncludeLimitReached { .. }
        )
    }
}

impl fmt::Display for SearchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchWarning::IgnoredParameter { name } => {
                write!(f, "unknown search parameter '{}' was ignored", name)
            }
            SearchWarning::ChainDepthExceeded {
                parameter,
                max_depth,
            } => write!(
                f,
                "parameter '{}' exceeds the maximum chain depth of {}; it matches nothing",
                parameter, max_depth
            ),
            SearchWarning::IncludeDepthExceeded { max_depth } => write!(
                f,
                "include iteration stopped after {} levels",
                max_depth
            ),
            SearchWarning::IncludeLimitReached { max_resources } => write!(
                f,
                "included resources truncated at {}",
                max_resources
            ),
            SearchWarning::TotalEstimated { cap } => {
                write!(f, "total is estimated and capped at {}", cap)
            }
        }
    }
}

/// Result of a search operation.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matching resources, one page.
    pub resources: Page<StoredResource>,

    /// Resources attached by `_include` / `_revinclude`.
    pub included: Vec<StoredResource>,

    /// Total number of matches, if requested.
    pub total: Option<u64>,

    /// Issues to surface to the client.
    pub warnings: Vec<SearchWarning>,

    /// Whether any bound cut the result short.
    pub truncated: bool,
}

impl SearchResult {
    /// Creates a new search result with the given page.
    pub fn new(resources: Page<StoredResource>) -> Self {
        Self {
            resources,
            included: Vec::new(),
            total: None,
            warnings: Vec::new(),
            truncated: false,
        }
    }

    /// Sets the included resources.
    pub fn with_included(mut self, included: Vec<StoredResource>) -> Self {
        self.included = included;
        self
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Records a warning, flagging truncation when it applies.
    pub fn push_warning(&mut self, warning: SearchWarning) {
        if warning.truncates() {
            self.truncated = true;
        }
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Builds an OperationOutcome describing the warnings, if any.
    pub fn outcome(&self) -> Option<Value> {
        if self.warnings.is_empty() {
            return None;
        }
        let issues: Vec<Value> = self
            .warnings
            .iter()
            .map(|w| {
                json!({
                    "severity": "warning",
                    "code": w.issue_code(),
                    "diagnostics": w.to_string(),
                })
            })
            .collect();
        Some(json!({
            "resourceType": "OperationOutcome",
            "issue": issues,
        }))
    }

    /// Converts this result to a searchset Bundle.
    ///
    /// `self_link` is the full request URL. Entries are rendered with
    /// `render`, which lets callers transform documents to the client's
    /// dialect.
    pub fn to_bundle_with<F>(&self, base_url: &str, self_link: &str, mut render: F) -> Bundle
    where
        F: FnMut(&StoredResource) -> Value,
    {
        let base = base_url.trim_end_matches('/');
        let mut bundle = Bundle::searchset().with_link("self", self_link);

        if let Some(total) = self.total {
            bundle = bundle.with_total(total);
        }
        if let Some(cursor) = &self.resources.page_info.next_cursor {
            bundle = bundle.with_link("next", with_cursor(self_link, cursor));
        }
        if let Some(cursor) = &self.resources.page_info.previous_cursor {
            bundle = bundle.with_link("previous", with_cursor(self_link, cursor));
        }

        for resource in &self.resources.items {
            bundle = bundle.with_entry(BundleEntry::match_entry(
                format!("{}/{}", base, resource.url()),
                render(resource),
            ));
        }
        for resource in &self.included {
            bundle = bundle.with_entry(BundleEntry::include_entry(
                format!("{}/{}", base, resource.url()),
                render(resource),
            ));
        }
        if let Some(outcome) = self.outcome() {
            bundle = bundle.with_entry(BundleEntry::outcome_entry(outcome));
        }

        bundle
    }

    /// Converts this result to a searchset Bundle with stored content.
    pub fn to_bundle(&self, base_url: &str, self_link: &str) -> Bundle {
        self.to_bundle_with(base_url, self_link, |r| r.content().clone())
    }
}

/// Returns the offset encoded in a query's cursor, or its `_offset`.
pub fn query_offset(query: &SearchQuery) -> StorageResult<u64> {
    match &query.cursor {
        Some(cursor) => {
            let decoded = PageCursor::decode(cursor)?;
            decoded.offset_value().ok_or_else(|| {
                crate::error::SearchError::InvalidCursor {
                    cursor: cursor.clone(),
                }
                .into()
            })
        }
        None => Ok(query.offset.map(u64::from).unwrap_or(0)),
    }
}

/// Basic search capability.
#[async_trait]
pub trait SearchProvider: ResourceStorage {
    /// Executes a search, including chains, `_has`, `_sort`, paging and
    /// include expansion.
    ///
    /// Fails only on unparseable input such as a malformed date or cursor.
    async fn search(&self, ctx: &RequestContext, query: &SearchQuery)
    -> StorageResult<SearchResult>;

    /// Counts the resources matching a query, ignoring paging.
    async fn search_count(&self, ctx: &RequestContext, query: &SearchQuery) -> StorageResult<u64>;
}

/// Include expansion.
#[async_trait]
pub trait IncludeProvider: SearchProvider {
    /// Resolves `_include` / `_revinclude` for a page of matches.
    ///
    /// The returned resources never repeat a `(type, id)` already present in
    /// `matches`. Warnings describe any bound that stopped expansion.
    async fn resolve_includes(
        &self,
        ctx: &RequestContext,
        matches: &[StoredResource],
        includes: &[IncludeDirective],
    ) -> StorageResult<(Vec<StoredResource>, Vec<SearchWarning>)>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PageInfo, SearchEntryMode};
    use crate::versioning::FhirDialect;

    fn resource(resource_type: &str, id: &str) -> StoredResource {
        StoredResource::new(
            resource_type,
            id,
            json!({"resourceType": resource_type, "id": id}),
            FhirDialect::R4,
        )
    }

    #[test]
    fn test_push_warning_sets_truncated() {
        let mut result = SearchResult::new(Page::empty());
        result.push_warning(SearchWarning::IgnoredParameter {
            name: "foo".to_string(),
        });
        assert!(!result.truncated);

        result.push_warning(SearchWarning::IncludeLimitReached { max_resources: 10 });
        assert!(result.truncated);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_push_warning_deduplicates() {
        let mut result = SearchResult::new(Page::empty());
        let warning = SearchWarning::IncludeDepthExceeded { max_depth: 3 };
        result.push_warning(warning.clone());
        result.push_warning(warning);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_to_bundle_modes() {
        let page = Page::new(
            vec![resource("Observation", "o1")],
            PageInfo::with_next(PageCursor::offset(1)),
        );
        let mut result = SearchResult::new(page)
            .with_included(vec![resource("Patient", "p1")])
            .with_total(3);
        result.push_warning(SearchWarning::IgnoredParameter {
            name: "bogus".to_string(),
        });

        let bundle = result.to_bundle("http://localhost", "http://localhost/Observation?_count=1");

        let modes: Vec<_> = bundle.entry.iter().filter_map(|e| e.mode()).collect();
        assert_eq!(
            modes,
            vec![
                SearchEntryMode::Match,
                SearchEntryMode::Include,
                SearchEntryMode::Outcome
            ]
        );
        assert_eq!(bundle.total, Some(3));
        assert!(bundle.link("next").unwrap().contains("_cursor="));
        assert_eq!(
            bundle.entry[1].full_url.as_deref(),
            Some("http://localhost/Patient/p1")
        );
    }

    #[test]
    fn test_outcome_none_without_warnings() {
        let result = SearchResult::new(Page::empty());
        assert!(result.outcome().is_none());
    }

    #[test]
    fn test_query_offset() {
        let query = SearchQuery::new("Patient").with_cursor(PageCursor::offset(40).encode());
        assert_eq!(query_offset(&query).unwrap(), 40);

        let history_cursor =
            SearchQuery::new("Patient").with_cursor(PageCursor::before_version(2).encode());
        assert!(query_offset(&history_cursor).is_err());

        assert_eq!(query_offset(&SearchQuery::new("Patient")).unwrap(), 0);
    }
}
