//! Pagination and bundle types for search and history results.
//!
//! Cursors are opaque to clients: base64-encoded JSON carrying a format
//! version and a position. Search pages use offsets; history pages resume
//! below the last version returned, which stays stable while new versions are
//! appended.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchError;

const CURSOR_FORMAT_VERSION: u8 = 1;

/// An opaque pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Cursor format version.
    version: u8,

    /// Where the next page starts.
    position: CursorPosition,
}

/// The position encoded in a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CursorPosition {
    /// Skip this many matches.
    Offset(u64),
    /// Continue with versions strictly below this one.
    BeforeVersion(u64),
}

impl PageCursor {
    /// Creates an offset cursor.
    pub fn offset(offset: u64) -> Self {
        Self {
            version: CURSOR_FORMAT_VERSION,
            position: CursorPosition::Offset(offset),
        }
    }

    /// Creates a history cursor resuming below `version_id`.
    pub fn before_version(version_id: u64) -> Self {
        Self {
            version: CURSOR_FORMAT_VERSION,
            position: CursorPosition::BeforeVersion(version_id),
        }
    }

    /// Returns the encoded position.
    pub fn position(&self) -> CursorPosition {
        self.position
    }

    /// Returns the offset for offset cursors.
    pub fn offset_value(&self) -> Option<u64> {
        match self.position {
            CursorPosition::Offset(offset) => Some(offset),
            CursorPosition::BeforeVersion(_) => None,
        }
    }

    /// Returns the version bound for history cursors.
    pub fn before_version_value(&self) -> Option<u64> {
        match self.position {
            CursorPosition::BeforeVersion(version) => Some(version),
            CursorPosition::Offset(_) => None,
        }
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, SearchError> {
        let invalid = || SearchError::InvalidCursor {
            cursor: s.to_string(),
        };

        let bytes = URL_SAFE_NO_PAD.decode(s).map_err(|_| invalid())?;
        let cursor: PageCursor = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
        if cursor.version != CURSOR_FORMAT_VERSION {
            return Err(invalid());
        }
        Ok(cursor)
    }
}

/// Information about a page of results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    /// The cursor for the next page, if there is one.
    pub next_cursor: Option<String>,

    /// The cursor for the previous page, if there is one.
    pub previous_cursor: Option<String>,

    /// Total count of matching resources (if requested and available).
    pub total: Option<u64>,

    /// Whether there are more results after this page.
    pub has_next: bool,

    /// Whether there are results before this page.
    pub has_previous: bool,
}

impl PageInfo {
    /// Creates page info indicating no more pages.
    pub fn end() -> Self {
        Self::default()
    }

    /// Creates page info with a next cursor.
    pub fn with_next(cursor: PageCursor) -> Self {
        Self {
            next_cursor: Some(cursor.encode()),
            has_next: true,
            ..Self::default()
        }
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Sets the previous cursor.
    pub fn with_previous(mut self, cursor: PageCursor) -> Self {
        self.previous_cursor = Some(cursor.encode());
        self.has_previous = true;
        self
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,

    /// Pagination information.
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Creates a new page with the given items and page info.
    pub fn new(items: Vec<T>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }

    /// Creates an empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo::end(),
        }
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bundle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    /// Search results.
    Searchset,
    /// Version history.
    History,
}

/// A Bundle assembled for a search or history response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Always "Bundle".
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    /// The bundle type.
    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    /// Total count of matching resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Navigation links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    /// The bundle entries.
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

/// A link in a Bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleLink {
    /// The relation type (self, next, previous).
    pub relation: String,

    /// The URL.
    pub url: String,
}

/// An entry in a Bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    /// The full URL of the resource.
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    /// The resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    /// Search information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,

    /// Request that produced a history entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleEntryRequest>,

    /// Outcome of the request that produced a history entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleEntryResponse>,
}

/// Search information for a bundle entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntrySearch {
    /// How this entry matched the search (match, include, outcome).
    pub mode: SearchEntryMode,
}

/// How a bundle entry matched the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// This is a match to the search parameters.
    Match,
    /// This is included because of _include/_revinclude.
    Include,
    /// This is an OperationOutcome about the search.
    Outcome,
}

/// Request element of a history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntryRequest {
    /// HTTP method.
    pub method: String,
    /// Relative URL.
    pub url: String,
}

/// Response element of a history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntryResponse {
    /// HTTP status line, e.g. "201 Created".
    pub status: String,
    /// ETag of the version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// When the version was written.
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl Bundle {
    /// Creates an empty bundle of the given type.
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type,
            total: None,
            link: Vec::new(),
            entry: Vec::new(),
        }
    }

    /// Creates an empty searchset bundle.
    pub fn searchset() -> Self {
        Self::new(BundleType::Searchset)
    }

    /// Creates an empty history bundle.
    pub fn history() -> Self {
        Self::new(BundleType::History)
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Adds a link.
    pub fn with_link(mut self, relation: impl Into<String>, url: impl Into<String>) -> Self {
        self.link.push(BundleLink {
            relation: relation.into(),
            url: url.into(),
        });
        self
    }

    /// Adds an entry.
    pub fn with_entry(mut self, entry: BundleEntry) -> Self {
        self.entry.push(entry);
        self
    }

    /// Returns the link with the given relation.
    pub fn link(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }
}

impl BundleEntry {
    fn searched(full_url: impl Into<String>, resource: Value, mode: SearchEntryMode) -> Self {
        Self {
            full_url: Some(full_url.into()),
            resource: Some(resource),
            search: Some(BundleEntrySearch { mode }),
            request: None,
            response: None,
        }
    }

    /// Creates a new match entry.
    pub fn match_entry(full_url: impl Into<String>, resource: Value) -> Self {
        Self::searched(full_url, resource, SearchEntryMode::Match)
    }

    /// Creates a new include entry.
    pub fn include_entry(full_url: impl Into<String>, resource: Value) -> Self {
        Self::searched(full_url, resource, SearchEntryMode::Include)
    }

    /// Creates an outcome entry carrying an OperationOutcome.
    pub fn outcome_entry(outcome: Value) -> Self {
        Self {
            full_url: None,
            resource: Some(outcome),
            search: Some(BundleEntrySearch {
                mode: SearchEntryMode::Outcome,
            }),
            request: None,
            response: None,
        }
    }

    /// Returns the search mode, if any.
    pub fn mode(&self) -> Option<SearchEntryMode> {
        self.search.as_ref().map(|s| s.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_cursor_round_trip() {
        let cursor = PageCursor::offset(40);
        let decoded = PageCursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded.offset_value(), Some(40));
        assert_eq!(decoded.before_version_value(), None);
    }

    #[test]
    fn test_history_cursor_position() {
        let cursor = PageCursor::before_version(7);
        assert_eq!(cursor.position(), CursorPosition::BeforeVersion(7));
        assert_eq!(cursor.offset_value(), None);
    }

    #[test]
    fn test_cursor_decode_invalid() {
        assert!(PageCursor::decode("not-valid-base64!!!").is_err());

        let not_a_cursor = URL_SAFE_NO_PAD.encode(b"{\"hello\":1}");
        assert!(matches!(
            PageCursor::decode(&not_a_cursor),
            Err(SearchError::InvalidCursor { .. })
        ));
    }

    #[test]
    fn test_cursor_rejects_unknown_format_version() {
        let future = URL_SAFE_NO_PAD
            .encode(br#"{"version":9,"position":{"kind":"offset","value":1}}"#);
        assert!(PageCursor::decode(&future).is_err());
    }

    #[test]
    fn test_page_info_with_next() {
        let info = PageInfo::with_next(PageCursor::offset(20)).with_total(55);
        assert!(info.has_next);
        assert!(info.next_cursor.is_some());
        assert_eq!(info.total, Some(55));
    }

    #[test]
    fn test_searchset_bundle_serialization() {
        let bundle = Bundle::searchset()
            .with_total(2)
            .with_link("self", "http://localhost/Patient")
            .with_entry(BundleEntry::match_entry(
                "http://localhost/Patient/1",
                serde_json::json!({"resourceType": "Patient", "id": "1"}),
            ));

        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "searchset");
        assert_eq!(json["total"], 2);
        assert_eq!(json["entry"][0]["search"]["mode"], "match");
        assert!(json["entry"][0].get("request").is_none());
        assert_eq!(bundle.link("self"), Some("http://localhost/Patient"));
    }

    #[test]
    fn test_outcome_entry_mode() {
        let entry = BundleEntry::outcome_entry(serde_json::json!({
            "resourceType": "OperationOutcome"
        }));
        assert_eq!(entry.mode(), Some(SearchEntryMode::Outcome));
        assert!(entry.full_url.is_none());
    }
}
