//! Core types for the persistence layer.
//!
//! - [`ResourceKind`] - The closed set of supported resource kinds
//! - [`StoredResource`] - A resource document with persistence metadata
//! - [`SearchParameter`], [`SearchQuery`] - Parsed search requests
//! - [`PageCursor`], [`Page`] - Pagination
//! - [`Bundle`] - Search and history bundles
//!
//! # Example
//!
//! ```
//! use hcs_persistence::types::{
//!     SearchParamType, SearchParameter, SearchQuery, SearchValue, SortDirective,
//! };
//!
//! let query = SearchQuery::new("Patient")
//!     .with_parameter(SearchParameter::new(
//!         "family",
//!         SearchParamType::String,
//!         vec![SearchValue::eq("Smith")],
//!     ))
//!     .with_sort(SortDirective::parse("-birthdate"))
//!     .with_count(20);
//!
//! assert_eq!(query.parameters.len(), 1);
//! ```

mod pagination;
mod resource_kind;
mod search_params;
mod stored_resource;

pub use pagination::{
    Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, BundleEntrySearch,
    BundleLink, BundleType, CursorPosition, Page, PageCursor, PageInfo, SearchEntryMode,
};
pub use resource_kind::ResourceKind;
pub use search_params::{
    ChainedParameter, IncludeDirective, IncludeType, ReverseChainFilter,
    ReverseChainedParameter, SearchModifier, SearchParamType, SearchParameter, SearchPrefix,
    SearchQuery, SearchValue, SortDirection, SortDirective, TotalMode,
};
pub use stored_resource::{ResourceMeta, ResourceMethod, StoredResource};
