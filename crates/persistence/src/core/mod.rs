//! Core storage traits and abstractions.
//!
//! - [`ResourceStorage`] - Versioned CRUD
//! - [`VersionedStorage`] - vread and If-Match updates
//! - [`ConditionalStorage`] - Create, update and delete by search criteria
//! - [`InstanceHistoryProvider`] - Version history of one resource
//! - [`SearchProvider`] / [`IncludeProvider`] - Search and include expansion
//!
//! # Trait Hierarchy
//!
//! ```text
//! ResourceStorage
//!     ├── VersionedStorage
//!     │       └── InstanceHistoryProvider
//!     ├── ConditionalStorage
//!     └── SearchProvider
//!             └── IncludeProvider
//! ```
//!
//! Every method takes a [`RequestContext`](crate::context::RequestContext)
//! first. Implementations poll its cancellation token before committing a
//! write and between include iterations.

mod history;
mod search;
mod storage;
mod versioned;

pub use history::{
    HistoryEntry, HistoryPage, HistoryParams, InstanceHistoryProvider, history_bundle,
};
pub use search::{IncludeProvider, SearchProvider, SearchResult, SearchWarning, query_offset};
pub use storage::{
    ConditionalCreateResult, ConditionalDeleteResult, ConditionalStorage,
    ConditionalUpdateResult, ResourceStorage,
};
pub use versioned::{
    VersionConflictInfo, VersionedStorage, check_version_match, normalize_etag,
    parse_etag_version,
};
