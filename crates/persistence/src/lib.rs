//! Persistence layer for the Helios Clinical Server.
//!
//! This crate holds the core of the clinical data server: a versioned
//! resource store, the search index and query engine built on top of it, and
//! the pipeline that converts documents between the R4, R5 and R6 dialects.
//!
//! # Features
//!
//! - **Versioning**: Every write produces a new immutable version; deletes are
//!   soft and keep history
//! - **Search**: Token, string, date, number, quantity, reference, uri and
//!   composite parameters, chains, `_has`, `_include`/`_revinclude`, sorting
//!   and cursor paging
//! - **Dialects**: Detection, `Accept` negotiation and plan-driven conversion
//!   with reported data loss
//! - **Cancellation**: Every call takes a [`RequestContext`] whose token is
//!   checked before commit and between expansion steps
//!
//! # Backend Features
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`types`] - Stored resources, search requests, pagination and bundles
//! - [`error`] - Error types for all operations
//! - [`context`] - Per-request context
//! - [`core`] - Storage traits and abstractions
//! - [`search`] - Parameter definition table, indexer and query parser
//! - [`versioning`] - Dialect detection, negotiation and transformation
//! - [`backends`] - Backend implementations
//!
//! # Quick Start
//!
//! ```no_run
//! use hcs_persistence::backends::sqlite::SqliteBackend;
//! use hcs_persistence::context::RequestContext;
//! use hcs_persistence::core::ResourceStorage;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), hcs_persistence::StorageError> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let ctx = RequestContext::new();
//! let stored = backend
//!     .create(
//!         &ctx,
//!         "Patient",
//!         json!({"resourceType": "Patient", "name": [{"family": "Doe"}]}),
//!     )
//!     .await?;
//!
//! assert_eq!(stored.version_id(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Search
//!
//! ```
//! use hcs_persistence::search::{SearchParameterRegistry, parse_search_query};
//!
//! let registry = SearchParameterRegistry::standard();
//! let query = parse_search_query(
//!     "Observation",
//!     "patient=Patient/123&category=vital-signs&date=ge2024-01-01",
//!     &registry,
//! )
//! .unwrap();
//!
//! assert_eq!(query.parameters.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod context;
pub mod core;
pub mod error;
pub mod search;
pub mod types;
pub mod versioning;

// Re-export commonly used types at crate root
pub use context::RequestContext;
pub use error::{StorageError, StorageResult};
pub use types::{ResourceKind, SearchQuery, StoredResource};

// Re-export core traits
pub use core::{
    ConditionalStorage, IncludeProvider, InstanceHistoryProvider, ResourceStorage,
    SearchProvider, VersionedStorage,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
