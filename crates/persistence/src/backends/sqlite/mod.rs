//! SQLite backend implementation.
//!
//! This module implements every storage trait on SQLite. It supports both
//! in-memory databases (for tests) and file-based databases.
//!
//! # Features
//!
//! - In-memory and file-based modes
//! - Versioned CRUD with soft deletes and full history
//! - Conditional create, update and delete resolved inside the write
//!   transaction
//! - Search over the `search_index` table: chains, `_has`, composites,
//!   `_sort`, `_total` and include expansion
//!
//! # Example
//!
//! ```no_run
//! use hcs_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Initialize the schema
//! backend.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Current version of every resource, deletion markers included
//! CREATE TABLE resources (
//!     resource_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version_id INTEGER NOT NULL,
//!     data BLOB NOT NULL,  -- JSON data
//!     last_updated TEXT NOT NULL,
//!     is_deleted INTEGER NOT NULL DEFAULT 0,
//!     deleted_at TEXT,
//!     fhir_version TEXT NOT NULL,
//!     PRIMARY KEY (resource_type, id)
//! );
//!
//! -- Every version ever written
//! CREATE TABLE resource_history (
//!     resource_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version_id INTEGER NOT NULL,
//!     data BLOB NOT NULL,
//!     last_updated TEXT NOT NULL,
//!     is_deleted INTEGER NOT NULL DEFAULT 0,
//!     fhir_version TEXT NOT NULL,
//!     method TEXT NOT NULL,
//!     PRIMARY KEY (resource_type, id, version_id)
//! );
//! ```
//!
//! `search_index` holds one row per extracted value; see [`search`].

mod backend;
mod schema;
pub mod search;
mod search_impl;
mod storage;

pub use backend::{SearchLimits, SqliteBackend, SqliteBackendConfig};
