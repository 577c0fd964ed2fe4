//! SQLite search implementation.
//!
//! - [`query_builder`] - Compiles a parsed query into SQL over `resources`
//! - [`chain_builder`] - Forward chains and `_has`
//! - [`parameter_handlers`] - Per-type value conditions
//! - [`writer`] - Writes index rows alongside each document version

pub mod chain_builder;
pub mod parameter_handlers;
pub mod query_builder;
pub mod writer;

pub use query_builder::{CompiledQuery, QueryBuilder, RESOURCE_ALIAS, SqlFragment, SqlParam};
pub use writer::SqliteSearchIndexWriter;
