//! Search parameter definitions, value extraction and query parsing.
//!
//! - [`registry`] - The parameter definition table, keyed by kind and code
//! - [`definitions`] - The standard table contents
//! - [`extractor`] - Path-based value extraction from documents
//! - [`converters`] - Conversion of extracted elements into index values
//! - [`query_parser`] - Query string parsing into [`SearchQuery`](crate::types::SearchQuery)
//! - [`errors`] - Extraction error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hcs_persistence::search::{SearchParameterExtractor, SearchParameterRegistry};
//! use serde_json::json;
//!
//! let extractor = SearchParameterExtractor::new(Arc::new(SearchParameterRegistry::standard()));
//! let patient = json!({"resourceType": "Patient", "name": [{"family": "Doe"}]});
//! let values = extractor.extract(&patient, "Patient").unwrap();
//! assert!(values.iter().any(|v| v.param_name == "family"));
//! ```

pub mod converters;
pub mod definitions;
pub mod errors;
pub mod extractor;
pub mod query_parser;
pub mod registry;

pub use converters::{CanonicalReference, DateRange, IndexValue, ValueConverter, canonicalize_reference};
pub use errors::ExtractionError;
pub use extractor::{ExtractedValue, SearchParameterExtractor, resolve_path};
pub use query_parser::{parse_search_pairs, parse_search_query, split_values};
pub use registry::{CompositeComponentDef, SearchParameterDefinition, SearchParameterRegistry};
