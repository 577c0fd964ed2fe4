//! Response building.
//!
//! - [`operation_outcome`] - OperationOutcome bodies
//! - [`headers`] - `ETag`, `Last-Modified`, `Location`, `Content-Type`, `Warning`
//! - [`format`] - JSON serialization

pub mod format;
pub mod headers;
pub mod operation_outcome;

pub use format::json_response;
pub use headers::ResourceHeaders;
pub use operation_outcome::OperationOutcomeBuilder;
