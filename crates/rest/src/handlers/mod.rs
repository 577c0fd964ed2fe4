//! HTTP request handlers.
//!
//! - [`create`] - Create, including `If-None-Exist`
//! - [`read`] - Read the current version
//! - [`vread`] - Read a specific version
//! - [`update`] - Update, including `If-Match` and conditional update
//! - [`delete`] - Delete, including conditional delete
//! - [`history`] - Instance history
//! - [`search`] - Type-level search (GET and POST)

pub mod create;
pub mod delete;
pub mod history;
pub mod read;
pub mod search;
pub mod update;
pub mod vread;

pub use create::create_handler;
pub use delete::{conditional_delete_handler, delete_handler};
pub use history::history_instance_handler;
pub use read::read_handler;
pub use search::{search_get_handler, search_post_handler};
pub use update::{conditional_update_handler, update_handler};
pub use vread::vread_handler;

use axum::{http::StatusCode, response::Response};
use hcs_persistence::core::ResourceStorage;
use hcs_persistence::types::StoredResource;
use hcs_persistence::versioning::{FhirDialect, VersionPreference};

use crate::error::RestResult;
use crate::extractors::FhirVersionExtractor;
use crate::pipeline;
use crate::responses::{ResourceHeaders, json_response};
use crate::state::AppState;

/// Dialect preferences for the response to a write.
///
/// Explicit `Accept` preferences win; otherwise the client gets its
/// resource back in the dialect it sent.
pub(crate) fn write_preferences(
    version: &FhirVersionExtractor,
    source: FhirDialect,
) -> Vec<VersionPreference> {
    if version.accept_preferences().is_empty() {
        vec![VersionPreference::new(source.version())]
    } else {
        version.accept_preferences().to_vec()
    }
}

/// Renders a stored resource with its headers.
///
/// `warnings` are notes gathered before rendering (e.g. from ingest); the
/// rendering step adds its own.
pub(crate) fn resource_response<S>(
    state: &AppState<S>,
    status: StatusCode,
    stored: &StoredResource,
    preferences: &[VersionPreference],
    warnings: Vec<String>,
    with_location: bool,
) -> RestResult<Response>
where
    S: ResourceStorage,
{
    let (rendered, dialect) = pipeline::render_negotiated(state, stored, preferences)?;

    let mut headers = ResourceHeaders::from_stored(stored, dialect)
        .with_warnings(warnings)
        .with_warnings(rendered.warnings);
    if with_location {
        headers = headers.with_location(format!(
            "{}/{}",
            state.base_url(),
            stored.versioned_url()
        ));
    }

    json_response(status, headers.to_header_map(), &rendered.resource)
}
