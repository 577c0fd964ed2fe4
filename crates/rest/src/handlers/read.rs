//! Read interaction handler.
//!
//! `GET [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::{ConditionalHeaders, FhirVersionExtractor, RequestContextExtractor};
use crate::handlers::resource_response;
use crate::state::{AppState, ClinicalStorage};

/// Handler for the read interaction.
///
/// Returns the current version of a live resource, rendered in the dialect
/// negotiated from `Accept`.
///
/// # HTTP Request
///
/// `GET [base]/[type]/[id]`
///
/// # Headers
///
/// - `Accept` - Response dialect preferences (`fhirVersion` media parameter)
/// - `If-None-Match` - Return 304 Not Modified if the ETag matches
///
/// # Response
///
/// - `200 OK` - Resource found
/// - `304 Not Modified` - Resource unchanged (conditional read)
/// - `404 Not Found` - Resource does not exist or is deleted
/// - `406 Not Acceptable` - None of the requested dialects is served
pub async fn read_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    conditional: ConditionalHeaders,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        id = %id,
        "Processing read request"
    );

    let Some(stored) = state.storage().read(&ctx, &resource_type, &id).await? else {
        debug!(resource_type = %resource_type, id = %id, "Resource not found");
        return Err(RestError::NotFound { resource_type, id });
    };

    if let Some(etag) = conditional.if_none_match() {
        if etag == "*" || stored.matches_etag(etag) {
            debug!(etag = %stored.etag(), "Returning 304 Not Modified");
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&stored.etag()) {
                headers.insert(header::ETAG, value);
            }
            return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
        }
    }

    resource_response(
        &state,
        StatusCode::OK,
        &stored,
        version.accept_preferences(),
        Vec::new(),
        false,
    )
}
