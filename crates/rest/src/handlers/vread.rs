//! Version read handler.
//!
//! `GET [base]/[type]/[id]/_history/[vid]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::{FhirVersionExtractor, RequestContextExtractor};
use crate::handlers::resource_response;
use crate::state::{AppState, ClinicalStorage};

/// Handler for the vread interaction.
///
/// # Response
///
/// - `200 OK` - The requested version
/// - `400 Bad Request` - The version id is not a number
/// - `404 Not Found` - No such version
/// - `410 Gone` - The version is a deletion marker
pub async fn vread_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id, version_id)): Path<(String, String, String)>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        id = %id,
        version_id = %version_id,
        "Processing vread request"
    );

    let version_id: u64 = version_id.parse().map_err(|_| RestError::BadRequest {
        message: format!("Invalid version id: {}", version_id),
    })?;

    let stored = state
        .storage()
        .vread(&ctx, &resource_type, &id, version_id)
        .await?;

    if stored.is_deleted() {
        return Err(RestError::Gone { resource_type, id });
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
