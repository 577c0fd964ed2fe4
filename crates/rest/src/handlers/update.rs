//! Update interaction handlers.
//!
//! - `PUT [base]/[type]/[id]` - update by id
//! - `PUT [base]/[type]?[criteria]` - conditional update

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::Response,
};
use hcs_persistence::core::ConditionalUpdateResult;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::{
    ConditionalHeaders, FhirResource, FhirVersionExtractor, RequestContextExtractor,
};
use crate::handlers::{resource_response, write_preferences};
use crate::pipeline;
use crate::state::{AppState, ClinicalStorage};

/// Handler for the update interaction.
///
/// Without `If-Match` this is an upsert: an unknown id is created at
/// version 1, a known id (live or deleted) gets the next version.
///
/// # HTTP Request
///
/// `PUT [base]/[type]/[id]`
///
/// # Headers
///
/// - `If-Match` - Only update if the current version matches this ETag
///
/// # Response
///
/// - `200 OK` - Resource updated
/// - `201 Created` - Resource created
/// - `400 Bad Request` - Invalid resource, or body id differs from the path
/// - `404 Not Found` - `If-Match` given and the resource does not exist
/// - `409 Conflict` - `If-Match` names a stale version
/// - `412 Precondition Failed` - `If-Match` is not a version ETag
pub async fn update_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    conditional: ConditionalHeaders,
    FhirResource(resource): FhirResource,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        id = %id,
        if_match = ?conditional.if_match(),
        "Processing update request"
    );

    let ingested = pipeline::ingest(&state, &resource_type, resource, version.content_version())?;
    let preferences = write_preferences(&version, ingested.source);

    let (stored, created) = match conditional.if_match() {
        Some(etag) => {
            let stored = state
                .storage()
                .update_with_match(&ctx, &resource_type, &id, etag, ingested.resource)
                .await?;
            (stored, false)
        }
        None => {
            state
                .storage()
                .create_or_update(&ctx, &resource_type, &id, ingested.resource)
                .await?
        }
    };

    debug!(
        id = stored.id(),
        version_id = stored.version_id(),
        created = created,
        "Stored resource"
    );

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    resource_response(
        &state,
        status,
        &stored,
        &preferences,
        ingested.warnings,
        created,
    )
}

/// Handler for the conditional update interaction.
///
/// # HTTP Request
///
/// `PUT [base]/[type]?[criteria]`
///
/// # Response
///
/// - `200 OK` - The single match was updated
/// - `201 Created` - Nothing matched, so the resource was created
/// - `400 Bad Request` - No criteria were given
/// - `412 Precondition Failed` - Several resources matched
pub async fn conditional_update_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    FhirResource(resource): FhirResource,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    let criteria = query.unwrap_or_default();
    if criteria.trim().is_empty() {
        return Err(RestError::BadRequest {
            message: "Conditional update requires search criteria".to_string(),
        });
    }

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        criteria = %criteria,
        "Processing conditional update request"
    );

    let ingested = pipeline::ingest(&state, &resource_type, resource, version.content_version())?;
    let preferences = write_preferences(&version, ingested.source);

    match state
        .storage()
        .conditional_update(&ctx, &resource_type, ingested.resource, &criteria)
        .await?
    {
        ConditionalUpdateResult::Updated(stored) => resource_response(
            &state,
            StatusCode::OK,
            &stored,
            &preferences,
            ingested.warnings,
            false,
        ),
        ConditionalUpdateResult::Created(stored) => resource_response(
            &state,
            StatusCode::CREATED,
            &stored,
            &preferences,
            ingested.warnings,
            true,
        ),
    }
}
