//! Create interaction handler.
//!
//! `POST [base]/[type]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use hcs_persistence::core::ConditionalCreateResult;
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::{
    ConditionalHeaders, FhirResource, FhirVersionExtractor, RequestContextExtractor,
};
use crate::handlers::{resource_response, write_preferences};
use crate::pipeline;
use crate::state::{AppState, ClinicalStorage};

/// Handler for the create interaction.
///
/// The server assigns the id. The body may be in any served dialect; it is
/// converted to the storage dialect before it is stored.
///
/// # HTTP Request
///
/// `POST [base]/[type]`
///
/// # Headers
///
/// - `Content-Type` - `application/fhir+json`, optionally with `fhirVersion`
/// - `If-None-Exist` - Conditional create search criteria
/// - `Accept` - Response dialect preferences
///
/// # Response
///
/// - `201 Created` - Resource created
/// - `200 OK` - Conditional create matched one resource and updated it
/// - `400 Bad Request` - Invalid resource
/// - `412 Precondition Failed` - Conditional create matched several resources
/// - `422 Unprocessable Entity` - A search value in the body could not be indexed
pub async fn create_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
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
        conditional = ?conditional.if_none_exist(),
        "Processing create request"
    );

    let ingested = pipeline::ingest(&state, &resource_type, resource, version.content_version())?;
    let preferences = write_preferences(&version, ingested.source);

    let Some(criteria) = conditional.if_none_exist() else {
        let stored = state
            .storage()
            .create(&ctx, &resource_type, ingested.resource)
            .await?;
        debug!(id = stored.id(), "Created resource");
        return resource_response(
            &state,
            StatusCode::CREATED,
            &stored,
            &preferences,
            ingested.warnings,
            true,
        );
    };

    match state
        .storage()
        .conditional_create(&ctx, &resource_type, ingested.resource, criteria)
        .await?
    {
        ConditionalCreateResult::Created(stored) => {
            debug!(id = stored.id(), "Conditional create made a new resource");
            resource_response(
                &state,
                StatusCode::CREATED,
                &stored,
                &preferences,
                ingested.warnings,
                true,
            )
        }
        ConditionalCreateResult::Updated(stored) => {
            debug!(
                id = stored.id(),
                version = stored.version_id(),
                "Conditional create updated the matching resource"
            );
            resource_response(
                &state,
                StatusCode::OK,
                &stored,
                &preferences,
                ingested.warnings,
                false,
            )
        }
    }
}
