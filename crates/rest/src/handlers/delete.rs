//! Delete interaction handlers.
//!
//! - `DELETE [base]/[type]/[id]`
//! - `DELETE [base]/[type]?[criteria]`

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use hcs_persistence::core::ConditionalDeleteResult;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::RequestContextExtractor;
use crate::state::{AppState, ClinicalStorage};

/// Handler for the delete interaction.
///
/// Deletion is soft: a new version marked deleted is written and the
/// resource disappears from reads and searches. Deleting an already
/// deleted resource succeeds again.
///
/// # Response
///
/// - `204 No Content` - Resource deleted, `ETag` names the deletion version
/// - `404 Not Found` - The resource never existed
pub async fn delete_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    RequestContextExtractor(ctx): RequestContextExtractor,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        id = %id,
        "Processing delete request"
    );

    let version_id = state.storage().delete(&ctx, &resource_type, &id).await?;

    debug!(
        resource_type = %resource_type,
        id = %id,
        version_id = version_id,
        "Resource deleted"
    );

    Ok(deleted_response(version_id))
}

/// Handler for the conditional delete interaction.
///
/// # Response
///
/// - `204 No Content` - The single match was deleted, or nothing matched
/// - `400 Bad Request` - No criteria were given
/// - `412 Precondition Failed` - Several resources matched
pub async fn conditional_delete_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
    RequestContextExtractor(ctx): RequestContextExtractor,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    let criteria = query.unwrap_or_default();
    if criteria.trim().is_empty() {
        return Err(RestError::BadRequest {
            message: "Conditional delete requires search criteria".to_string(),
        });
    }

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        criteria = %criteria,
        "Processing conditional delete request"
    );

    match state
        .storage()
        .conditional_delete(&ctx, &resource_type, &criteria)
        .await?
    {
        ConditionalDeleteResult::Deleted(version_id) => {
            debug!(resource_type = %resource_type, "Resource conditionally deleted");
            Ok(deleted_response(version_id))
        }
        ConditionalDeleteResult::NoMatch => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

fn deleted_response(version_id: u64) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("W/\"{}\"", version_id)) {
        headers.insert(header::ETAG, value);
    }
    (StatusCode::NO_CONTENT, headers).into_response()
}
