//! Search interaction handlers.
//!
//! - `GET [base]/[type]?[parameters]`
//! - `POST [base]/[type]/_search` with form-encoded parameters

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::Response,
};
use hcs_persistence::search::parse_search_query;
use hcs_persistence::types::{ResourceKind, StoredResource};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RestResult;
use crate::extractors::{FhirVersionExtractor, RequestContextExtractor};
use crate::pipeline;
use crate::responses::{ResourceHeaders, json_response};
use crate::state::{AppState, ClinicalStorage};

/// Handler for search with query-string parameters.
///
/// # Response
///
/// - `200 OK` - Searchset bundle; matches first, then included resources,
///   then an OperationOutcome entry when parameters were ignored or
///   expansion was cut short
/// - `400 Bad Request` - A parameter could not be parsed
/// - `406 Not Acceptable` - None of the requested dialects is served
pub async fn search_get_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    RawQuery(query): RawQuery,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();
    let raw = query.unwrap_or_default();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        query = %raw,
        "Processing search request"
    );

    execute_search(&state, &ctx, &resource_type, &raw, &version).await
}

/// Handler for search with a form-encoded body.
///
/// Parameters in the URL and the body are combined.
pub async fn search_post_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    RawQuery(query): RawQuery,
    body: String,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();
    let raw = combine_parameters(query.as_deref(), &body);

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        query = %raw,
        "Processing search POST request"
    );

    execute_search(&state, &ctx, &resource_type, &raw, &version).await
}

fn combine_parameters(query: Option<&str>, body: &str) -> String {
    [query.unwrap_or_default(), body.trim()]
        .into_iter()
        .map(|part| part.trim_start_matches('?'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("&")
}

async fn execute_search<S>(
    state: &AppState<S>,
    ctx: &hcs_persistence::RequestContext,
    resource_type: &str,
    raw: &str,
    version: &FhirVersionExtractor,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let query = parse_search_query(resource_type, raw, state.search_registry())?;
    let target = pipeline::negotiate(
        state,
        version.accept_preferences(),
        &ResourceKind::parse(resource_type),
    )?;

    let mut result = state.storage().search(ctx, &query).await?;
    if result.truncated {
        warn!(
            resource_type = resource_type,
            warnings = result.warnings.len(),
            "Search result was truncated"
        );
    }

    let (mut rendered, mut warnings) =
        pipeline::render_all(state, &result.resources.items, target)?;

    // Included resources of a kind the target dialect lacks are dropped
    // from the page rather than failing the whole search.
    let mut kept: Vec<StoredResource> = Vec::with_capacity(result.included.len());
    for stored in std::mem::take(&mut result.included) {
        match pipeline::render(state, &stored, target) {
            Ok(included) => {
                warnings.extend(
                    included
                        .warnings
                        .into_iter()
                        .map(|w| format!("{}: {}", stored.url(), w)),
                );
                rendered.push(included.resource);
                kept.push(stored);
            }
            Err(e) => {
                debug!(url = %stored.url(), error = %e, "Dropping included resource");
                warnings.push(format!("{} omitted: {}", stored.url(), e));
            }
        }
    }
    result.included = kept;

    let self_link = if raw.is_empty() {
        format!("{}/{}", state.base_url(), resource_type)
    } else {
        format!("{}/{}?{}", state.base_url(), resource_type, raw)
    };

    let mut documents = rendered.into_iter();
    let bundle = result.to_bundle_with(state.base_url(), &self_link, |_| {
        documents.next().unwrap_or(Value::Null)
    });

    debug!(
        resource_type = resource_type,
        matches = result.resources.items.len(),
        included = result.included.len(),
        total = ?result.total,
        "Returning search results"
    );

    let headers = ResourceHeaders::new()
        .with_dialect(target)
        .with_warnings(warnings)
        .to_header_map();
    json_response(StatusCode::OK, headers, &bundle)
}
