//! Instance history handler.
//!
//! `GET [base]/[type]/[id]/_history`

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, NaiveDate, Utc};
use hcs_persistence::core::{HistoryParams, history_bundle};
use hcs_persistence::types::ResourceKind;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::{FhirVersionExtractor, RequestContextExtractor};
use crate::pipeline;
use crate::responses::{ResourceHeaders, json_response};
use crate::state::{AppState, ClinicalStorage};

/// Query parameters for history.
#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    /// Page size.
    #[serde(rename = "_count")]
    pub count: Option<u32>,

    /// Only versions written at or after this instant.
    #[serde(rename = "_since")]
    pub since: Option<String>,

    /// Opaque cursor from a `next` link.
    #[serde(rename = "_cursor")]
    pub cursor: Option<String>,
}

impl HistoryQuery {
    fn to_params(&self) -> RestResult<HistoryParams> {
        let mut params = HistoryParams::new();
        if let Some(count) = self.count {
            params = params.count(count);
        }
        if let Some(since) = &self.since {
            params = params.since(parse_instant(since)?);
        }
        if let Some(cursor) = &self.cursor {
            params = params.cursor(cursor.clone());
        }
        Ok(params)
    }
}

/// Parses `_since` as an RFC 3339 instant or a plain date (midnight UTC).
///
/// An unescaped `+` offset arrives form-decoded as a space and is restored.
fn parse_instant(value: &str) -> RestResult<DateTime<Utc>> {
    let restored = value.trim().replace(' ', "+");
    if let Ok(instant) = DateTime::parse_from_rfc3339(&restored) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(&restored, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RestError::BadRequest {
            message: format!("Invalid _since value: {}", value),
        })
}

/// Handler for instance history.
///
/// Lists every version of the resource, newest first, deletions included.
/// Entries are rendered in the dialect negotiated from `Accept`.
///
/// # Response
///
/// - `200 OK` - History bundle
/// - `400 Bad Request` - Bad `_since` or cursor
/// - `404 Not Found` - The resource never existed
pub async fn history_instance_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    RequestContextExtractor(ctx): RequestContextExtractor,
    version: FhirVersionExtractor,
    Query(query): Query<HistoryQuery>,
    RawQuery(raw_query): RawQuery,
) -> RestResult<Response>
where
    S: ClinicalStorage,
{
    let _guard = ctx.cancel_on_drop();

    debug!(
        request_id = ctx.request_id(),
        resource_type = %resource_type,
        id = %id,
        "Processing instance history request"
    );

    let params = query.to_params()?;
    let target = pipeline::negotiate(
        &state,
        version.accept_preferences(),
        &ResourceKind::parse(&resource_type),
    )?;

    let page = state
        .storage()
        .history_instance(&ctx, &resource_type, &id, &params)
        .await?;

    let self_link = match raw_query.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => format!("{}/{}/{}/_history?{}", state.base_url(), resource_type, id, q),
        None => format!("{}/{}/{}/_history", state.base_url(), resource_type, id),
    };
    let mut bundle = history_bundle(&page, state.base_url(), &self_link);

    let live = page
        .items
        .iter()
        .map(|entry| &entry.resource)
        .filter(|r| !r.is_deleted());
    let (rendered, warnings) = pipeline::render_all(&state, live, target)?;
    let mut rendered = rendered.into_iter();
    for entry in bundle.entry.iter_mut().filter(|e| e.resource.is_some()) {
        entry.resource = rendered.next();
    }

    debug!(
        resource_type = %resource_type,
        id = %id,
        entries = bundle.entry.len(),
        "Returning history"
    );

    let headers = ResourceHeaders::new()
        .with_dialect(target)
        .with_warnings(warnings)
        .to_header_map();

    json_response(StatusCode::OK, headers, &bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant_forms() {
        let full = parse_instant("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(full.to_rfc3339(), "2024-03-01T10:00:00+00:00");

        let offset = parse_instant("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(offset, full);

        let decoded = parse_instant("2024-03-01T12:00:00 02:00").unwrap();
        assert_eq!(decoded, full);

        let date = parse_instant("2024-03-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_instant_rejects_garbage() {
        assert!(matches!(
            parse_instant("yesterday"),
            Err(RestError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_query_to_params() {
        let query = HistoryQuery {
            count: Some(2),
            since: Some("2024-01-01".to_string()),
            cursor: Some("abc".to_string()),
        };
        let params = query.to_params().unwrap();
        assert_eq!(params.count, Some(2));
        assert!(params.since.is_some());
        assert_eq!(params.cursor.as_deref(), Some("abc"));
    }
}
