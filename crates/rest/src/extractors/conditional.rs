//! Conditional request headers.
//!
//! - `If-Match`: optimistic concurrency on update
//! - `If-None-Match`: conditional read
//! - `If-None-Exist`: conditional create

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

/// Conditional headers of a request.
#[derive(Debug, Default, Clone)]
pub struct ConditionalHeaders {
    if_match: Option<String>,
    if_none_match: Option<String>,
    if_none_exist: Option<String>,
}

impl ConditionalHeaders {
    /// Reads the conditional headers from a header map.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        Self {
            if_match: get(header::IF_MATCH.as_str()),
            if_none_match: get(header::IF_NONE_MATCH.as_str()),
            if_none_exist: get("if-none-exist").map(|q| q.trim_start_matches('?').to_string()),
        }
    }

    /// Returns the `If-Match` ETag.
    pub fn if_match(&self) -> Option<&str> {
        self.if_match.as_deref()
    }

    /// Returns the `If-None-Match` ETag.
    pub fn if_none_match(&self) -> Option<&str> {
        self.if_none_match.as_deref()
    }

    /// Returns the `If-None-Exist` search criteria, without a leading `?`.
    pub fn if_none_exist(&self) -> Option<&str> {
        self.if_none_exist.as_deref()
    }
}

impl<S> FromRequestParts<S> for ConditionalHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
