//! Request context extractor.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use hcs_persistence::context::RequestContext;
use hcs_persistence::core::ResourceStorage;

use crate::state::AppState;

/// Header carrying the request id, set by the request-id layer.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the [`RequestContext`] passed to every storage call.
///
/// The request id comes from `X-Request-Id` when present. The cancellation
/// token is a child of the server shutdown token; handlers hold
/// [`RequestContext::cancel_on_drop`] so a timed-out request cancels its
/// in-flight work.
#[derive(Debug, Clone)]
pub struct RequestContextExtractor(pub RequestContext);

impl RequestContextExtractor {
    /// Returns the context.
    pub fn context(&self) -> &RequestContext {
        &self.0
    }
}

impl<S> FromRequestParts<AppState<S>> for RequestContextExtractor
where
    S: ResourceStorage + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = match parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(id) => RequestContext::with_request_id(id),
            None => RequestContext::new(),
        };

        Ok(Self(ctx.with_cancellation(state.shutdown_token().child_token())))
    }
}
