//! Per-request context passed into every storage call.
//!
//! A [`RequestContext`] carries the request identifier used in log fields and a
//! [`CancellationToken`] that long-running work (writes before commit, include
//! expansion, history paging) polls between steps.

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{StorageResult, TransactionError};

/// Context for a single storage operation.
///
/// # Example
///
/// ```
/// use hcs_persistence::context::RequestContext;
///
/// let ctx = RequestContext::new();
/// assert!(!ctx.is_cancelled());
///
/// ctx.cancellation().cancel();
/// assert!(ctx.check_cancelled("search").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Creates a context with a generated request id and a fresh token.
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Creates a context with an explicit request id.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token, e.g. with a child of a server-wide token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the request id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns a guard that cancels this context when dropped.
    ///
    /// Handlers hold the guard for the lifetime of the request so that an
    /// abandoned or timed-out request cancels any work still in flight.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancellation.clone().drop_guard()
    }

    /// Returns true once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`TransactionError::Cancelled`] if the token was cancelled.
    pub fn check_cancelled(&self, operation: &str) -> StorageResult<()> {
        if self.cancellation.is_cancelled() {
            tracing::warn!(
                request_id = %self.request_id,
                operation = operation,
                "Operation cancelled"
            );
            return Err(TransactionError::Cancelled {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
