//! # hcs-rest - FHIR RESTful API
//!
//! HTTP surface of the clinical data server. Every interaction goes through
//! the version pipeline: bodies are converted to the storage dialect on the
//! way in, and documents are rendered in the dialect the client accepts on
//! the way out.
//!
//! ## API Endpoints
//!
//! | Interaction | HTTP Method | URL Pattern |
//! |------------|-------------|-------------|
//! | read | GET | `/[type]/[id]` |
//! | vread | GET | `/[type]/[id]/_history/[vid]` |
//! | update | PUT | `/[type]/[id]` |
//! | conditional update | PUT | `/[type]?criteria` |
//! | delete | DELETE | `/[type]/[id]` |
//! | conditional delete | DELETE | `/[type]?criteria` |
//! | create | POST | `/[type]` |
//! | search | GET/POST | `/[type]?params` or `/[type]/_search` |
//! | history (instance) | GET | `/[type]/[id]/_history` |
//!
//! ## HTTP Headers
//!
//! - `Content-Type` - `application/fhir+json`, optionally with `fhirVersion=4.0|5.0|6.0`
//! - `Accept` - Response dialect preferences, with `fhirVersion` and `q` parameters
//! - `ETag` / `If-Match` - Optimistic locking for updates
//! - `If-None-Match` - Conditional read
//! - `If-None-Exist` - Conditional create
//! - `Warning` - Conversion notes for the returned or stored document
//! - `X-Request-Id` - Request correlation
//!
//! ## Error Handling
//!
//! All errors are returned as FHIR OperationOutcome resources:
//!
//! | HTTP Status | Description |
//! |-------------|-------------|
//! | 400 | Validation error, bad search parameter, no transformation path |
//! | 404 | Resource or version not found |
//! | 406 | None of the accepted dialects is served |
//! | 408 | Request timed out or was cancelled |
//! | 409 | Version conflict or duplicate id |
//! | 410 | Version is a deletion marker |
//! | 412 | Conditional operation matched several resources |
//! | 415 | Unsupported media type or dialect |
//! | 422 | A search value in the body could not be indexed |
//! | 500 | Internal server error |
//!
//! ## Modules
//!
//! - [`config`] - Server configuration
//! - [`state`] - Application state
//! - [`error`] - Error types and OperationOutcome generation
//! - [`extractors`] - Axum extractors for FHIR-specific headers and bodies
//! - [`pipeline`] - Dialect conversion around the store
//! - [`handlers`] - HTTP request handlers
//! - [`responses`] - Header and body formatting
//! - [`routing`] - Route configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod pipeline;
pub mod responses;
pub mod routing;
pub mod state;

pub use config::ServerConfig;
pub use error::{RestError, RestResult};
pub use routing::create_routes;
pub use state::{AppState, ClinicalStorage};

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, http::StatusCode};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the application with default configuration.
pub fn create_app<S>(storage: S) -> Router
where
    S: ClinicalStorage,
{
    create_app_with_config(storage, ServerConfig::default())
}

/// Creates the application with custom configuration.
pub fn create_app_with_config<S>(storage: S, config: ServerConfig) -> Router
where
    S: ClinicalStorage,
{
    create_app_with_state(AppState::new(Arc::new(storage), config))
}

/// Creates the application around existing state.
///
/// Routes are wrapped with request ids, tracing, the request timeout and,
/// when enabled, CORS.
pub fn create_app_with_state<S>(state: AppState<S>) -> Router
where
    S: ClinicalStorage,
{
    info!(
        backend = state.storage().backend_name(),
        storage_version = %state.storage_dialect(),
        "Creating REST API server"
    );

    let config = state.config().clone();
    let router = routing::create_routes(state);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ));

    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(middleware)
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.cors_origins == "*" {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Serves the application until Ctrl-C.
///
/// On shutdown the state's shutdown token is cancelled, which cancels the
/// request context of every in-flight request.
pub async fn serve<S>(state: AppState<S>) -> anyhow::Result<()>
where
    S: ClinicalStorage,
{
    let addr = state.config().socket_addr();
    let shutdown = state.shutdown_token().clone();
    let app = create_app_with_state(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to the server crates.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "hcs_rest={level},hcs_persistence={level},tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
