//! FHIR route configuration.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::state::{AppState, ClinicalStorage};

/// Creates all FHIR REST API routes.
///
/// # Routes
///
/// ## Type-level
/// - `GET /{type}` - Search
/// - `POST /{type}` - Create (conditional with `If-None-Exist`)
/// - `PUT /{type}?criteria` - Conditional update
/// - `DELETE /{type}?criteria` - Conditional delete
/// - `POST /{type}/_search` - Search (POST)
///
/// ## Instance-level
/// - `GET /{type}/{id}` - Read
/// - `PUT /{type}/{id}` - Update
/// - `DELETE /{type}/{id}` - Delete
/// - `GET /{type}/{id}/_history` - Instance history
/// - `GET /{type}/{id}/_history/{vid}` - Version read
pub fn create_routes<S>(state: AppState<S>) -> Router
where
    S: ClinicalStorage,
{
    Router::new()
        // Type-level routes
        .route(
            "/{resource_type}",
            get(handlers::search_get_handler::<S>)
                .post(handlers::create_handler::<S>)
                .put(handlers::conditional_update_handler::<S>)
                .delete(handlers::conditional_delete_handler::<S>),
        )
        .route(
            "/{resource_type}/_search",
            post(handlers::search_post_handler::<S>),
        )
        // Instance-level routes
        .route(
            "/{resource_type}/{id}",
            get(handlers::read_handler::<S>)
                .put(handlers::update_handler::<S>)
                .delete(handlers::delete_handler::<S>),
        )
        .route(
            "/{resource_type}/{id}/_history",
            get(handlers::history_instance_handler::<S>),
        )
        .route(
            "/{resource_type}/{id}/_history/{version_id}",
            get(handlers::vread_handler::<S>),
        )
        .with_state(state)
}
