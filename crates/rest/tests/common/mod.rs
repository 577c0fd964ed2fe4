//! Shared harness for the REST integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestResponse, TestServer};
use hcs_persistence::backends::sqlite::SqliteBackend;
use hcs_persistence::context::RequestContext;
use hcs_persistence::core::ResourceStorage;
use hcs_persistence::types::StoredResource;
use hcs_rest::{AppState, ServerConfig, create_routes};
use serde_json::{Value, json};

pub const ACCEPT: HeaderName = HeaderName::from_static("accept");
pub const IF_MATCH: HeaderName = HeaderName::from_static("if-match");
pub const IF_NONE_MATCH: HeaderName = HeaderName::from_static("if-none-match");
pub const IF_NONE_EXIST: HeaderName = HeaderName::from_static("if-none-exist");

pub const R5_JSON: &str = "application/fhir+json; fhirVersion=5.0";

/// Creates a test server over an in-memory store.
pub fn create_test_server() -> (TestServer, Arc<SqliteBackend>) {
    create_test_server_with(ServerConfig::for_testing())
}

pub fn create_test_server_with(config: ServerConfig) -> (TestServer, Arc<SqliteBackend>) {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to init schema");
    let backend = Arc::new(backend);

    let state = AppState::new(Arc::clone(&backend), config);
    let server = TestServer::new(create_routes(state)).expect("Failed to create test server");

    (server, backend)
}

/// Stores `body` under its own type and id.
pub async fn seed(backend: &SqliteBackend, body: Value) -> StoredResource {
    let resource_type = body["resourceType"].as_str().expect("resourceType").to_string();
    let id = body["id"].as_str().expect("id").to_string();
    let (stored, _) = backend
        .create_or_update(&RequestContext::new(), &resource_type, &id, body)
        .await
        .expect("Failed to seed resource");
    stored
}

pub async fn seed_patient(backend: &SqliteBackend, id: &str, family: &str) -> StoredResource {
    seed(
        backend,
        json!({
            "resourceType": "Patient",
            "id": id,
            "name": [{"family": family}],
            "active": true
        }),
    )
    .await
}

pub fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).expect("valid header value")
}

pub fn header(response: &TestResponse, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// All `Warning` header values of a response.
pub fn warnings(response: &TestResponse) -> Vec<String> {
    response
        .headers()
        .get_all("warning")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

/// First issue code of an OperationOutcome body.
pub fn issue_code(body: &Value) -> Option<&str> {
    body["issue"][0]["code"].as_str()
}

/// Ids of the `match` entries of a searchset bundle, in order.
pub fn match_ids(bundle: &Value) -> Vec<String> {
    bundle["entry"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|e| e["search"]["mode"] == "match")
        .filter_map(|e| e["resource"]["id"].as_str())
        .map(String::from)
        .collect()
}
