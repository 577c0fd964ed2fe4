//! Shared helpers for the SQLite integration tests.

#![allow(dead_code)]

use serde_json::{Value, json};

use hcs_persistence::backends::sqlite::{SearchLimits, SqliteBackend, SqliteBackendConfig};
use hcs_persistence::context::RequestContext;
use hcs_persistence::core::{ResourceStorage, SearchProvider, SearchResult};
use hcs_persistence::search::parse_search_query;
use hcs_persistence::types::StoredResource;

pub fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

pub fn create_backend_with_limits(search: SearchLimits) -> SqliteBackend {
    let config = SqliteBackendConfig {
        search,
        ..Default::default()
    };
    let backend =
        SqliteBackend::with_config(":memory:", config).expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

/// Stores `body` under its own type and id.
pub async fn put(backend: &SqliteBackend, body: Value) -> StoredResource {
    let resource_type = body["resourceType"].as_str().expect("resourceType").to_string();
    let id = body["id"].as_str().expect("id").to_string();
    let (stored, _) = backend
        .create_or_update(&RequestContext::new(), &resource_type, &id, body)
        .await
        .expect("Failed to store fixture");
    stored
}

pub async fn search(backend: &SqliteBackend, resource_type: &str, query: &str) -> SearchResult {
    let parsed = parse_search_query(resource_type, query, backend.search_registry())
        .expect("Failed to parse query");
    backend
        .search(&RequestContext::new(), &parsed)
        .await
        .expect("Search failed")
}

/// Ids of the matches in result order.
pub async fn search_ids(backend: &SqliteBackend, resource_type: &str, query: &str) -> Vec<String> {
    search(backend, resource_type, query)
        .await
        .resources
        .items
        .iter()
        .map(|r| r.id().to_string())
        .collect()
}

/// Ids of the matches, sorted.
pub async fn matching_ids(backend: &SqliteBackend, resource_type: &str, query: &str) -> Vec<String> {
    let mut ids = search_ids(backend, resource_type, query).await;
    ids.sort();
    ids
}

pub fn patient(id: &str, family: &str, gender: &str, birth_date: Option<&str>) -> Value {
    let mut body = json!({
        "resourceType": "Patient",
        "id": id,
        "name": [{"family": family}],
        "gender": gender,
    });
    if let Some(date) = birth_date {
        body["birthDate"] = json!(date);
    }
    body
}

pub fn observation(id: &str, patient_id: &str, code: &str, value: f64, unit: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": code}]},
        "subject": {"reference": format!("Patient/{}", patient_id)},
        "valueQuantity": {
            "value": value,
            "unit": unit,
            "system": "http://unitsofmeasure.org",
            "code": unit,
        },
    })
}
