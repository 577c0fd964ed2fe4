//! Search over HTTP.
//!
//! Tests the searchset bundle: match/include/outcome entries, paging links,
//! totals, POST search and dialect rendering of every entry.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};

async fn seed_chart(backend: &hcs_persistence::backends::sqlite::SqliteBackend) {
    seed_patient(backend, "p1", "Smith").await;
    seed_patient(backend, "p2", "Smythe").await;
    seed_patient(backend, "p3", "Jones").await;
    seed(
        backend,
        json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "category": [{"coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                "code": "vital-signs"
            }]}],
            "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
            "subject": {"reference": "Patient/p1"},
            "effectiveDateTime": "2024-02-01"
        }),
    )
    .await;
    seed(
        backend,
        json!({
            "resourceType": "Observation",
            "id": "o2",
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
            "subject": {"reference": "http://localhost:8080/Patient/p2"},
            "effectiveDateTime": "2023-06-01"
        }),
    )
    .await;
}

#[tokio::test]
async fn test_search_returns_searchset() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let response = server.get("/Patient?family=Sm&_sort=family").await;

    response.assert_status_ok();
    let bundle: Value = response.json();
    assert_eq!(bundle["resourceType"], "Bundle");
    assert_eq!(bundle["type"], "searchset");
    assert_eq!(bundle["total"], 2);
    assert_eq!(match_ids(&bundle), vec!["p1", "p2"]);
    assert_eq!(
        bundle["entry"][0]["fullUrl"],
        "http://localhost:8080/Patient/p1"
    );
}

#[tokio::test]
async fn test_reference_forms_search_alike() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let by_id: Value = server.get("/Observation?patient=p1").await.json();
    let by_relative: Value = server.get("/Observation?patient=Patient/p1").await.json();
    assert_eq!(match_ids(&by_id), vec!["o1"]);
    assert_eq!(match_ids(&by_relative), vec!["o1"]);

    let absolute: Value = server.get("/Observation?subject=Patient/p2").await.json();
    assert_eq!(match_ids(&absolute), vec!["o2"]);
}

#[tokio::test]
async fn test_include_attaches_subject() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let bundle: Value = server
        .get("/Observation?_id=o1&_include=Observation:patient&_count=1")
        .await
        .json();

    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["search"]["mode"], "match");
    assert_eq!(entries[0]["resource"]["id"], "o1");
    assert_eq!(entries[1]["search"]["mode"], "include");
    assert_eq!(entries[1]["resource"]["id"], "p1");
}

#[tokio::test]
async fn test_chain_and_has() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let chained: Value = server
        .get("/Observation?subject:Patient.family=Smythe")
        .await
        .json();
    assert_eq!(match_ids(&chained), vec!["o2"]);

    let reverse: Value = server
        .get("/Patient?_has:Observation:patient:code=8867-4&_sort=_id")
        .await
        .json();
    assert_eq!(match_ids(&reverse), vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_vital_signs_since_date() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let bundle: Value = server
        .get("/Observation?patient=p1&category=vital-signs&date=ge2024-01-01")
        .await
        .json();

    assert_eq!(match_ids(&bundle), vec!["o1"]);
}

#[tokio::test]
async fn test_unknown_parameter_is_reported() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let bundle: Value = server.get("/Patient?family=Jones&shoe-size=9").await.json();

    assert_eq!(match_ids(&bundle), vec!["p3"]);
    let outcome = bundle["entry"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["search"]["mode"] == "outcome")
        .expect("outcome entry");
    assert_eq!(outcome["resource"]["resourceType"], "OperationOutcome");
    assert_eq!(outcome["resource"]["issue"][0]["code"], "not-supported");
}

#[tokio::test]
async fn test_bad_parameter_value_is_400() {
    let (server, _backend) = create_test_server();

    let response = server.get("/Patient?birthdate=xx2020").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["resourceType"], "OperationOutcome");
}

#[tokio::test]
async fn test_paging_links() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let first: Value = server.get("/Patient?_sort=_id&_count=2").await.json();
    assert_eq!(match_ids(&first), vec!["p1", "p2"]);
    assert_eq!(first["total"], 3);

    let next = first["link"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["relation"] == "next")
        .and_then(|l| l["url"].as_str())
        .expect("next link")
        .trim_start_matches("http://localhost:8080")
        .to_string();

    let second: Value = server.get(&next).await.json();
    assert_eq!(match_ids(&second), vec!["p3"]);
    assert!(
        second["link"]
            .as_array()
            .unwrap()
            .iter()
            .any(|l| l["relation"] == "previous")
    );
    assert!(
        !second["link"]
            .as_array()
            .unwrap()
            .iter()
            .any(|l| l["relation"] == "next")
    );
}

#[tokio::test]
async fn test_total_modes() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let none: Value = server.get("/Patient?_total=none").await.json();
    assert!(none.get("total").is_none());

    let count_only: Value = server.get("/Patient?_count=0").await.json();
    assert_eq!(count_only["total"], 3);
    assert!(match_ids(&count_only).is_empty());
}

#[tokio::test]
async fn test_deleted_resources_are_not_found() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    server
        .delete("/Patient/p3")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let bundle: Value = server.get("/Patient?family=Jones").await.json();
    assert!(match_ids(&bundle).is_empty());
    assert_eq!(bundle["total"], 0);
}

#[tokio::test]
async fn test_post_search() {
    let (server, backend) = create_test_server();
    seed_chart(&backend).await;

    let response = server
        .post("/Patient/_search?_sort=_id")
        .text("family=Sm")
        .content_type("application/x-www-form-urlencoded")
        .await;

    response.assert_status_ok();
    let bundle: Value = response.json();
    assert_eq!(match_ids(&bundle), vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_search_renders_in_accepted_dialect() {
    let (server, backend) = create_test_server();
    seed(
        &backend,
        json!({
            "resourceType": "MedicationRequest",
            "id": "rx-1",
            "status": "active",
            "intent": "order",
            "medicationCodeableConcept": {"text": "Aspirin"},
            "subject": {"reference": "Patient/p1"}
        }),
    )
    .await;
    seed_patient(&backend, "p1", "Smith").await;

    let response = server
        .get("/MedicationRequest?status=active&_include=MedicationRequest:subject")
        .add_header(ACCEPT, header_value(R5_JSON))
        .await;

    response.assert_status_ok();
    assert_eq!(
        header(&response, "content-type").as_deref(),
        Some("application/fhir+json; fhirVersion=5.0.0")
    );
    let bundle: Value = response.json();
    assert_eq!(
        bundle["entry"][0]["resource"]["medication"]["concept"]["text"],
        "Aspirin"
    );
    assert_eq!(bundle["entry"][1]["resource"]["id"], "p1");
}
