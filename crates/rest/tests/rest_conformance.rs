//! REST API conformance tests.
//!
//! Tests standard FHIR REST behaviors:
//! - HTTP status codes (200, 201, 204, 304, 400, 404, 409, 410, 412, 415)
//! - Response headers (ETag, Last-Modified, Location, Content-Type)
//! - Conditional operations (If-Match, If-None-Match, If-None-Exist, criteria)
//! - Instance history paging

mod common;

use axum::http::StatusCode;
use common::*;
use hcs_persistence::context::RequestContext;
use hcs_persistence::core::ResourceStorage;
use serde_json::{Value, json};

// =============================================================================
// Create
// =============================================================================

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_201_with_headers() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Smith"}]}))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        let id = body["id"].as_str().expect("server-assigned id");

        assert_eq!(body["meta"]["versionId"], "1");
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"1\""));
        assert!(header(&response, "last-modified").is_some());
        assert_eq!(
            header(&response, "location"),
            Some(format!("http://localhost:8080/Patient/{}/_history/1", id))
        );
        assert_eq!(
            header(&response, "content-type").as_deref(),
            Some("application/fhir+json; fhirVersion=4.0.1")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_type_mismatch() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .json(&json!({"resourceType": "Observation", "status": "final"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["resourceType"], "OperationOutcome");
        assert_eq!(issue_code(&body), Some("invalid"));
    }

    #[tokio::test]
    async fn test_create_rejects_non_json_body() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .text("<Patient xmlns=\"http://hl7.org/fhir\"/>")
            .await;

        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_create_unparsable_date_is_unprocessable() {
        let (server, backend) = create_test_server();

        let response = server
            .post("/Patient")
            .json(&json!({"resourceType": "Patient", "birthDate": "1980-02-31"}))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            backend
                .count(&RequestContext::new(), Some("Patient"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_conditional_create_updates_single_match() {
        let (server, backend) = create_test_server();
        seed(
            &backend,
            json!({
                "resourceType": "Patient",
                "id": "mrn-1",
                "identifier": [{"system": "urn:mrn", "value": "1"}]
            }),
        )
        .await;

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, header_value("identifier=urn:mrn|1"))
            .json(&json!({
                "resourceType": "Patient",
                "identifier": [{"system": "urn:mrn", "value": "1"}],
                "gender": "female"
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["id"], "mrn-1");
        assert_eq!(body["gender"], "female");
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"2\""));
        assert!(header(&response, "location").is_none());
    }

    #[tokio::test]
    async fn test_conditional_create_without_match_creates() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, header_value("identifier=urn:mrn|2"))
            .json(&json!({
                "resourceType": "Patient",
                "identifier": [{"system": "urn:mrn", "value": "2"}]
            }))
            .await;

        response.assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_conditional_create_multiple_matches() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "a", "Twin").await;
        seed_patient(&backend, "b", "Twin").await;

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, header_value("family=Twin"))
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Twin"}]}))
            .await;

        response.assert_status(StatusCode::PRECONDITION_FAILED);
        let body: Value = response.json();
        assert_eq!(issue_code(&body), Some("multiple-matches"));
    }
}

// =============================================================================
// Read and vread
// =============================================================================

mod read {
    use super::*;

    #[tokio::test]
    async fn test_read_returns_200() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;

        let response = server.get("/Patient/patient-1").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"][0]["family"], "Smith");
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"1\""));
    }

    #[tokio::test]
    async fn test_read_missing_returns_404() {
        let (server, _backend) = create_test_server();

        let response = server.get("/Patient/nobody").await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(issue_code(&body), Some("not-found"));
    }

    #[tokio::test]
    async fn test_read_unknown_type_returns_400() {
        let (server, _backend) = create_test_server();

        let response = server.get("/Spaceship/1").await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_if_none_match_returns_304() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;

        let response = server
            .get("/Patient/patient-1")
            .add_header(IF_NONE_MATCH, header_value("W/\"1\""))
            .await;
        response.assert_status(StatusCode::NOT_MODIFIED);

        let response = server
            .get("/Patient/patient-1")
            .add_header(IF_NONE_MATCH, header_value("W/\"7\""))
            .await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn test_vread() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;
        seed_patient(&backend, "patient-1", "Jones").await;

        let response = server.get("/Patient/patient-1/_history/1").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["name"][0]["family"], "Smith");
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"1\""));

        server
            .get("/Patient/patient-1/_history/99")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/Patient/patient-1/_history/latest")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_vread_deletion_marker_is_gone() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;
        server
            .delete("/Patient/patient-1")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = server.get("/Patient/patient-1/_history/2").await;
        response.assert_status(StatusCode::GONE);
        let body: Value = response.json();
        assert_eq!(issue_code(&body), Some("deleted"));

        server
            .get("/Patient/patient-1/_history/1")
            .await
            .assert_status_ok();
    }
}

// =============================================================================
// Update
// =============================================================================

mod update {
    use super::*;

    #[tokio::test]
    async fn test_update_existing_returns_200() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;

        let response = server
            .put("/Patient/patient-1")
            .json(&json!({"resourceType": "Patient", "id": "patient-1", "name": [{"family": "Jones"}]}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["meta"]["versionId"], "2");
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"2\""));
        assert!(header(&response, "location").is_none());
    }

    #[tokio::test]
    async fn test_update_new_id_returns_201() {
        let (server, _backend) = create_test_server();

        let response = server
            .put("/Patient/chosen-id")
            .json(&json!({"resourceType": "Patient", "id": "chosen-id"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(
            header(&response, "location").as_deref(),
            Some("http://localhost:8080/Patient/chosen-id/_history/1")
        );
    }

    #[tokio::test]
    async fn test_update_id_mismatch_returns_400() {
        let (server, _backend) = create_test_server();

        let response = server
            .put("/Patient/one")
            .json(&json!({"resourceType": "Patient", "id": "two"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_if_match() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;
        let body = json!({"resourceType": "Patient", "id": "patient-1", "gender": "male"});

        let response = server
            .put("/Patient/patient-1")
            .add_header(IF_MATCH, header_value("W/\"1\""))
            .json(&body)
            .await;
        response.assert_status_ok();

        let response = server
            .put("/Patient/patient-1")
            .add_header(IF_MATCH, header_value("W/\"1\""))
            .json(&body)
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let outcome: Value = response.json();
        assert_eq!(issue_code(&outcome), Some("conflict"));

        let response = server
            .put("/Patient/patient-1")
            .add_header(IF_MATCH, header_value("not-a-version"))
            .json(&body)
            .await;
        response.assert_status(StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let (server, _backend) = create_test_server();
        let body = json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:mrn", "value": "7"}],
            "gender": "other"
        });

        let response = server
            .put("/Patient?identifier=urn:mrn|7")
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();

        let response = server
            .put("/Patient?identifier=urn:mrn|7")
            .json(&body)
            .await;
        response.assert_status_ok();
        let updated: Value = response.json();
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["meta"]["versionId"], "2");
    }

    #[tokio::test]
    async fn test_conditional_update_requires_criteria() {
        let (server, _backend) = create_test_server();

        let response = server
            .put("/Patient")
            .json(&json!({"resourceType": "Patient"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

// =============================================================================
// Delete
// =============================================================================

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;

        let response = server.delete("/Patient/patient-1").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"2\""));

        server
            .get("/Patient/patient-1")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = server.delete("/Patient/patient-1").await;
        response.assert_status(StatusCode::NO_CONTENT);
        assert_eq!(header(&response, "etag").as_deref(), Some("W/\"3\""));
    }

    #[tokio::test]
    async fn test_delete_unknown_returns_404() {
        let (server, _backend) = create_test_server();

        server
            .delete("/Patient/never-existed")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_conditional_delete() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "patient-1", "Smith").await;

        server
            .delete("/Patient?family=Nobody")
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete("/Patient?family=Smith")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        assert!(
            backend
                .read(&RequestContext::new(), "Patient", "patient-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_conditional_delete_multiple_matches() {
        let (server, backend) = create_test_server();
        seed_patient(&backend, "a", "Twin").await;
        seed_patient(&backend, "b", "Twin").await;

        server
            .delete("/Patient?family=Twin")
            .await
            .assert_status(StatusCode::PRECONDITION_FAILED);
    }
}

// =============================================================================
// History
// =============================================================================

mod history {
    use super::*;

    async fn seed_three_versions(server: &axum_test::TestServer) {
        server
            .put("/Patient/h1")
            .json(&json!({"resourceType": "Patient", "id": "h1", "gender": "female"}))
            .await
            .assert_status(StatusCode::CREATED);
        server
            .put("/Patient/h1")
            .json(&json!({"resourceType": "Patient", "id": "h1", "gender": "male"}))
            .await
            .assert_status_ok();
        server
            .delete("/Patient/h1")
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_history_lists_versions_newest_first() {
        let (server, _backend) = create_test_server();
        seed_three_versions(&server).await;

        let response = server.get("/Patient/h1/_history").await;
        response.assert_status_ok();
        let bundle: Value = response.json();

        assert_eq!(bundle["type"], "history");
        assert_eq!(bundle["total"], 3);
        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0]["request"]["method"], "DELETE");
        assert!(entries[0].get("resource").is_none());
        assert_eq!(entries[1]["resource"]["gender"], "male");
        assert_eq!(entries[2]["resource"]["gender"], "female");
        assert_eq!(entries[2]["response"]["etag"], "W/\"1\"");
    }

    #[tokio::test]
    async fn test_history_paging_follows_next_link() {
        let (server, _backend) = create_test_server();
        seed_three_versions(&server).await;

        let first: Value = server.get("/Patient/h1/_history?_count=2").await.json();
        assert_eq!(first["entry"].as_array().unwrap().len(), 2);

        let next = first["link"]
            .as_array()
            .unwrap()
            .iter()
            .find(|l| l["relation"] == "next")
            .and_then(|l| l["url"].as_str())
            .expect("next link")
            .trim_start_matches("http://localhost:8080")
            .to_string();
        assert!(next.contains("_cursor="));

        let second: Value = server.get(&next).await.json();
        let entries = second["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["response"]["etag"], "W/\"1\"");
    }

    #[tokio::test]
    async fn test_history_rejects_bad_since() {
        let (server, _backend) = create_test_server();
        seed_three_versions(&server).await;

        server
            .get("/Patient/h1/_history?_since=last-tuesday")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_of_unknown_resource() {
        let (server, _backend) = create_test_server();

        server
            .get("/Patient/ghost/_history")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
