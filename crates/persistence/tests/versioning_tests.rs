//! Stored dialects and conversion of stored documents.

mod common;

use serde_json::json;

use common::put;
use hcs_persistence::backends::sqlite::{SqliteBackend, SqliteBackendConfig};
use hcs_persistence::context::RequestContext;
use hcs_persistence::core::{HistoryParams, InstanceHistoryProvider, ResourceStorage, VersionedStorage};
use hcs_persistence::versioning::{
    CompatibilityLevel, FhirDialect, VersionError, VersionNegotiator, VersionPreference,
    VersionTransformer,
};

fn open(path: &std::path::Path, dialect: FhirDialect) -> SqliteBackend {
    let config = SqliteBackendConfig {
        storage_dialect: dialect,
        ..Default::default()
    };
    let backend = SqliteBackend::with_config(path, config).unwrap();
    backend.init_schema().unwrap();
    backend
}

fn r4_request(status: &str) -> serde_json::Value {
    json!({
        "resourceType": "MedicationRequest",
        "id": "rx-1",
        "status": status,
        "intent": "order",
        "medicationCodeableConcept": {"text": "Aspirin"}
    })
}

#[tokio::test]
async fn test_rows_keep_the_dialect_they_were_written_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dialects.db");
    let ctx = RequestContext::new();

    {
        let backend = open(&path, FhirDialect::R4);
        put(&backend, r4_request("active")).await;
    }

    let backend = open(&path, FhirDialect::R5);
    assert_eq!(backend.storage_dialect(), FhirDialect::R5);

    let stored = backend.read(&ctx, "MedicationRequest", "rx-1").await.unwrap().unwrap();
    assert_eq!(stored.fhir_version(), FhirDialect::R4);

    put(
        &backend,
        json!({
            "resourceType": "MedicationRequest",
            "id": "rx-1",
            "status": "completed",
            "intent": "order",
            "medication": {"concept": {"text": "Aspirin"}}
        }),
    )
    .await;

    let v1 = backend.vread(&ctx, "MedicationRequest", "rx-1", 1).await.unwrap();
    let v2 = backend.vread(&ctx, "MedicationRequest", "rx-1", 2).await.unwrap();
    assert_eq!(v1.fhir_version(), FhirDialect::R4);
    assert_eq!(v2.fhir_version(), FhirDialect::R5);

    let page = backend
        .history_instance(&ctx, "MedicationRequest", "rx-1", &HistoryParams::default())
        .await
        .unwrap();
    let dialects: Vec<_> = page
        .items
        .iter()
        .map(|e| e.resource.fhir_version())
        .collect();
    assert_eq!(dialects, vec![FhirDialect::R5, FhirDialect::R4]);
}

#[tokio::test]
async fn test_mixed_history_renders_in_one_dialect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("render.db");
    let ctx = RequestContext::new();

    {
        let backend = open(&path, FhirDialect::R4);
        put(&backend, r4_request("active")).await;
    }
    let backend = open(&path, FhirDialect::R5);
    put(
        &backend,
        json!({
            "resourceType": "MedicationRequest",
            "id": "rx-1",
            "status": "completed",
            "intent": "order",
            "medication": {"concept": {"text": "Aspirin"}}
        }),
    )
    .await;

    let transformer = VersionTransformer::default();
    let page = backend
        .history_instance(&ctx, "MedicationRequest", "rx-1", &HistoryParams::default())
        .await
        .unwrap();

    for entry in &page.items {
        let rendered = transformer
            .transform(
                entry.resource.content(),
                entry.resource.fhir_version(),
                FhirDialect::R4,
                "MedicationRequest",
            )
            .unwrap();
        assert_eq!(rendered.resource["medicationCodeableConcept"]["text"], "Aspirin");
        assert!(rendered.resource.get("medication").is_none());
    }
}

#[tokio::test]
async fn test_negotiation_against_stored_kind() {
    let backend = common::create_backend();
    let stored = put(
        &backend,
        json!({"resourceType": "Media", "id": "img", "status": "completed"}),
    )
    .await;

    let negotiator = VersionNegotiator::default();
    let result = negotiator
        .negotiate(
            &[VersionPreference::new("5.0")],
            stored.fhir_version(),
            &stored.kind(),
        )
        .unwrap();
    assert_eq!(result.target, FhirDialect::R5);
    assert_eq!(result.compatibility.level, CompatibilityLevel::None);

    let err = VersionTransformer::default()
        .transform(stored.content(), stored.fhir_version(), result.target, "Media")
        .unwrap_err();
    assert!(matches!(err, VersionError::TransformationUnavailable { .. }));
}
