//! Dialect conversion around the store.
//!
//! Writes are ingested: the body's dialect is taken from `Content-Type` or
//! detected, and the body is converted to the storage dialect. Reads are
//! rendered: the response dialect is negotiated from `Accept` and each
//! stored document is converted to it. Conversion notes and data loss never
//! fail a request; they travel back as `Warning` headers.

use hcs_persistence::core::ResourceStorage;
use hcs_persistence::types::{ResourceKind, StoredResource};
use hcs_persistence::versioning::{FhirDialect, VersionPreference};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RestError, RestResult};
use crate::state::AppState;

/// Confidence below which a detected dialect is logged as a guess.
const LOW_CONFIDENCE: f64 = 0.5;

/// A request body converted to the storage dialect.
#[derive(Debug)]
pub struct Ingested {
    /// The converted body.
    pub resource: Value,
    /// The dialect the client sent.
    pub source: FhirDialect,
    /// Conversion notes.
    pub warnings: Vec<String>,
}

/// A document ready to be returned to a client.
#[derive(Debug)]
pub struct Rendered {
    /// The converted document.
    pub resource: Value,
    /// Conversion notes.
    pub warnings: Vec<String>,
}

/// Converts an incoming body to the storage dialect.
///
/// A declared dialect wins over detection. A declared dialect the server
/// does not serve is rejected with 415.
pub fn ingest<S>(
    state: &AppState<S>,
    resource_type: &str,
    body: Value,
    declared: Option<FhirDialect>,
) -> RestResult<Ingested>
where
    S: ResourceStorage,
{
    let source = match declared {
        Some(dialect) => {
            if !state.negotiator().is_supported(dialect) {
                return Err(RestError::UnsupportedMediaType {
                    message: format!("fhirVersion {} is not served", dialect.version()),
                });
            }
            dialect
        }
        None => {
            let detection = state.detector().detect(&body);
            if detection.is_confident(LOW_CONFIDENCE) {
                debug!(
                    resource_type = resource_type,
                    dialect = %detection.dialect,
                    confidence = detection.confidence,
                    "Detected body dialect"
                );
            } else {
                warn!(
                    resource_type = resource_type,
                    dialect = %detection.dialect,
                    confidence = detection.confidence,
                    "Body dialect is a low-confidence guess"
                );
            }
            detection.dialect
        }
    };

    let target = state.storage_dialect();
    if source == target {
        return Ok(Ingested {
            resource: body,
            source,
            warnings: Vec::new(),
        });
    }

    let result = state
        .transformer()
        .transform(&body, source, target, resource_type)?;
    if !result.is_lossless() {
        warn!(
            resource_type = resource_type,
            from = %source,
            to = %target,
            lost = result.data_loss.len(),
            "Stored body lost content during conversion"
        );
    }

    Ok(Ingested {
        warnings: result.messages(),
        resource: result.resource,
        source,
    })
}

/// Picks the response dialect for documents of `kind`.
///
/// Fails with 406 when the client named dialects and none is served.
pub fn negotiate<S>(
    state: &AppState<S>,
    preferences: &[VersionPreference],
    kind: &ResourceKind,
) -> RestResult<FhirDialect>
where
    S: ResourceStorage,
{
    let negotiation = state
        .negotiator()
        .negotiate(preferences, state.storage_dialect(), kind)?;
    Ok(negotiation.target)
}

/// Converts a stored document to `target`.
pub fn render<S>(
    state: &AppState<S>,
    stored: &StoredResource,
    target: FhirDialect,
) -> RestResult<Rendered>
where
    S: ResourceStorage,
{
    let source = stored.fhir_version();
    if source == target {
        return Ok(Rendered {
            resource: stored.content().clone(),
            warnings: Vec::new(),
        });
    }

    let result =
        state
            .transformer()
            .transform(stored.content(), source, target, stored.resource_type())?;
    debug!(
        resource_type = stored.resource_type(),
        id = stored.id(),
        from = %source,
        to = %target,
        lossless = result.is_lossless(),
        "Rendered resource"
    );

    Ok(Rendered {
        warnings: result.messages(),
        resource: result.resource,
    })
}

/// Negotiates and renders a single stored document.
pub fn render_negotiated<S>(
    state: &AppState<S>,
    stored: &StoredResource,
    preferences: &[VersionPreference],
) -> RestResult<(Rendered, FhirDialect)>
where
    S: ResourceStorage,
{
    let negotiation =
        state
            .negotiator()
            .negotiate(preferences, stored.fhir_version(), &stored.kind())?;
    let rendered = render(state, stored, negotiation.target)?;
    Ok((rendered, negotiation.target))
}

/// Renders several documents to one dialect, gathering every warning.
pub fn render_all<'a, S, I>(
    state: &AppState<S>,
    resources: I,
    target: FhirDialect,
) -> RestResult<(Vec<Value>, Vec<String>)>
where
    S: ResourceStorage,
    I: IntoIterator<Item = &'a StoredResource>,
{
    let mut rendered = Vec::new();
    let mut warnings = Vec::new();
    for stored in resources {
        let result = render(state, stored, target)?;
        warnings.extend(
            result
                .warnings
                .into_iter()
                .map(|w| format!("{}: {}", stored.url(), w)),
        );
        rendered.push(result.resource);
    }
    Ok((rendered, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hcs_persistence::backends::sqlite::SqliteBackend;
    use serde_json::json;

    use crate::config::ServerConfig;

    fn state() -> AppState<SqliteBackend> {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        AppState::new(Arc::new(backend), ServerConfig::for_testing())
    }

    fn r5_medication_request() -> Value {
        json!({
            "resourceType": "MedicationRequest",
            "status": "active",
            "intent": "order",
            "medication": {"concept": {"text": "Aspirin"}},
            "subject": {"reference": "Patient/p1"}
        })
    }

    #[test]
    fn test_ingest_declared_dialect_converts_to_storage() {
        let state = state();
        let ingested = ingest(
            &state,
            "MedicationRequest",
            r5_medication_request(),
            Some(FhirDialect::R5),
        )
        .unwrap();

        assert_eq!(ingested.source, FhirDialect::R5);
        assert_eq!(
            ingested.resource["medicationCodeableConcept"]["text"],
            "Aspirin"
        );
        assert!(ingested.resource.get("medication").is_none());
        assert!(!ingested.warnings.is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_low_confidence_detection_is_logged_as_warning() {
        let state = state();
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let body = json!({"resourceType": "Patient", "gender": "female"});
        let ingested = tracing::subscriber::with_default(subscriber, || {
            ingest(&state, "Patient", body.clone(), None).unwrap()
        });

        assert_eq!(ingested.resource, body);
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("low-confidence guess"), "{output}");
    }

    #[test]
    fn test_ingest_storage_dialect_is_untouched() {
        let state = state();
        let body = json!({"resourceType": "Patient", "gender": "female"});
        let ingested = ingest(&state, "Patient", body.clone(), Some(FhirDialect::R4)).unwrap();

        assert_eq!(ingested.resource, body);
        assert!(ingested.warnings.is_empty());
    }

    #[test]
    fn test_ingest_rejects_unserved_dialect() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        let config = ServerConfig {
            fhir_versions: vec![FhirDialect::R4],
            ..ServerConfig::for_testing()
        };
        let state = AppState::new(Arc::new(backend), config);

        let err = ingest(
            &state,
            "MedicationRequest",
            r5_medication_request(),
            Some(FhirDialect::R5),
        )
        .unwrap_err();
        assert!(matches!(err, RestError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_negotiate_without_preferences_uses_storage() {
        let state = state();
        let kind = ResourceKind::parse("Patient");
        assert_eq!(negotiate(&state, &[], &kind).unwrap(), FhirDialect::R4);
    }

    #[test]
    fn test_negotiate_unknown_versions_is_not_acceptable() {
        let state = state();
        let kind = ResourceKind::parse("Patient");
        let err = negotiate(&state, &[VersionPreference::new("3.0")], &kind).unwrap_err();
        assert!(matches!(err, RestError::NotAcceptable { .. }));
    }

    #[test]
    fn test_render_to_newer_dialect() {
        let state = state();
        let stored = StoredResource::new(
            "MedicationRequest",
            "m1",
            json!({
                "resourceType": "MedicationRequest",
                "id": "m1",
                "status": "active",
                "intent": "order",
                "medicationCodeableConcept": {"text": "Aspirin"}
            }),
            FhirDialect::R4,
        );

        let rendered = render(&state, &stored, FhirDialect::R5).unwrap();
        assert_eq!(rendered.resource["medication"]["concept"]["text"], "Aspirin");
        assert!(!rendered.warnings.is_empty());
    }

    #[test]
    fn test_render_unavailable_kind_fails() {
        let state = state();
        let stored = StoredResource::new(
            "Media",
            "img",
            json!({"resourceType": "Media", "id": "img", "status": "completed"}),
            FhirDialect::R4,
        );

        let err = render(&state, &stored, FhirDialect::R5).unwrap_err();
        assert!(matches!(err, RestError::TransformationUnavailable { .. }));
    }
}
