//! Document conversion between dialects.
//!
//! Adjacent dialects are converted by the kind's [`TransformationPlan`];
//! conversions spanning several releases compose the adjacent plans through
//! the intermediate dialects, concatenating warnings and data-loss events.
//!
//! [`TransformationPlan`]: super::plans::TransformationPlan

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ResourceKind;

use super::compatibility::VersionCompatibility;
use super::detector::FHIR_VERSION_TAG_SYSTEM;
use super::dialect::FhirDialect;
use super::error::VersionError;
use super::plans::PlanRegistry;
use super::rules::{DataLossEvent, RuleLog};

/// Output of a conversion.
///
/// Lossy conversions still succeed; callers inspect `data_loss` to decide
/// whether to proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    /// The converted document.
    pub resource: Value,
    /// Dialect converted from.
    pub source: FhirDialect,
    /// Dialect converted to.
    pub target: FhirDialect,
    /// Notes about structural changes, in application order.
    pub warnings: Vec<String>,
    /// Content that could not be carried over, in application order.
    pub data_loss: Vec<DataLossEvent>,
    /// Always true for a returned result.
    pub success: bool,
}

impl TransformationResult {
    /// Returns true if nothing was lost.
    pub fn is_lossless(&self) -> bool {
        self.data_loss.is_empty()
    }

    /// Returns warnings followed by data-loss events, one line each.
    pub fn messages(&self) -> Vec<String> {
        self.warnings
            .iter()
            .cloned()
            .chain(self.data_loss.iter().map(|loss| format!("data loss: {}", loss)))
            .collect()
    }
}

/// Converts documents between dialects using a plan registry.
#[derive(Debug, Clone)]
pub struct VersionTransformer {
    plans: Arc<PlanRegistry>,
}

impl VersionTransformer {
    /// Creates a transformer over the given plans.
    pub fn new(plans: Arc<PlanRegistry>) -> Self {
        Self { plans }
    }

    /// Returns the plan registry.
    pub fn plans(&self) -> &Arc<PlanRegistry> {
        &self.plans
    }

    /// Returns the compatibility of `resource_type` between two dialects.
    pub fn compatibility(
        &self,
        resource_type: &str,
        source: FhirDialect,
        target: FhirDialect,
    ) -> VersionCompatibility {
        self.plans
            .compatibility(&ResourceKind::parse(resource_type), source, target)
    }

    /// Converts `resource` from `source` to `target`.
    ///
    /// Fails only when the kind does not exist in one of the dialects or the
    /// document is not an object.
    pub fn transform(
        &self,
        resource: &Value,
        source: FhirDialect,
        target: FhirDialect,
        resource_type: &str,
    ) -> Result<TransformationResult, VersionError> {
        let kind = ResourceKind::parse(resource_type);
        if !kind.is_available_in(source) || !kind.is_available_in(target) {
            tracing::debug!(
                resource_type = resource_type,
                from = %source,
                to = %target,
                "No transformation path"
            );
            return Err(VersionError::TransformationUnavailable {
                resource_type: resource_type.to_string(),
                source_dialect: source,
                target_dialect: target,
                compatibility: Box::new(VersionCompatibility::unavailable(&kind, source, target)),
            });
        }

        let Value::Object(mut obj) = resource.clone() else {
            return Err(VersionError::InvalidDocument {
                resource_type: resource_type.to_string(),
            });
        };

        let mut log = RuleLog::default();
        for (from, to) in source.hops_to(target) {
            self.plans.plan_for(&kind, from, to).apply(resource_type, &mut obj, &mut log);
        }

        let mut resource = Value::Object(obj);
        if source != target {
            retag_version(&mut resource, target);
        }

        if !log.data_loss.is_empty() {
            tracing::warn!(
                resource_type = resource_type,
                from = %source,
                to = %target,
                lost = log.data_loss.len(),
                "Transformation dropped data"
            );
        }

        Ok(TransformationResult {
            resource,
            source,
            target,
            warnings: log.warnings,
            data_loss: log.data_loss,
            success: true,
        })
    }
}

impl Default for VersionTransformer {
    fn default() -> Self {
        Self::new(Arc::new(PlanRegistry::standard()))
    }
}

/// Rewrites an explicit version tag so it agrees with the new dialect.
fn retag_version(resource: &mut Value, target: FhirDialect) {
    let Some(tags) = resource.pointer_mut("/meta/tag").and_then(Value::as_array_mut) else {
        return;
    };
    for tag in tags {
        if tag.get("system").and_then(Value::as_str) == Some(FHIR_VERSION_TAG_SYSTEM) {
            tag["code"] = Value::String(target.version().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::CompatibilityLevel;
    use serde_json::json;

    fn transformer() -> VersionTransformer {
        VersionTransformer::default()
    }

    #[test]
    fn test_medication_request_round_trip() {
        let t = transformer();
        let r4 = json!({
            "resourceType": "MedicationRequest",
            "id": "m1",
            "status": "active",
            "medicationCodeableConcept": {"text": "Aspirin"}
        });

        let r5 = t
            .transform(&r4, FhirDialect::R4, FhirDialect::R5, "MedicationRequest")
            .unwrap();
        assert_eq!(r5.resource["medication"], json!({"concept": {"text": "Aspirin"}}));
        assert!(r5.resource.get("medicationCodeableConcept").is_none());
        assert!(r5.warnings.iter().any(|w| w.contains("medicationCodeableConcept")));
        assert!(r5.success);

        let back = t
            .transform(&r5.resource, FhirDialect::R5, FhirDialect::R4, "MedicationRequest")
            .unwrap();
        assert_eq!(back.resource, r4);
        assert!(back.is_lossless());
    }

    #[test]
    fn test_r4_to_r6_composes_through_r5() {
        let t = transformer();
        let r4 = json!({
            "resourceType": "Procedure",
            "performedPeriod": {"start": "2024-01-01"},
            "reasonCode": [{"text": "pain"}]
        });

        let r6 = t
            .transform(&r4, FhirDialect::R4, FhirDialect::R6, "Procedure")
            .unwrap();
        assert!(r6.resource.get("occurrencePeriod").is_some());
        assert_eq!(r6.resource["reason"][0]["concept"]["text"], "pain");
        assert_eq!(r6.warnings.len(), 2);

        let back = t
            .transform(&r6.resource, FhirDialect::R6, FhirDialect::R4, "Procedure")
            .unwrap();
        assert_eq!(back.resource, r4);
    }

    #[test]
    fn test_lossy_encounter_reports_loss() {
        let r5 = json!({
            "resourceType": "Encounter",
            "class": [{"coding": [{"code": "AMB"}]}],
            "actualPeriod": {"start": "2024-01-01"},
            "virtualService": [{"addressUrl": "https://meet.example.org"}]
        });

        let r4 = transformer()
            .transform(&r5, FhirDialect::R5, FhirDialect::R4, "Encounter")
            .unwrap();
        assert!(r4.success);
        assert_eq!(r4.resource["class"], json!({"code": "AMB"}));
        assert!(r4.resource.get("period").is_some());
        assert!(r4.resource.get("virtualService").is_none());
        assert_eq!(r4.data_loss.len(), 1);
        assert_eq!(r4.data_loss[0].field, "Encounter.virtualService");
    }

    #[test]
    fn test_information_source_survives_r4() {
        let t = transformer();
        let r5 = json!({
            "resourceType": "MedicationRequest",
            "medication": {"reference": {"reference": "Medication/1"}},
            "informationSource": [{"reference": "Practitioner/p1"}]
        });

        let r4 = t
            .transform(&r5, FhirDialect::R5, FhirDialect::R4, "MedicationRequest")
            .unwrap();
        assert!(r4.resource.get("informationSource").is_none());
        assert_eq!(r4.resource["extension"].as_array().unwrap().len(), 1);
        assert!(r4.is_lossless());

        let back = t
            .transform(&r4.resource, FhirDialect::R4, FhirDialect::R5, "MedicationRequest")
            .unwrap();
        assert_eq!(back.resource, r5);
    }

    #[test]
    fn test_media_unavailable() {
        let err = transformer()
            .transform(
                &json!({"resourceType": "Media"}),
                FhirDialect::R4,
                FhirDialect::R5,
                "Media",
            )
            .unwrap_err();
        match err {
            VersionError::TransformationUnavailable { compatibility, .. } => {
                assert_eq!(compatibility.level, CompatibilityLevel::None)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unregistered_kind_uses_default_plan() {
        let patient = json!({
            "resourceType": "Patient",
            "meta": {"tag": [{"system": FHIR_VERSION_TAG_SYSTEM, "code": "4.0.1"}]},
            "extension": [{"url": "http://example.org/custom", "valueString": "kept"}]
        });
        let result = transformer()
            .transform(&patient, FhirDialect::R4, FhirDialect::R5, "Patient")
            .unwrap();
        assert_eq!(result.resource["extension"], patient["extension"]);
        assert_eq!(result.resource["meta"]["tag"][0]["code"], "5.0.0");
        assert!(result.warnings.is_empty());
        assert!(result.is_lossless());
    }

    #[test]
    fn test_same_dialect_is_identity() {
        let doc = json!({"resourceType": "Observation", "status": "final"});
        let result = transformer()
            .transform(&doc, FhirDialect::R5, FhirDialect::R5, "Observation")
            .unwrap();
        assert_eq!(result.resource, doc);
    }
}
