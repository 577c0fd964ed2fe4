//! Dialect detection for incoming documents.
//!
//! Detection combines three kinds of evidence:
//!
//! 1. An explicit version tag (`meta.tag` in the `FHIR-version` code system,
//!    or a root `fhirVersion` element). This is conclusive.
//! 2. Profile URLs in `meta.profile` that embed a release path.
//! 3. Structural fingerprints: fields that only one dialect uses, taken from
//!    the transformation plans.
//!
//! Without any evidence the lowest dialect is assumed at low confidence. The
//! confidence is reported, never enforced.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ResourceKind;

use super::dialect::FhirDialect;
use super::plans::PlanRegistry;
use super::rules::FieldEffect;

/// Code system of the explicit version tag.
pub const FHIR_VERSION_TAG_SYSTEM: &str = "http://hl7.org/fhir/FHIR-version";

/// Confidence reported when nothing points at any dialect.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

const PROFILE_WEIGHT: f64 = 0.6;
const STRUCTURE_WEIGHT: f64 = 0.4;

const PROFILE_MARKERS: &[(&str, FhirDialect)] = &[
    ("/R4/", FhirDialect::R4),
    ("/4.0/", FhirDialect::R4),
    ("/4.0.1/", FhirDialect::R4),
    ("/R5/", FhirDialect::R5),
    ("/5.0/", FhirDialect::R5),
    ("/5.0.0/", FhirDialect::R5),
    ("/R6/", FhirDialect::R6),
    ("/6.0/", FhirDialect::R6),
];

/// Outcome of detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The most likely dialect.
    pub dialect: FhirDialect,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable reasons, strongest first.
    pub evidence: Vec<String>,
}

impl DetectionResult {
    /// Returns true if the confidence reaches `threshold`.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

/// Detects the dialect of a document.
#[derive(Debug, Clone)]
pub struct VersionDetector {
    plans: Arc<PlanRegistry>,
}

impl VersionDetector {
    /// Creates a detector using the given plans for structural fingerprints.
    pub fn new(plans: Arc<PlanRegistry>) -> Self {
        Self { plans }
    }

    /// Detects the dialect of `resource`.
    pub fn detect(&self, resource: &Value) -> DetectionResult {
        if let Some(explicit) = explicit_version(resource) {
            return explicit;
        }

        let mut scores: BTreeMap<FhirDialect, f64> = BTreeMap::new();
        let mut evidence = Vec::new();

        for profile in profiles(resource) {
            for (marker, dialect) in PROFILE_MARKERS {
                if profile.contains(marker) {
                    *scores.entry(*dialect).or_default() += PROFILE_WEIGHT;
                    evidence.push(format!("profile {} is a {} profile", profile, dialect));
                    break;
                }
            }
        }

        if let (Some(obj), Some(resource_type)) = (
            resource.as_object(),
            resource.get("resourceType").and_then(Value::as_str),
        ) {
            let kind = ResourceKind::parse(resource_type);
            for dialect in FhirDialect::ALL {
                for (plan_kind, plan) in self.plans.plans_from(*dialect) {
                    if *plan_kind != kind {
                        continue;
                    }
                    for rule in plan.fingerprints(obj) {
                        let field = match rule.effect() {
                            FieldEffect::Preserved(f)
                            | FieldEffect::MaybeLost(f)
                            | FieldEffect::Lost(f) => f,
                        };
                        *scores.entry(*dialect).or_default() += STRUCTURE_WEIGHT;
                        evidence.push(format!(
                            "{}.{} has {} structure",
                            resource_type, field, dialect
                        ));
                    }
                }
            }
        }

        let total: f64 = scores.values().sum();
        if total <= 0.0 {
            return DetectionResult {
                dialect: FhirDialect::ALL[0],
                confidence: FALLBACK_CONFIDENCE,
                evidence: vec![format!(
                    "no version markers found; assuming {}",
                    FhirDialect::ALL[0]
                )],
            };
        }

        // BTreeMap iterates oldest first; a strict comparison keeps the
        // older dialect on ties.
        let mut best = (FhirDialect::ALL[0], 0.0);
        for (dialect, score) in &scores {
            if *score > best.1 {
                best = (*dialect, *score);
            }
        }

        let confidence = ((best.1 / total) * (1.0 - (-2.0 * total).exp())).clamp(0.0, 1.0);

        tracing::debug!(
            dialect = %best.0,
            confidence = confidence,
            evidence = evidence.len(),
            "Detected FHIR dialect"
        );

        DetectionResult {
            dialect: best.0,
            confidence,
            evidence,
        }
    }
}

impl Default for VersionDetector {
    fn default() -> Self {
        Self::new(Arc::new(PlanRegistry::standard()))
    }
}

fn explicit_version(resource: &Value) -> Option<DetectionResult> {
    let tagged = resource
        .pointer("/meta/tag")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|tag| tag.get("system").and_then(Value::as_str) == Some(FHIR_VERSION_TAG_SYSTEM))
        .find_map(|tag| tag.get("code").and_then(Value::as_str))
        .map(|code| (code, "meta.tag"));

    let declared = || {
        resource
            .get("fhirVersion")
            .and_then(Value::as_str)
            .map(|v| (v, "fhirVersion element"))
    };

    let (raw, source) = tagged.or_else(declared)?;
    let dialect = FhirDialect::parse(raw)?;
    Some(DetectionResult {
        dialect,
        confidence: 1.0,
        evidence: vec![format!("{} declares version {}", source, raw)],
    })
}

fn profiles(resource: &Value) -> impl Iterator<Item = &str> {
    resource
        .pointer("/meta/profile")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}
