//! Transformation plans and the plan registry.
//!
//! A plan is the ordered list of [`TransformRule`]s converting one kind
//! between two adjacent dialects. Plans are registered in pairs: the reverse
//! plan is the inverse of each forward rule, applied in reverse order. Kinds
//! without a registered plan for a hop use the default plan, which only
//! audits cross-version extensions.
//!
//! Only R4↔R5 plans are registered. R6 is treated as structurally identical
//! to R5 for every kind the store knows, so the R5↔R6 hop always takes the
//! default plan and reports full compatibility.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::types::ResourceKind;

use super::compatibility::VersionCompatibility;
use super::dialect::FhirDialect;
use super::rules::{DataLossEvent, FieldEffect, RuleLog, TransformRule, parse_cross_version_url};

const MEDICATION_VARIANTS: &[(&str, &str)] =
    &[("CodeableConcept", "concept"), ("Reference", "reference")];

const REASONS: TransformRule = TransformRule::MergeReasons {
    codes: "reasonCode",
    references: "reasonReference",
    target: "reason",
};

/// Rules converting one kind from `source` to the adjacent `target`.
#[derive(Debug, Clone)]
pub struct TransformationPlan {
    /// Dialect the plan reads.
    pub source: FhirDialect,
    /// Dialect the plan writes.
    pub target: FhirDialect,
    /// Rules in application order.
    pub rules: Vec<TransformRule>,
    /// Elements that exist only in the target dialect.
    pub added_fields: Vec<&'static str>,
}

impl TransformationPlan {
    /// Creates a plan with the given rules.
    pub fn new(source: FhirDialect, target: FhirDialect, rules: Vec<TransformRule>) -> Self {
        Self {
            source,
            target,
            rules,
            added_fields: Vec::new(),
        }
    }

    /// The fallback plan used when no plan is registered for a kind.
    pub fn passthrough(source: FhirDialect, target: FhirDialect) -> Self {
        Self::new(source, target, Vec::new())
    }

    /// Returns the reverse plan. Dropped elements become added fields of
    /// the reverse direction.
    pub fn reversed(&self) -> Self {
        let mut reverse = Self::passthrough(self.target, self.source);
        for rule in self.rules.iter().rev() {
            match (rule.inverse(), rule) {
                (Some(inverse), _) => reverse.rules.push(inverse),
                (None, TransformRule::Drop { field, .. }) => reverse.added_fields.push(*field),
                (None, _) => {}
            }
        }
        reverse
    }

    /// Applies every rule, then audits cross-version extensions left behind.
    pub fn apply(&self, resource_type: &str, obj: &mut Map<String, Value>, log: &mut RuleLog) {
        for rule in &self.rules {
            rule.apply(resource_type, obj, log);
        }
        self.audit_extensions(resource_type, obj, log);
    }

    /// Records target-dialect content still parked in cross-version
    /// extensions. The extensions round-trip untouched, but the native
    /// element is not restored because no rule maps it.
    fn audit_extensions(&self, resource_type: &str, obj: &Map<String, Value>, log: &mut RuleLog) {
        let Some(extensions) = obj.get("extension").and_then(Value::as_array) else {
            return;
        };
        for url in extensions
            .iter()
            .filter_map(|ext| ext.get("url").and_then(Value::as_str))
        {
            let Some((origin, element)) = parse_cross_version_url(url) else {
                continue;
            };
            if origin == self.target {
                log.data_loss.push(DataLossEvent::new(
                    element,
                    format!(
                        "no restore step from {} to {}; left as extension {}",
                        self.source, self.target, url
                    ),
                ));
                tracing::debug!(
                    resource_type = resource_type,
                    url = url,
                    "Cross-version extension has no restore rule"
                );
            }
        }
    }

    /// Returns the rules whose source fields `obj` carries. Each hit is
    /// evidence the document is in the plan's source dialect.
    pub fn fingerprints(&self, obj: &Map<String, Value>) -> Vec<&TransformRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches_source(obj))
            .collect()
    }

    /// Derives the compatibility of this single hop.
    pub fn compatibility(&self, kind: &ResourceKind) -> VersionCompatibility {
        let mut preserved = Vec::new();
        let mut lost = Vec::new();
        let mut conditional = false;
        for rule in &self.rules {
            match rule.effect() {
                FieldEffect::Preserved(field) => preserved.push(field),
                FieldEffect::MaybeLost(field) => {
                    conditional = true;
                    preserved.push(field);
                }
                FieldEffect::Lost(field) => lost.push(field),
            }
        }
        VersionCompatibility::from_fields(
            kind,
            self.source,
            self.target,
            preserved,
            lost,
            self.added_fields.iter().map(|f| f.to_string()).collect(),
            conditional,
        )
    }
}

/// Plans keyed by kind and adjacent dialect pair.
#[derive(Debug, Clone, Default)]
pub struct PlanRegistry {
    plans: HashMap<(ResourceKind, FhirDialect, FhirDialect), TransformationPlan>,
}

impl PlanRegistry {
    /// Creates an empty registry; every kind uses the default plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the registry holding the standard R4/R5 mappings. R5/R6 hops
    /// fall through to the default plan.
    pub fn standard() -> Self {
        use FhirDialect::{R4, R5};
        use TransformRule::*;

        let mut registry = Self::new();

        registry.register_pair(
            ResourceKind::MedicationRequest,
            TransformationPlan::new(
                R4,
                R5,
                vec![
                    ChoiceToNested {
                        prefix: "medication",
                        target: "medication",
                        variants: MEDICATION_VARIANTS,
                    },
                    REASONS,
                    RestoreFromExtension {
                        field: "informationSource",
                        origin: R5,
                        repeating: true,
                    },
                ],
            ),
        );

        registry.register_pair(
            ResourceKind::Procedure,
            TransformationPlan::new(
                R4,
                R5,
                vec![
                    RenameChoice {
                        from: "performed",
                        to: "occurrence",
                    },
                    REASONS,
                ],
            ),
        );

        registry.register_pair(
            ResourceKind::Immunization,
            TransformationPlan::new(R4, R5, vec![REASONS]),
        );

        registry.register_pair(
            ResourceKind::Encounter,
            TransformationPlan::new(
                R5,
                R4,
                vec![
                    Drop {
                        field: "virtualService",
                        reason: "no R4 counterpart",
                    },
                    ConceptListToCoding { field: "class" },
                    Rename {
                        from: "actualPeriod",
                        to: "period",
                    },
                    Rename {
                        from: "admission",
                        to: "hospitalization",
                    },
                ],
            ),
        );

        registry
    }

    /// Registers a plan and its reverse.
    pub fn register_pair(&mut self, kind: ResourceKind, plan: TransformationPlan) {
        let reverse = plan.reversed();
        self.register(kind.clone(), reverse);
        self.register(kind, plan);
    }

    /// Registers a single-direction plan, replacing any existing one.
    pub fn register(&mut self, kind: ResourceKind, plan: TransformationPlan) {
        self.plans.insert((kind, plan.source, plan.target), plan);
    }

    /// Returns the registered plan for an adjacent hop.
    pub fn get(
        &self,
        kind: &ResourceKind,
        source: FhirDialect,
        target: FhirDialect,
    ) -> Option<&TransformationPlan> {
        self.plans.get(&(kind.clone(), source, target))
    }

    /// Returns the plan for a hop, falling back to the default plan.
    pub fn plan_for(
        &self,
        kind: &ResourceKind,
        source: FhirDialect,
        target: FhirDialect,
    ) -> TransformationPlan {
        self.get(kind, source, target)
            .cloned()
            .unwrap_or_else(|| TransformationPlan::passthrough(source, target))
    }

    /// Returns all registered plans reading `source`, sorted for stable
    /// iteration.
    pub fn plans_from(&self, source: FhirDialect) -> Vec<(&ResourceKind, &TransformationPlan)> {
        let mut plans: Vec<_> = self
            .plans
            .iter()
            .filter(|((_, s, _), _)| *s == source)
            .map(|((kind, _, _), plan)| (kind, plan))
            .collect();
        plans.sort_by(|a, b| (a.0.as_str(), a.1.target).cmp(&(b.0.as_str(), b.1.target)));
        plans
    }

    /// Computes the compatibility of `kind` between any two dialects,
    /// composing adjacent hops.
    pub fn compatibility(
        &self,
        kind: &ResourceKind,
        source: FhirDialect,
        target: FhirDialect,
    ) -> VersionCompatibility {
        if !kind.is_available_in(source) || !kind.is_available_in(target) {
            return VersionCompatibility::unavailable(kind, source, target);
        }

        source
            .hops_to(target)
            .into_iter()
            .map(|(from, to)| self.plan_for(kind, from, to).compatibility(kind))
            .reduce(|acc, hop| acc.then(&hop))
            .unwrap_or_else(|| VersionCompatibility::full(kind, source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::CompatibilityLevel;

    #[test]
    fn test_pairs_registered_both_ways() {
        let registry = PlanRegistry::standard();
        for kind in [
            ResourceKind::MedicationRequest,
            ResourceKind::Procedure,
            ResourceKind::Immunization,
            ResourceKind::Encounter,
        ] {
            assert!(registry.get(&kind, FhirDialect::R4, FhirDialect::R5).is_some());
            assert!(registry.get(&kind, FhirDialect::R5, FhirDialect::R4).is_some());
        }
        assert!(
            registry
                .get(&ResourceKind::Patient, FhirDialect::R4, FhirDialect::R5)
                .is_none()
        );
    }

    #[test]
    fn test_reverse_plan_marks_added_fields() {
        let registry = PlanRegistry::standard();
        let forward = registry
            .get(&ResourceKind::Encounter, FhirDialect::R4, FhirDialect::R5)
            .unwrap();
        assert_eq!(forward.added_fields, vec!["virtualService"]);
        assert!(matches!(
            forward.rules[0],
            TransformRule::Rename { from: "hospitalization", to: "admission" }
        ));
    }

    #[test]
    fn test_compatibility() {
        let registry = PlanRegistry::standard();

        let patient = registry.compatibility(&ResourceKind::Patient, FhirDialect::R4, FhirDialect::R6);
        assert_eq!(patient.level, CompatibilityLevel::Full);

        let encounter =
            registry.compatibility(&ResourceKind::Encounter, FhirDialect::R6, FhirDialect::R4);
        assert_eq!(encounter.level, CompatibilityLevel::Partial);
        assert_eq!(encounter.lost_fields, vec!["virtualService".to_string()]);

        let media = registry.compatibility(&ResourceKind::Media, FhirDialect::R4, FhirDialect::R5);
        assert_eq!(media.level, CompatibilityLevel::None);
    }

    #[test]
    fn test_r5_r6_hop_is_passthrough() {
        let registry = PlanRegistry::standard();

        for kind in [ResourceKind::MedicationRequest, ResourceKind::Encounter] {
            assert!(registry.get(&kind, FhirDialect::R5, FhirDialect::R6).is_none());
            let compat = registry.compatibility(&kind, FhirDialect::R5, FhirDialect::R6);
            assert_eq!(compat.level, CompatibilityLevel::Full);
            assert!(compat.lost_fields.is_empty());
        }
    }

    #[test]
    fn test_default_plan_audits_extensions() {
        let plan = TransformationPlan::passthrough(FhirDialect::R4, FhirDialect::R5);
        let mut obj = match serde_json::json!({
            "extension": [{
                "url": "http://hl7.org/fhir/5.0/StructureDefinition/extension-Patient.foo",
                "valueString": "x"
            }]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let mut log = RuleLog::default();
        plan.apply("Patient", &mut obj, &mut log);
        assert_eq!(log.data_loss.len(), 1);
        assert_eq!(log.data_loss[0].field, "Patient.foo");
        assert!(obj.contains_key("extension"));
    }
}
