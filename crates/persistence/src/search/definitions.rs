//! The code-embedded search parameter table.
//!
//! Paths cover every dialect the store may hold: where R4 and R5 place a
//! value differently (for example `medicationCodeableConcept` versus
//! `medication.concept`), both paths are listed so the index is the same
//! whichever dialect the document was stored in.

use crate::types::{ResourceKind, SearchParamType};

use super::registry::SearchParameterDefinition;

fn def(code: &str, param_type: SearchParamType, paths: &[&str]) -> SearchParameterDefinition {
    SearchParameterDefinition::new(code, param_type, paths.iter().copied())
}

fn string(code: &str, paths: &[&str]) -> SearchParameterDefinition {
    def(code, SearchParamType::String, paths)
}

fn token(code: &str, paths: &[&str]) -> SearchParameterDefinition {
    def(code, SearchParamType::Token, paths)
}

fn date(code: &str, paths: &[&str]) -> SearchParameterDefinition {
    def(code, SearchParamType::Date, paths)
}

fn reference(code: &str, paths: &[&str], targets: &[ResourceKind]) -> SearchParameterDefinition {
    def(code, SearchParamType::Reference, paths).with_targets(targets.iter().cloned())
}

fn patient_ref(code: &str, paths: &[&str]) -> SearchParameterDefinition {
    reference(code, paths, &[ResourceKind::Patient])
}

/// Parameters every kind carries.
pub fn common_definitions() -> Vec<SearchParameterDefinition> {
    vec![
        def("_profile", SearchParamType::Uri, &["meta.profile"]),
        token("_tag", &["meta.tag"]),
        token("_security", &["meta.security"]),
    ]
}

/// Parameters specific to one kind.
pub fn definitions_for(kind: &ResourceKind) -> Vec<SearchParameterDefinition> {
    use ResourceKind as K;

    match kind {
        K::AllergyIntolerance => vec![
            token("clinical-status", &["clinicalStatus"]),
            token("verification-status", &["verificationStatus"]),
            token("category", &["category"]),
            token("criticality", &["criticality"]),
            token("code", &["code", "reaction.substance"]),
            patient_ref("patient", &["patient"]),
            date("onset", &["onset[x]"]),
            date("date", &["recordedDate"]),
        ],
        K::Condition => vec![
            token("clinical-status", &["clinicalStatus"]),
            token("verification-status", &["verificationStatus"]),
            token("category", &["category"]),
            token("code", &["code"]),
            token("severity", &["severity"]),
            reference(
                "subject",
                &["subject"],
                &[ResourceKind::Patient],
            ),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("onset-date", &["onset[x]"]),
            date("recorded-date", &["recordedDate"]),
        ],
        K::DiagnosticReport => vec![
            token("status", &["status"]),
            token("category", &["category"]),
            token("code", &["code"]),
            reference("subject", &["subject"], &[ResourceKind::Patient, ResourceKind::Location]),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("date", &["effective[x]"]),
            date("issued", &["issued"]),
            reference("result", &["result"], &[ResourceKind::Observation]),
            reference(
                "performer",
                &["performer"],
                &[ResourceKind::Practitioner, ResourceKind::Organization],
            ),
        ],
        K::Encounter => vec![
            token("status", &["status"]),
            token("class", &["class"]),
            token("type", &["type"]),
            reference("subject", &["subject"], &[ResourceKind::Patient]),
            patient_ref("patient", &["subject"]),
            date("date", &["period", "actualPeriod"]),
            reference(
                "participant",
                &["participant.individual", "participant.actor"],
                &[ResourceKind::Practitioner],
            ),
            reference(
                "location",
                &["location.location"],
                &[ResourceKind::Location],
            ),
            reference(
                "service-provider",
                &["serviceProvider"],
                &[ResourceKind::Organization],
            ),
        ],
        K::Immunization => vec![
            token("status", &["status"]),
            token("vaccine-code", &["vaccineCode"]),
            patient_ref("patient", &["patient"]),
            date("date", &["occurrence[x]"]),
            token("lot-number", &["lotNumber"]),
            reference(
                "performer",
                &["performer.actor"],
                &[ResourceKind::Practitioner, ResourceKind::Organization],
            ),
            reference("location", &["location"], &[ResourceKind::Location]),
        ],
        K::Location => vec![
            string("name", &["name", "alias"]),
            token("status", &["status"]),
            token("type", &["type"]),
            string("address", &["address"]),
            string("address-city", &["address.city"]),
            string("address-state", &["address.state"]),
            reference("organization", &["managingOrganization"], &[ResourceKind::Organization]),
            reference("partof", &["partOf"], &[ResourceKind::Location]),
        ],
        K::Media => vec![
            token("status", &["status"]),
            token("type", &["type"]),
            token("modality", &["modality"]),
            reference("subject", &["subject"], &[]),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("created", &["created[x]"]),
        ],
        K::Medication => vec![
            token("code", &["code"]),
            token("status", &["status"]),
            token("form", &["form", "doseForm"]),
            reference("manufacturer", &["manufacturer", "marketingAuthorizationHolder"], &[
                ResourceKind::Organization,
            ]),
            token("ingredient-code", &["ingredient.itemCodeableConcept", "ingredient.item.concept"]),
        ],
        K::MedicationRequest => vec![
            token("status", &["status"]),
            token("intent", &["intent"]),
            token("priority", &["priority"]),
            token("code", &["medicationCodeableConcept", "medication.concept"]),
            reference(
                "medication",
                &["medicationReference", "medication.reference"],
                &[ResourceKind::Medication],
            ),
            reference("subject", &["subject"], &[ResourceKind::Patient]),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("authoredon", &["authoredOn"]),
            reference(
                "requester",
                &["requester"],
                &[ResourceKind::Practitioner, ResourceKind::Organization, ResourceKind::Patient],
            ),
        ],
        K::Observation => vec![
            token("identifier", &["identifier"]),
            token("status", &["status"]),
            token("code", &["code"]),
            token("category", &["category"]),
            reference(
                "subject",
                &["subject"],
                &[ResourceKind::Patient, ResourceKind::Location],
            ),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("date", &["effective[x]"]),
            def("value-quantity", SearchParamType::Quantity, &["valueQuantity"]),
            token("value-concept", &["valueCodeableConcept"]),
            date("value-date", &["valueDateTime", "valuePeriod"]),
            string("value-string", &["valueString"]),
            reference(
                "performer",
                &["performer"],
                &[ResourceKind::Practitioner, ResourceKind::Organization, ResourceKind::Patient],
            ),
            reference("has-member", &["hasMember"], &[ResourceKind::Observation]),
            reference("derived-from", &["derivedFrom"], &[ResourceKind::Observation]),
            token("component-code", &["component.code"]),
            def(
                "component-value-quantity",
                SearchParamType::Quantity,
                &["component.valueQuantity"],
            ),
            def("code-value-quantity", SearchParamType::Composite, &[""])
                .with_component("code", SearchParamType::Token, "code")
                .with_component("value-quantity", SearchParamType::Quantity, "valueQuantity"),
            def(
                "component-code-value-quantity",
                SearchParamType::Composite,
                &["component"],
            )
            .with_component("code", SearchParamType::Token, "code")
            .with_component("value-quantity", SearchParamType::Quantity, "valueQuantity"),
            def("code-value-concept", SearchParamType::Composite, &[""])
                .with_component("code", SearchParamType::Token, "code")
                .with_component("value-concept", SearchParamType::Token, "valueCodeableConcept"),
        ],
        K::Organization => vec![
            token("identifier", &["identifier"]),
            string("name", &["name", "alias"]),
            token("active", &["active"]),
            token("type", &["type"]),
            string("address", &["address"]),
            string("address-city", &["address.city"]),
            reference("partof", &["partOf"], &[ResourceKind::Organization]),
        ],
        K::Patient => vec![
            token("identifier", &["identifier"]),
            string("name", &["name"]),
            string("family", &["name.family"]),
            string("given", &["name.given"]),
            token("gender", &["gender"]),
            date("birthdate", &["birthDate"]),
            token("active", &["active"]),
            string("address", &["address"]),
            string("address-city", &["address.city"]),
            string("address-postalcode", &["address.postalCode"]),
            token("telecom", &["telecom"]),
            reference(
                "organization",
                &["managingOrganization"],
                &[ResourceKind::Organization],
            ),
            reference(
                "general-practitioner",
                &["generalPractitioner"],
                &[ResourceKind::Practitioner, ResourceKind::Organization],
            ),
            token("deceased", &["deceasedBoolean"]),
        ],
        K::Practitioner => vec![
            token("identifier", &["identifier"]),
            string("name", &["name"]),
            string("family", &["name.family"]),
            string("given", &["name.given"]),
            token("active", &["active"]),
            token("gender", &["gender"]),
            token("telecom", &["telecom"]),
            string("address-city", &["address.city"]),
        ],
        K::Procedure => vec![
            token("status", &["status"]),
            token("code", &["code"]),
            token("category", &["category"]),
            reference("subject", &["subject"], &[ResourceKind::Patient]),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("date", &["performed[x]", "occurrence[x]"]),
            reference(
                "performer",
                &["performer.actor"],
                &[ResourceKind::Practitioner, ResourceKind::Organization],
            ),
            reference("location", &["location"], &[ResourceKind::Location]),
        ],
        K::Provenance => vec![
            reference("target", &["target"], &[]),
            patient_ref("patient", &["patient"]),
            reference(
                "agent",
                &["agent.who"],
                &[ResourceKind::Practitioner, ResourceKind::Organization, ResourceKind::Patient],
            ),
            date("recorded", &["recorded"]),
            token("activity", &["activity"]),
            reference("location", &["location"], &[ResourceKind::Location]),
        ],
        K::RiskAssessment => vec![
            token("status", &["status"]),
            token("method", &["method"]),
            reference("subject", &["subject"], &[ResourceKind::Patient]),
            patient_ref("patient", &["subject"]),
            reference("encounter", &["encounter"], &[ResourceKind::Encounter]),
            date("date", &["occurrence[x]"]),
            def(
                "probability",
                SearchParamType::Number,
                &["prediction.probabilityDecimal"],
            ),
            token("risk", &["prediction.qualitativeRisk"]),
            reference("performer", &["performer"], &[ResourceKind::Practitioner]),
        ],
        K::Unknown(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_kind_has_definitions() {
        for kind in ResourceKind::SUPPORTED {
            assert!(
                !definitions_for(kind).is_empty(),
                "no definitions for {}",
                kind
            );
        }
        assert!(definitions_for(&ResourceKind::Unknown("Basic".to_string())).is_empty());
    }

    #[test]
    fn test_codes_unique_per_kind() {
        for kind in ResourceKind::SUPPORTED {
            let mut codes: Vec<String> = definitions_for(kind)
                .into_iter()
                .chain(common_definitions())
                .map(|d| d.code)
                .collect();
            let before = codes.len();
            codes.sort();
            codes.dedup();
            assert_eq!(before, codes.len(), "duplicate code on {}", kind);
        }
    }

    #[test]
    fn test_composites_have_components() {
        for kind in ResourceKind::SUPPORTED {
            for def in definitions_for(kind) {
                if def.param_type == SearchParamType::Composite {
                    assert!(def.components.len() >= 2, "{}.{}", kind, def.code);
                }
            }
        }
    }

    #[test]
    fn test_medication_request_code_covers_both_dialects() {
        let code = definitions_for(&ResourceKind::MedicationRequest)
            .into_iter()
            .find(|d| d.code == "code")
            .unwrap();
        assert!(code.paths.contains(&"medicationCodeableConcept".to_string()));
        assert!(code.paths.contains(&"medication.concept".to_string()));
    }
}
