//! Field-mapping rules applied by transformation plans.
//!
//! Each rule rewrites one structural difference between two adjacent
//! dialects on a top-level JSON object. Rules never fail: content that has
//! no place in the target is recorded as a [`DataLossEvent`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::dialect::FhirDialect;

/// A named piece of content that did not survive a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLossEvent {
    /// Element path, e.g. `Encounter.virtualService`.
    pub field: String,
    /// What happened to it.
    pub reason: String,
}

impl DataLossEvent {
    /// Creates a data-loss event.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for DataLossEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Warnings and data-loss events accumulated while applying rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleLog {
    /// Human-readable notes, in application order.
    pub warnings: Vec<String>,
    /// Content that was dropped, in application order.
    pub data_loss: Vec<DataLossEvent>,
}

impl RuleLog {
    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn lose(&mut self, field: String, reason: impl Into<String>) {
        self.data_loss.push(DataLossEvent::new(field, reason));
    }
}

/// How a rule affects the fields of a kind, for compatibility reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEffect {
    /// The field is carried across, possibly renamed or reshaped.
    Preserved(String),
    /// The field is carried across but some documents lose part of it.
    MaybeLost(String),
    /// The field has no counterpart in the target.
    Lost(String),
}

/// A single structural mapping between adjacent dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformRule {
    /// Renames a top-level element.
    Rename {
        from: &'static str,
        to: &'static str,
    },

    /// Replaces choice variants `{prefix}{Suffix}` with a single object at
    /// `target` holding the value under the variant's nested key.
    ChoiceToNested {
        prefix: &'static str,
        target: &'static str,
        variants: &'static [(&'static str, &'static str)],
    },

    /// Inverse of [`TransformRule::ChoiceToNested`]. At most one variant can
    /// be populated in the target.
    NestedToChoice {
        prefix: &'static str,
        source: &'static str,
        variants: &'static [(&'static str, &'static str)],
    },

    /// Renames every choice variant of `from` to the same variant of `to`,
    /// e.g. `performedDateTime` to `occurrenceDateTime`.
    RenameChoice {
        from: &'static str,
        to: &'static str,
    },

    /// Folds a CodeableConcept list and a Reference list into one
    /// CodeableReference list.
    MergeReasons {
        codes: &'static str,
        references: &'static str,
        target: &'static str,
    },

    /// Inverse of [`TransformRule::MergeReasons`].
    SplitReasons {
        source: &'static str,
        codes: &'static str,
        references: &'static str,
    },

    /// Wraps a single Coding into a one-element CodeableConcept list.
    CodingToConceptList { field: &'static str },

    /// Takes the first Coding of the first concept. Lossy when the list holds
    /// more than one coding.
    ConceptListToCoding { field: &'static str },

    /// Moves an element with no target counterpart into cross-version
    /// extensions so it can be restored later.
    ExtractToExtension {
        field: &'static str,
        origin: FhirDialect,
    },

    /// Restores an element from the cross-version extensions written by
    /// [`TransformRule::ExtractToExtension`].
    RestoreFromExtension {
        field: &'static str,
        origin: FhirDialect,
        repeating: bool,
    },

    /// Removes an element that cannot be represented in the target.
    Drop {
        field: &'static str,
        reason: &'static str,
    },
}

impl TransformRule {
    /// Returns the rule undoing this one, if any.
    pub fn inverse(&self) -> Option<TransformRule> {
        use TransformRule::*;
        Some(match *self {
            Rename { from, to } => Rename { from: to, to: from },
            ChoiceToNested {
                prefix,
                target,
                variants,
            } => NestedToChoice {
                prefix,
                source: target,
                variants,
            },
            NestedToChoice {
                prefix,
                source,
                variants,
            } => ChoiceToNested {
                prefix,
                target: source,
                variants,
            },
            RenameChoice { from, to } => RenameChoice { from: to, to: from },
            MergeReasons {
                codes,
                references,
                target,
            } => SplitReasons {
                source: target,
                codes,
                references,
            },
            SplitReasons {
                source,
                codes,
                references,
            } => MergeReasons {
                codes,
                references,
                target: source,
            },
            CodingToConceptList { field } => ConceptListToCoding { field },
            ConceptListToCoding { field } => CodingToConceptList { field },
            ExtractToExtension { field, origin } => RestoreFromExtension {
                field,
                origin,
                repeating: true,
            },
            RestoreFromExtension { field, origin, .. } => ExtractToExtension { field, origin },
            Drop { .. } => return None,
        })
    }

    /// Returns the field this rule affects, for compatibility reporting.
    pub fn effect(&self) -> FieldEffect {
        use TransformRule::*;
        match *self {
            Rename { from, .. } | RenameChoice { from, .. } => FieldEffect::Preserved(from.into()),
            ChoiceToNested { prefix, .. } => FieldEffect::Preserved(format!("{}[x]", prefix)),
            NestedToChoice { source, .. } => FieldEffect::MaybeLost(source.into()),
            MergeReasons { codes, .. } => FieldEffect::Preserved(codes.into()),
            SplitReasons { source, .. } => FieldEffect::Preserved(source.into()),
            CodingToConceptList { field } => FieldEffect::Preserved(field.into()),
            ConceptListToCoding { field } => FieldEffect::MaybeLost(field.into()),
            ExtractToExtension { field, .. } | RestoreFromExtension { field, .. } => {
                FieldEffect::Preserved(field.into())
            }
            Drop { field, .. } => FieldEffect::Lost(field.into()),
        }
    }

    /// Returns true if the document carries a field this rule reads, i.e. the
    /// document looks like it is in the rule's source dialect.
    pub fn matches_source(&self, obj: &Map<String, Value>) -> bool {
        use TransformRule::*;
        match *self {
            Rename { from, .. } => obj.contains_key(from),
            ChoiceToNested {
                prefix, variants, ..
            } => variants
                .iter()
                .any(|(suffix, _)| obj.contains_key(&format!("{}{}", prefix, suffix))),
            NestedToChoice { source, .. } => obj.get(source).is_some_and(Value::is_object),
            RenameChoice { from, .. } => obj.keys().any(|k| is_choice_variant(k, from)),
            MergeReasons {
                codes, references, ..
            } => obj.contains_key(codes) || obj.contains_key(references),
            SplitReasons { source, .. } => obj.contains_key(source),
            CodingToConceptList { field } => obj.get(field).is_some_and(Value::is_object),
            ConceptListToCoding { field } => obj.get(field).is_some_and(Value::is_array),
            // Extension rules and drops describe content that may be absent in
            // either dialect, so they carry no fingerprint.
            ExtractToExtension { .. } | RestoreFromExtension { .. } | Drop { .. } => false,
        }
    }

    /// Applies the rule in place.
    pub fn apply(&self, resource_type: &str, obj: &mut Map<String, Value>, log: &mut RuleLog) {
        use TransformRule::*;
        let path = |field: &str| format!("{}.{}", resource_type, field);

        match *self {
            Rename { from, to } => {
                if let Some(value) = obj.remove(from) {
                    obj.insert(to.to_string(), value);
                    log.warn(format!("{} renamed to {}", path(from), to));
                }
            }

            ChoiceToNested {
                prefix,
                target,
                variants,
            } => {
                let mut nested: Option<(String, Map<String, Value>)> = None;
                for (suffix, key) in variants {
                    let variant = format!("{}{}", prefix, suffix);
                    let Some(value) = obj.remove(&variant) else {
                        continue;
                    };
                    if let Some((first, _)) = &nested {
                        log.lose(
                            path(&variant),
                            format!("choice already populated by {}", first),
                        );
                        continue;
                    }
                    let mut inner = Map::new();
                    inner.insert(key.to_string(), value);
                    nested = Some((variant, inner));
                }
                if let Some((variant, inner)) = nested {
                    let moved_to = inner.keys().next().cloned().unwrap_or_default();
                    obj.insert(target.to_string(), Value::Object(inner));
                    log.warn(format!(
                        "{} moved to {}.{}",
                        path(&variant),
                        target,
                        moved_to
                    ));
                }
            }

            NestedToChoice {
                prefix,
                source,
                variants,
            } => {
                let Some(Value::Object(mut inner)) = obj.remove(source) else {
                    return;
                };
                let mut placed = false;
                for (suffix, key) in variants {
                    let Some(value) = inner.remove(*key) else {
                        continue;
                    };
                    if placed {
                        log.lose(
                            path(&format!("{}.{}", source, key)),
                            "only one choice variant can be represented",
                        );
                        continue;
                    }
                    let variant = format!("{}{}", prefix, suffix);
                    log.warn(format!("{}.{} moved to {}", path(source), key, variant));
                    obj.insert(variant, value);
                    placed = true;
                }
                for key in inner.keys() {
                    log.lose(
                        path(&format!("{}.{}", source, key)),
                        "no counterpart in target dialect",
                    );
                }
            }

            RenameChoice { from, to } => {
                let variants: Vec<String> = obj
                    .keys()
                    .filter(|k| is_choice_variant(k, from))
                    .cloned()
                    .collect();
                for variant in variants {
                    if let Some(value) = obj.remove(&variant) {
                        let renamed = format!("{}{}", to, &variant[from.len()..]);
                        log.warn(format!("{} renamed to {}", path(&variant), renamed));
                        obj.insert(renamed, value);
                    }
                }
            }

            MergeReasons {
                codes,
                references,
                target,
            } => {
                let mut merged = Vec::new();
                for concept in take_list(obj, codes) {
                    merged.push(json!({ "concept": concept }));
                }
                for reference in take_list(obj, references) {
                    merged.push(json!({ "reference": reference }));
                }
                if !merged.is_empty() {
                    obj.insert(target.to_string(), Value::Array(merged));
                    log.warn(format!(
                        "{} and {} merged into {}",
                        path(codes),
                        references,
                        target
                    ));
                }
            }

            SplitReasons {
                source,
                codes,
                references,
            } => {
                let entries = take_list(obj, source);
                if entries.is_empty() {
                    return;
                }
                let mut concepts = Vec::new();
                let mut refs = Vec::new();
                for entry in entries {
                    let Value::Object(mut entry) = entry else {
                        continue;
                    };
                    if let Some(concept) = entry.remove("concept") {
                        concepts.push(concept);
                    }
                    if let Some(reference) = entry.remove("reference") {
                        refs.push(reference);
                    }
                    for key in entry.keys() {
                        log.lose(
                            path(&format!("{}.{}", source, key)),
                            "no counterpart in target dialect",
                        );
                    }
                }
                if !concepts.is_empty() {
                    obj.insert(codes.to_string(), Value::Array(concepts));
                }
                if !refs.is_empty() {
                    obj.insert(references.to_string(), Value::Array(refs));
                }
                log.warn(format!(
                    "{} split into {} and {}",
                    path(source),
                    codes,
                    references
                ));
            }

            CodingToConceptList { field } => {
                if obj.get(field).is_some_and(Value::is_object) {
                    if let Some(coding) = obj.remove(field) {
                        obj.insert(field.to_string(), json!([{ "coding": [coding] }]));
                        log.warn(format!("{} wrapped into a CodeableConcept list", path(field)));
                    }
                }
            }

            ConceptListToCoding { field } => {
                if !obj.get(field).is_some_and(Value::is_array) {
                    return;
                }
                let concepts = take_list(obj, field);
                let mut codings = concepts
                    .iter()
                    .flat_map(|c| c.get("coding").and_then(Value::as_array).into_iter().flatten());
                match codings.next() {
                    Some(first) => {
                        obj.insert(field.to_string(), first.clone());
                        log.warn(format!("{} reduced to its first Coding", path(field)));
                    }
                    None => log.lose(path(field), "no Coding to carry over"),
                }
                let dropped = codings.count();
                if dropped > 0 {
                    log.lose(
                        path(field),
                        format!("{} additional coding(s) cannot be represented", dropped),
                    );
                }
            }

            ExtractToExtension { field, origin } => {
                let Some(value) = obj.remove(field) else {
                    return;
                };
                let url = cross_version_extension_url(origin, resource_type, field);
                let values = match value {
                    Value::Array(items) => items,
                    single => vec![single],
                };
                let mut extensions = take_list(obj, "extension");
                for value in values {
                    let mut ext = Map::new();
                    ext.insert("url".to_string(), Value::String(url.clone()));
                    ext.insert(extension_value_key(&value).to_string(), value);
                    extensions.push(Value::Object(ext));
                }
                obj.insert("extension".to_string(), Value::Array(extensions));
                log.warn(format!("{} preserved as extension {}", path(field), url));
            }

            RestoreFromExtension {
                field,
                origin,
                repeating,
            } => {
                let url = cross_version_extension_url(origin, resource_type, field);
                let Some(Value::Array(extensions)) = obj.remove("extension") else {
                    return;
                };
                let (matching, rest): (Vec<Value>, Vec<Value>) = extensions
                    .into_iter()
                    .partition(|ext| ext.get("url").and_then(Value::as_str) == Some(url.as_str()));
                if !rest.is_empty() {
                    obj.insert("extension".to_string(), Value::Array(rest));
                }

                let mut values: Vec<Value> = matching
                    .into_iter()
                    .filter_map(|ext| match ext {
                        Value::Object(map) => map
                            .into_iter()
                            .find(|(k, _)| k.starts_with("value"))
                            .map(|(_, v)| v),
                        _ => None,
                    })
                    .collect();
                if values.is_empty() {
                    return;
                }
                let restored = if repeating {
                    Value::Array(values)
                } else {
                    let first = values.remove(0);
                    if !values.is_empty() {
                        log.lose(path(field), "multiple extension values for a single element");
                    }
                    first
                };
                obj.insert(field.to_string(), restored);
                log.warn(format!("{} restored from extension", path(field)));
            }

            Drop { field, reason } => {
                if obj.remove(field).is_some() {
                    log.lose(path(field), reason);
                }
            }
        }
    }
}

/// Builds the URL of a cross-version extension carrying `Type.field` from
/// `origin`.
pub fn cross_version_extension_url(origin: FhirDialect, resource_type: &str, field: &str) -> String {
    format!(
        "http://hl7.org/fhir/{}/StructureDefinition/extension-{}.{}",
        origin.major_minor(),
        resource_type,
        field
    )
}

/// Parses a cross-version extension URL into `(origin, "Type.field")`.
pub fn parse_cross_version_url(url: &str) -> Option<(FhirDialect, &str)> {
    let rest = url.strip_prefix("http://hl7.org/fhir/")?;
    let (version, rest) = rest.split_once('/')?;
    let element = rest.strip_prefix("StructureDefinition/extension-")?;
    Some((FhirDialect::parse(version)?, element))
}

fn is_choice_variant(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

fn take_list(obj: &mut Map<String, Value>, field: &str) -> Vec<Value> {
    match obj.remove(field) {
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

fn extension_value_key(value: &Value) -> &'static str {
    match value {
        Value::Object(map) if map.contains_key("reference") || map.contains_key("identifier") => {
            "valueReference"
        }
        Value::Object(map) if map.contains_key("coding") || map.contains_key("text") => {
            "valueCodeableConcept"
        }
        Value::Object(map) if map.contains_key("system") && map.contains_key("code") => {
            "valueCoding"
        }
        Value::Bool(_) => "valueBoolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "valueInteger",
        Value::Number(_) => "valueDecimal",
        Value::String(_) => "valueString",
        _ => "valueReference",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEDICATION: TransformRule = TransformRule::ChoiceToNested {
        prefix: "medication",
        target: "medication",
        variants: &[("CodeableConcept", "concept"), ("Reference", "reference")],
    };

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_choice_to_nested_and_back() {
        let mut doc = obj(json!({"medicationCodeableConcept": {"text": "Aspirin"}}));
        let mut log = RuleLog::default();

        MEDICATION.apply("MedicationRequest", &mut doc, &mut log);
        assert_eq!(
            Value::Object(doc.clone()),
            json!({"medication": {"concept": {"text": "Aspirin"}}})
        );
        assert!(log.warnings[0].contains("medicationCodeableConcept"));

        MEDICATION.inverse().unwrap().apply("MedicationRequest", &mut doc, &mut log);
        assert_eq!(
            Value::Object(doc),
            json!({"medicationCodeableConcept": {"text": "Aspirin"}})
        );
        assert!(log.data_loss.is_empty());
    }

    #[test]
    fn test_nested_to_choice_with_both_variants_loses_one() {
        let mut doc = obj(json!({
            "medication": {"concept": {"text": "A"}, "reference": {"reference": "Medication/1"}}
        }));
        let mut log = RuleLog::default();
        MEDICATION.inverse().unwrap().apply("MedicationRequest", &mut doc, &mut log);
        assert!(doc.contains_key("medicationCodeableConcept"));
        assert!(!doc.contains_key("medicationReference"));
        assert_eq!(log.data_loss[0].field, "MedicationRequest.medication.reference");
    }

    #[test]
    fn test_rename_choice() {
        let rule = TransformRule::RenameChoice {
            from: "performed",
            to: "occurrence",
        };
        let mut doc = obj(json!({"performedDateTime": "2024-01-01", "performer": []}));
        rule.apply("Procedure", &mut doc, &mut RuleLog::default());
        assert!(doc.contains_key("occurrenceDateTime"));
        assert!(doc.contains_key("performer"));
    }

    #[test]
    fn test_reasons_round_trip() {
        let rule = TransformRule::MergeReasons {
            codes: "reasonCode",
            references: "reasonReference",
            target: "reason",
        };
        let original = json!({
            "reasonCode": [{"text": "pain"}],
            "reasonReference": [{"reference": "Condition/1"}]
        });
        let mut doc = obj(original.clone());
        let mut log = RuleLog::default();
        rule.apply("Procedure", &mut doc, &mut log);
        assert_eq!(doc["reason"].as_array().unwrap().len(), 2);

        rule.inverse().unwrap().apply("Procedure", &mut doc, &mut log);
        assert_eq!(Value::Object(doc), original);
    }

    #[test]
    fn test_concept_list_to_coding_is_lossy() {
        let rule = TransformRule::ConceptListToCoding { field: "class" };
        let mut doc = obj(json!({"class": [
            {"coding": [{"code": "AMB"}]},
            {"coding": [{"code": "VR"}]}
        ]}));
        let mut log = RuleLog::default();
        rule.apply("Encounter", &mut doc, &mut log);
        assert_eq!(doc["class"], json!({"code": "AMB"}));
        assert_eq!(log.data_loss.len(), 1);
    }

    #[test]
    fn test_extension_round_trip() {
        let extract = TransformRule::ExtractToExtension {
            field: "informationSource",
            origin: FhirDialect::R5,
        };
        let original = json!({
            "informationSource": [{"reference": "Patient/1"}],
            "extension": [{"url": "http://example.org/other", "valueString": "x"}]
        });
        let mut doc = obj(original.clone());
        let mut log = RuleLog::default();
        extract.apply("MedicationRequest", &mut doc, &mut log);
        assert!(!doc.contains_key("informationSource"));
        assert_eq!(doc["extension"].as_array().unwrap().len(), 2);
        assert_eq!(
            doc["extension"][1]["url"],
            "http://hl7.org/fhir/5.0/StructureDefinition/extension-MedicationRequest.informationSource"
        );

        extract.inverse().unwrap().apply("MedicationRequest", &mut doc, &mut log);
        assert_eq!(Value::Object(doc), original);
    }

    #[test]
    fn test_drop_records_loss() {
        let rule = TransformRule::Drop {
            field: "virtualService",
            reason: "no counterpart",
        };
        let mut doc = obj(json!({"virtualService": [{}]}));
        let mut log = RuleLog::default();
        rule.apply("Encounter", &mut doc, &mut log);
        assert!(doc.is_empty());
        assert_eq!(log.data_loss[0].field, "Encounter.virtualService");
        assert!(rule.inverse().is_none());
    }

    #[test]
    fn test_parse_cross_version_url() {
        let url = cross_version_extension_url(FhirDialect::R5, "Encounter", "virtualService");
        assert_eq!(
            parse_cross_version_url(&url),
            Some((FhirDialect::R5, "Encounter.virtualService"))
        );
        assert_eq!(parse_cross_version_url("http://example.org/x"), None);
    }
}
