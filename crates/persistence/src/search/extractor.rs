//! Search parameter value extractor.
//!
//! Walks the declarative paths of the Parameter Definition Table over a
//! document and converts what it finds into [`ExtractedValue`]s. Extraction is
//! a pure function of the document and the registry; the backend replaces a
//! resource's index rows with its output inside the write transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ResourceKind, SearchParamType};

use super::converters::{CanonicalReference, IndexValue, ValueConverter};
use super::errors::ExtractionError;
use super::registry::{SearchParameterDefinition, SearchParameterRegistry};

/// A value extracted from a resource for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    /// The parameter code (e.g., "name", "code-value-quantity").
    pub param_name: String,

    /// The value type. For composite components, the component's type.
    pub param_type: SearchParamType,

    /// The extracted and converted value.
    pub value: IndexValue,

    /// Element instance of a composite. Rows sharing a group come from the
    /// same repeating element.
    pub composite_group: Option<u32>,

    /// Component name within a composite.
    pub component: Option<String>,
}

impl ExtractedValue {
    /// Creates a new extracted value.
    pub fn new(param_name: impl Into<String>, param_type: SearchParamType, value: IndexValue) -> Self {
        Self {
            param_name: param_name.into(),
            param_type,
            value,
            composite_group: None,
            component: None,
        }
    }

    /// Marks the value as a component of a composite element instance.
    pub fn with_component(mut self, group: u32, component: impl Into<String>) -> Self {
        self.composite_group = Some(group);
        self.component = Some(component.into());
        self
    }
}

/// Extracts searchable values from resources.
#[derive(Debug, Clone)]
pub struct SearchParameterExtractor {
    registry: Arc<SearchParameterRegistry>,
}

impl SearchParameterExtractor {
    /// Creates a new extractor with the given registry.
    pub fn new(registry: Arc<SearchParameterRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<SearchParameterRegistry> {
        &self.registry
    }

    /// Extracts all searchable values from a resource.
    ///
    /// Any malformed value for a declared parameter fails the whole
    /// extraction.
    pub fn extract(
        &self,
        resource: &Value,
        resource_type: &str,
    ) -> Result<Vec<ExtractedValue>, ExtractionError> {
        let obj = resource
            .as_object()
            .ok_or_else(|| ExtractionError::InvalidResource {
                message: "Resource must be a JSON object".to_string(),
            })?;

        if let Some(rt) = obj.get("resourceType").and_then(|v| v.as_str()) {
            if rt != resource_type {
                return Err(ExtractionError::InvalidResource {
                    message: format!(
                        "Resource type mismatch: expected {}, got {}",
                        resource_type, rt
                    ),
                });
            }
        }

        let kind = ResourceKind::parse(resource_type);
        let mut results = Vec::new();
        let mut next_group = 0u32;

        for param in self.registry.params_for(&kind) {
            if param.is_composite() {
                results.extend(self.extract_composite(resource, &param, &mut next_group)?);
            } else {
                results.extend(self.extract_for_param(resource, &param)?);
            }
        }

        tracing::trace!(
            resource_type = resource_type,
            values = results.len(),
            "Extracted search values"
        );

        Ok(results)
    }

    /// Extracts values for a single non-composite parameter.
    pub fn extract_for_param(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
    ) -> Result<Vec<ExtractedValue>, ExtractionError> {
        let default_target = param.single_target().map(ResourceKind::as_str);
        let mut results = Vec::new();

        for path in &param.paths {
            for node in resolve_path(resource, path) {
                for value in
                    ValueConverter::convert(node, param.param_type, &param.code, default_target)?
                {
                    if !targets_allow(param, &value) {
                        continue;
                    }
                    let extracted = ExtractedValue::new(&param.code, param.param_type, value);
                    if !results.contains(&extracted) {
                        results.push(extracted);
                    }
                }
            }
        }

        Ok(results)
    }

    fn extract_composite(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
        next_group: &mut u32,
    ) -> Result<Vec<ExtractedValue>, ExtractionError> {
        let mut results = Vec::new();

        for path in &param.paths {
            for instance in element_instances(resource, path) {
                let mut rows = Vec::new();
                let mut complete = true;

                for component in &param.components {
                    let mut values = Vec::new();
                    for node in resolve_path(instance, &component.path) {
                        values.extend(ValueConverter::convert(
                            node,
                            component.param_type,
                            &param.code,
                            None,
                        )?);
                    }
                    if values.is_empty() {
                        complete = false;
                        break;
                    }
                    rows.push((component, values));
                }

                // An instance missing any component can never satisfy the composite.
                if !complete {
                    continue;
                }

                let group = *next_group;
                *next_group += 1;
                for (component, values) in rows {
                    for value in values {
                        results.push(
                            ExtractedValue::new(&param.code, component.param_type, value)
                                .with_component(group, &component.code),
                        );
                    }
                }
            }
        }

        Ok(results)
    }
}

/// A typed reference is indexed only under parameters that declare its type
/// as a target. Untyped references (bundle-internal ids, identifier-only
/// references) are kept.
fn targets_allow(param: &SearchParameterDefinition, value: &IndexValue) -> bool {
    match value {
        IndexValue::Reference {
            target:
                Some(CanonicalReference {
                    resource_type: Some(resource_type),
                    ..
                }),
            ..
        } => param.allows_target(&ResourceKind::parse(resource_type)),
        _ => true,
    }
}

/// Resolves a dotted path against a JSON value.
///
/// Arrays are traversed implicitly, and a segment ending in `[x]` matches
/// every key formed by the prefix followed by a capitalised type name. An
/// empty path resolves to the value itself.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![root];
    if path.is_empty() {
        return current;
    }

    for segment in path.split('.') {
        let mut next = Vec::new();
        for node in flatten(current) {
            let Some(obj) = node.as_object() else {
                continue;
            };
            match segment.strip_suffix("[x]") {
                Some(prefix) => {
                    for (key, value) in obj {
                        let is_variant = key
                            .strip_prefix(prefix)
                            .and_then(|rest| rest.chars().next())
                            .is_some_and(|c| c.is_ascii_uppercase());
                        if is_variant {
                            next.push(value);
                        }
                    }
                }
                None => {
                    if let Some(value) = obj.get(segment) {
                        next.push(value);
                    }
                }
            }
        }
        current = next;
    }

    current
}

/// Resolves a path to individual element instances, unpacking arrays.
fn element_instances<'a>(root: &'a Value, path: &str) -> Vec<&'a Value> {
    flatten(resolve_path(root, path))
}

fn flatten(values: Vec<&Value>) -> Vec<&Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}
