//! Search parameter registry.
//!
//! The registry is the Parameter Definition Table: a static map from
//! [`ResourceKind`] and parameter code to a declarative
//! [`SearchParameterDefinition`]. It is built once from the code-embedded
//! table in [`super::definitions`] and shared behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ResourceKind, SearchParamType};

/// Parameters answered from the document table rather than the index.
pub const RESOURCE_COLUMN_PARAMS: &[&str] = &["_id", "_lastUpdated"];

/// One component of a composite search parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeComponentDef {
    /// The component name used in index rows and query values.
    pub code: String,
    /// The component's value type.
    pub param_type: SearchParamType,
    /// Path relative to the composite's element instance.
    pub path: String,
}

/// Declarative definition of a search parameter.
///
/// Paths are dotted element names starting at the resource root, e.g.
/// `name.family` or `component.code`. Arrays are traversed implicitly and a
/// trailing `[x]` on a segment matches every populated choice variant
/// (`effective[x]` matches `effectiveDateTime` and `effectivePeriod`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameterDefinition {
    /// Parameter code as used in query strings.
    pub code: String,

    /// The value type.
    pub param_type: SearchParamType,

    /// Element paths the values are extracted from. For composites, the
    /// element instances whose components are bound together; an empty path
    /// is the resource itself.
    pub paths: Vec<String>,

    /// Allowed target kinds for reference parameters. Empty means any.
    pub targets: Vec<ResourceKind>,

    /// Components of a composite parameter.
    pub components: Vec<CompositeComponentDef>,
}

impl SearchParameterDefinition {
    /// Creates a definition extracting from the given paths.
    pub fn new<I, S>(code: impl Into<String>, param_type: SearchParamType, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code: code.into(),
            param_type,
            paths: paths.into_iter().map(Into::into).collect(),
            targets: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Sets target kinds for a reference parameter.
    pub fn with_targets<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = ResourceKind>,
    {
        self.targets = targets.into_iter().collect();
        self
    }

    /// Adds a composite component.
    pub fn with_component(
        mut self,
        code: impl Into<String>,
        param_type: SearchParamType,
        path: impl Into<String>,
    ) -> Self {
        self.components.push(CompositeComponentDef {
            code: code.into(),
            param_type,
            path: path.into(),
        });
        self
    }

    /// Returns whether this is a composite parameter with components.
    pub fn is_composite(&self) -> bool {
        self.param_type == SearchParamType::Composite && !self.components.is_empty()
    }

    /// Returns the single declared target, if there is exactly one.
    pub fn single_target(&self) -> Option<&ResourceKind> {
        match self.targets.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Returns true if `kind` is an allowed target.
    pub fn allows_target(&self, kind: &ResourceKind) -> bool {
        self.targets.is_empty() || self.targets.contains(kind)
    }
}

/// In-memory registry of search parameter definitions.
///
/// Lookup is by `(kind, code)`. Parameters common to every kind (`_tag`,
/// `_profile`) are registered under each supported kind.
pub struct SearchParameterRegistry {
    params_by_kind: HashMap<ResourceKind, HashMap<String, Arc<SearchParameterDefinition>>>,
}

impl SearchParameterRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            params_by_kind: HashMap::new(),
        }
    }

    /// Creates a registry holding the standard definition table.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for kind in ResourceKind::SUPPORTED {
            for def in super::definitions::common_definitions() {
                registry.register(kind.clone(), def);
            }
            for def in super::definitions::definitions_for(kind) {
                registry.register(kind.clone(), def);
            }
        }
        registry
    }

    /// Returns the number of registered `(kind, code)` pairs.
    pub fn len(&self) -> usize {
        self.params_by_kind.values().map(HashMap::len).sum()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a definition for a kind, replacing any with the same code.
    pub fn register(&mut self, kind: ResourceKind, def: SearchParameterDefinition) {
        self.params_by_kind
            .entry(kind)
            .or_default()
            .insert(def.code.clone(), Arc::new(def));
    }

    /// Gets a specific parameter by kind and code.
    pub fn get_param(
        &self,
        kind: &ResourceKind,
        code: &str,
    ) -> Option<Arc<SearchParameterDefinition>> {
        self.params_by_kind
            .get(kind)
            .and_then(|params| params.get(code))
            .cloned()
    }

    /// Gets a parameter by type name and code.
    pub fn get(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParameterDefinition>> {
        self.get_param(&ResourceKind::parse(resource_type), code)
    }

    /// Gets all parameters for a kind, sorted by code.
    pub fn params_for(&self, kind: &ResourceKind) -> Vec<Arc<SearchParameterDefinition>> {
        let mut params: Vec<_> = self
            .params_by_kind
            .get(kind)
            .map(|params| params.values().cloned().collect())
            .unwrap_or_default();
        params.sort_by(|a, b| a.code.cmp(&b.code));
        params
    }

    /// Returns true if `code` is searchable on `kind`, including the
    /// document-table parameters.
    pub fn is_known(&self, kind: &ResourceKind, code: &str) -> bool {
        RESOURCE_COLUMN_PARAMS.contains(&code) || self.get_param(kind, code).is_some()
    }

    /// Returns the value type of a parameter, including document-table ones.
    pub fn param_type(&self, kind: &ResourceKind, code: &str) -> Option<SearchParamType> {
        match code {
            "_id" => Some(SearchParamType::Token),
            "_lastUpdated" => Some(SearchParamType::Date),
            _ => self.get_param(kind, code).map(|p| p.param_type),
        }
    }

    /// Returns the kinds that have a reference parameter able to point at
    /// `target`, with the parameter codes.
    pub fn referencing_params(
        &self,
        target: &ResourceKind,
    ) -> Vec<(ResourceKind, Arc<SearchParameterDefinition>)> {
        let mut out = Vec::new();
        for (kind, params) in &self.params_by_kind {
            for def in params.values() {
                if def.param_type == SearchParamType::Reference && def.allows_target(target) {
                    out.push((kind.clone(), Arc::clone(def)));
                }
            }
        }
        out.sort_by(|a, b| (a.0.as_str(), &a.1.code).cmp(&(b.0.as_str(), &b.1.code)));
        out
    }
}

impl Default for SearchParameterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for SearchParameterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchParameterRegistry")
            .field("params_count", &self.len())
            .field("kinds", &self.params_by_kind.keys().collect::<Vec<_>>())
            .finish()
    }
}
