//! Search parameter types.
//!
//! This module defines types for representing parsed search requests:
//! parameter types, modifiers, prefixes, chains, reverse chains, includes
//! and sort directives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Search parameter value types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
}

impl SearchParamType {
    /// Returns true if values of this type may carry a comparator prefix.
    pub fn accepts_prefix(&self) -> bool {
        matches!(
            self,
            SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Search modifiers that can be applied to search parameters.
///
/// See: https://build.fhir.org/search.html#modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchModifier {
    /// Literal, case-sensitive match (string parameters).
    Exact,
    /// Case-insensitive substring (string and uri parameters).
    Contains,
    /// Match against display text (token parameters).
    Text,
    /// Negation (token parameters).
    Not,
    /// Presence predicate, value is `true` or `false`.
    Missing,
    /// Hierarchical prefix match (uri parameters).
    Below,
    /// Match on the reference's identifier (reference parameters).
    Identifier,
    /// Restrict the referenced type (reference parameters).
    Type(String),
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchModifier::Exact => write!(f, "exact"),
            SearchModifier::Contains => write!(f, "contains"),
            SearchModifier::Text => write!(f, "text"),
            SearchModifier::Not => write!(f, "not"),
            SearchModifier::Missing => write!(f, "missing"),
            SearchModifier::Below => write!(f, "below"),
            SearchModifier::Identifier => write!(f, "identifier"),
            SearchModifier::Type(t) => write!(f, "{}", t),
        }
    }
}

impl SearchModifier {
    /// Parses a modifier string, returning None for unknown modifiers.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(SearchModifier::Exact),
            "contains" => Some(SearchModifier::Contains),
            "text" => Some(SearchModifier::Text),
            "not" => Some(SearchModifier::Not),
            "missing" => Some(SearchModifier::Missing),
            "below" => Some(SearchModifier::Below),
            "identifier" => Some(SearchModifier::Identifier),
            _ => {
                // Resource type modifier, e.g. subject:Patient
                if s.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                    Some(SearchModifier::Type(s.to_string()))
                } else {
                    None
                }
            }
        }
    }

    /// Returns true if this modifier is valid for the given parameter type.
    pub fn is_valid_for(&self, param_type: SearchParamType) -> bool {
        match self {
            SearchModifier::Exact => param_type == SearchParamType::String,
            SearchModifier::Contains => {
                matches!(param_type, SearchParamType::String | SearchParamType::Uri)
            }
            SearchModifier::Text | SearchModifier::Not => param_type == SearchParamType::Token,
            SearchModifier::Missing => true,
            SearchModifier::Below => param_type == SearchParamType::Uri,
            SearchModifier::Identifier | SearchModifier::Type(_) => {
                param_type == SearchParamType::Reference
            }
        }
    }
}

/// Comparison prefixes for ordered parameter types.
///
/// See: https://build.fhir.org/search.html#prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
    /// Approximately equal.
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPrefix::Eq => write!(f, "eq"),
            SearchPrefix::Ne => write!(f, "ne"),
            SearchPrefix::Gt => write!(f, "gt"),
            SearchPrefix::Lt => write!(f, "lt"),
            SearchPrefix::Ge => write!(f, "ge"),
            SearchPrefix::Le => write!(f, "le"),
            SearchPrefix::Sa => write!(f, "sa"),
            SearchPrefix::Eb => write!(f, "eb"),
            SearchPrefix::Ap => write!(f, "ap"),
        }
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            "sa" => Ok(SearchPrefix::Sa),
            "eb" => Ok(SearchPrefix::Eb),
            "ap" => Ok(SearchPrefix::Ap),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Extracts a prefix from the beginning of a value string.
    ///
    /// Returns the prefix and the remaining value.
    pub fn extract(value: &str) -> (Self, &str) {
        if let Some(prefix) = value.get(..2) {
            if let Ok(p) = prefix.parse() {
                return (p, &value[2..]);
            }
        }
        (SearchPrefix::Eq, value)
    }
}

/// A parsed search parameter with its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParameter {
    /// The parameter name (e.g., "name", "identifier").
    pub name: String,

    /// The parameter type. For chains, the type of the terminal parameter.
    pub param_type: SearchParamType,

    /// Modifier, if any.
    pub modifier: Option<SearchModifier>,

    /// The search value(s). Multiple values are ORed.
    pub values: Vec<SearchValue>,

    /// Chain hops (e.g., `subject:Patient.name=Smith`), outermost first.
    pub chain: Vec<ChainedParameter>,
}

impl SearchParameter {
    /// Creates a parameter with the given values and no modifier or chain.
    pub fn new(
        name: impl Into<String>,
        param_type: SearchParamType,
        values: Vec<SearchValue>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            modifier: None,
            values,
            chain: Vec::new(),
        }
    }

    /// Sets the modifier.
    pub fn with_modifier(mut self, modifier: SearchModifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    /// Returns the `true`/`false` value of a `:missing` parameter.
    pub fn missing_value(&self) -> Option<bool> {
        if self.modifier != Some(SearchModifier::Missing) {
            return None;
        }
        self.values
            .first()
            .map(|v| v.value.eq_ignore_ascii_case("true"))
    }
}

/// A single search value with optional prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchValue {
    /// The comparison prefix.
    pub prefix: SearchPrefix,

    /// The value to search for.
    pub value: String,
}

impl SearchValue {
    /// Creates a new search value with the given prefix and value.
    pub fn new(prefix: SearchPrefix, value: impl Into<String>) -> Self {
        Self {
            prefix,
            value: value.into(),
        }
    }

    /// Creates a search value with the default (eq) prefix.
    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(SearchPrefix::Eq, value)
    }

    /// Parses a value string, extracting a prefix only for ordered types.
    pub fn parse_for(param_type: SearchParamType, s: &str) -> Self {
        if param_type.accepts_prefix() {
            let (prefix, value) = SearchPrefix::extract(s);
            Self::new(prefix, value)
        } else {
            Self::eq(s)
        }
    }
}

/// One hop of a chained search parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainedParameter {
    /// The reference parameter being chained through.
    pub reference_param: String,

    /// Optional type modifier on the reference.
    pub target_type: Option<String>,

    /// The parameter evaluated on the referenced resource.
    pub target_param: String,
}

/// A reverse chained parameter (`_has`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseChainedParameter {
    /// The resource type that references the searched resource.
    pub source_type: String,

    /// The reference parameter on the source type.
    pub reference_param: String,

    /// What the referencing resource must satisfy.
    pub filter: ReverseChainFilter,
}

/// The condition a `_has` source resource must meet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReverseChainFilter {
    /// A plain search parameter on the source type.
    Parameter(SearchParameter),
    /// Another `_has` evaluated against the source type.
    Nested(Box<ReverseChainedParameter>),
}

impl ReverseChainedParameter {
    /// Creates a `_has` whose source must match a search parameter.
    pub fn terminal(
        source_type: impl Into<String>,
        reference_param: impl Into<String>,
        parameter: SearchParameter,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            reference_param: reference_param.into(),
            filter: ReverseChainFilter::Parameter(parameter),
        }
    }

    /// Creates a `_has` whose source must itself satisfy another `_has`.
    pub fn nested(
        source_type: impl Into<String>,
        reference_param: impl Into<String>,
        inner: ReverseChainedParameter,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            reference_param: reference_param.into(),
            filter: ReverseChainFilter::Nested(Box::new(inner)),
        }
    }

    /// Number of `_has` levels, counting this one.
    pub fn depth(&self) -> usize {
        match &self.filter {
            ReverseChainFilter::Parameter(_) => 1,
            ReverseChainFilter::Nested(inner) => 1 + inner.depth(),
        }
    }
}

/// Include directive for _include and _revinclude.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeDirective {
    /// The type of include.
    pub include_type: IncludeType,

    /// The resource type holding the reference.
    pub source_type: String,

    /// The reference search parameter to follow.
    pub search_param: String,

    /// Optional target resource type filter.
    pub target_type: Option<String>,

    /// Whether to reapply the rule to included resources.
    pub iterate: bool,
}

/// Type of include operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncludeType {
    /// Forward include (_include).
    Include,
    /// Reverse include (_revinclude).
    Revinclude,
}

/// Sort direction for _sort parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A sort directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortDirective {
    /// The parameter to sort by.
    pub parameter: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortDirective {
    /// Parses a sort parameter value (e.g., "-date" for descending).
    pub fn parse(s: &str) -> Self {
        if let Some(stripped) = s.strip_prefix('-') {
            Self {
                parameter: stripped.to_string(),
                direction: SortDirection::Descending,
            }
        } else {
            Self {
                parameter: s.to_string(),
                direction: SortDirection::Ascending,
            }
        }
    }
}

/// A complete search query with all parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The resource type being searched.
    pub resource_type: String,

    /// Standard search parameters, ANDed together.
    pub parameters: Vec<SearchParameter>,

    /// Reverse chain parameters (_has).
    pub reverse_chains: Vec<ReverseChainedParameter>,

    /// Include and revinclude directives.
    pub includes: Vec<IncludeDirective>,

    /// Sort directives.
    pub sort: Vec<SortDirective>,

    /// Requested page size (_count).
    pub count: Option<u32>,

    /// Offset for pagination (_offset).
    pub offset: Option<u32>,

    /// Opaque cursor from a previous page's `next` link.
    pub cursor: Option<String>,

    /// Total mode (_total).
    pub total: Option<TotalMode>,

    /// Parameters that were not recognised and so were not applied.
    pub ignored_parameters: Vec<String>,
}

/// Mode for _total parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalMode {
    /// No total.
    None,
    /// Estimated total.
    Estimate,
    /// Accurate total.
    Accurate,
}

impl FromStr for TotalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(TotalMode::None),
            "estimate" => Ok(TotalMode::Estimate),
            "accurate" => Ok(TotalMode::Accurate),
            _ => Err(format!("invalid _total value: {}", s)),
        }
    }
}

impl SearchQuery {
    /// Creates a new search query for the given resource type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Adds a search parameter.
    pub fn with_parameter(mut self, param: SearchParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Adds a reverse chain.
    pub fn with_reverse_chain(mut self, reverse_chain: ReverseChainedParameter) -> Self {
        self.reverse_chains.push(reverse_chain);
        self
    }

    /// Adds an include directive.
    pub fn with_include(mut self, include: IncludeDirective) -> Self {
        self.includes.push(include);
        self
    }

    /// Adds a sort directive.
    pub fn with_sort(mut self, sort: SortDirective) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the count limit.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the pagination cursor.
    pub fn with_cursor(mut self, cursor: String) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Sets the total mode.
    pub fn with_total(mut self, total: TotalMode) -> Self {
        self.total = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_param_type_display() {
        assert_eq!(SearchParamType::String.to_string(), "string");
        assert_eq!(SearchParamType::Token.to_string(), "token");
        assert_eq!(SearchParamType::Reference.to_string(), "reference");
    }

    #[test]
    fn test_search_param_type_parse() {
        assert_eq!(
            "string".parse::<SearchParamType>().unwrap(),
            SearchParamType::String
        );
        assert_eq!(
            "TOKEN".parse::<SearchParamType>().unwrap(),
            SearchParamType::Token
        );
        assert!("special".parse::<SearchParamType>().is_err());
    }

    #[test]
    fn test_search_modifier_parse() {
        assert_eq!(SearchModifier::parse("exact"), Some(SearchModifier::Exact));
        assert_eq!(
            SearchModifier::parse("contains"),
            Some(SearchModifier::Contains)
        );
        assert_eq!(
            SearchModifier::parse("Patient"),
            Some(SearchModifier::Type("Patient".to_string()))
        );
        assert_eq!(SearchModifier::parse("unknown"), None);
    }

    #[test]
    fn test_search_modifier_validity() {
        assert!(SearchModifier::Exact.is_valid_for(SearchParamType::String));
        assert!(!SearchModifier::Exact.is_valid_for(SearchParamType::Token));
        assert!(SearchModifier::Text.is_valid_for(SearchParamType::Token));
        assert!(SearchModifier::Missing.is_valid_for(SearchParamType::Date));
        assert!(!SearchModifier::Not.is_valid_for(SearchParamType::String));
        assert!(
            SearchModifier::Type("Patient".to_string()).is_valid_for(SearchParamType::Reference)
        );
    }

    #[test]
    fn test_search_prefix_extract() {
        assert_eq!(
            SearchPrefix::extract("gt2020-01-01"),
            (SearchPrefix::Gt, "2020-01-01")
        );
        assert_eq!(
            SearchPrefix::extract("2020-01-01"),
            (SearchPrefix::Eq, "2020-01-01")
        );
        assert_eq!(SearchPrefix::extract("le100"), (SearchPrefix::Le, "100"));
        assert_eq!(SearchPrefix::extract("é"), (SearchPrefix::Eq, "é"));
    }

    #[test]
    fn test_search_value_prefix_only_for_ordered_types() {
        let value = SearchValue::parse_for(SearchParamType::Number, "gt100");
        assert_eq!(value.prefix, SearchPrefix::Gt);
        assert_eq!(value.value, "100");

        // "ne" is a legitimate start of a token code.
        let token = SearchValue::parse_for(SearchParamType::Token, "newborn");
        assert_eq!(token.prefix, SearchPrefix::Eq);
        assert_eq!(token.value, "newborn");
    }

    #[test]
    fn test_missing_value() {
        let param = SearchParameter::new(
            "gender",
            SearchParamType::Token,
            vec![SearchValue::eq("true")],
        )
        .with_modifier(SearchModifier::Missing);
        assert_eq!(param.missing_value(), Some(true));

        let plain = SearchParameter::new("gender", SearchParamType::Token, vec![]);
        assert_eq!(plain.missing_value(), None);
    }

    #[test]
    fn test_reverse_chain_depth() {
        let terminal = ReverseChainedParameter::terminal(
            "Condition",
            "patient",
            SearchParameter::new(
                "clinical-status",
                SearchParamType::Token,
                vec![SearchValue::eq("active")],
            ),
        );
        assert_eq!(terminal.depth(), 1);

        let nested = ReverseChainedParameter::nested("Encounter", "subject", terminal);
        assert_eq!(nested.depth(), 2);
    }

    #[test]
    fn test_sort_directive_parse() {
        let asc = SortDirective::parse("date");
        assert_eq!(asc.parameter, "date");
        assert_eq!(asc.direction, SortDirection::Ascending);

        let desc = SortDirective::parse("-date");
        assert_eq!(desc.parameter, "date");
        assert_eq!(desc.direction, SortDirection::Descending);
    }

    #[test]
    fn test_total_mode_parse() {
        assert_eq!("accurate".parse::<TotalMode>().unwrap(), TotalMode::Accurate);
        assert_eq!("estimate".parse::<TotalMode>().unwrap(), TotalMode::Estimate);
        assert!("all".parse::<TotalMode>().is_err());
    }

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("Patient")
            .with_count(10)
            .with_total(TotalMode::None)
            .with_sort(SortDirective::parse("-_lastUpdated"));

        assert_eq!(query.resource_type, "Patient");
        assert_eq!(query.count, Some(10));
        assert_eq!(query.total, Some(TotalMode::None));
        assert_eq!(query.sort.len(), 1);
    }
}
