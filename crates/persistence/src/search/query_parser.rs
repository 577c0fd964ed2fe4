//! Query-string parser.
//!
//! Turns a raw search query string into a [`SearchQuery`], resolving
//! parameter types against the [`SearchParameterRegistry`].
//!
//! - Repeated keys are ANDed; comma-separated values within one key are ORed.
//!   A literal comma is written `\,`.
//! - Unknown parameters are skipped and listed in
//!   [`SearchQuery::ignored_parameters`].
//! - Malformed input (a bad date, an unknown modifier, a non-numeric
//!   `_count`) fails the whole parse.

use crate::error::SearchError;
use crate::types::{
    ChainedParameter, IncludeDirective, IncludeType, ResourceKind, ReverseChainedParameter,
    SearchModifier, SearchParamType, SearchParameter, SearchQuery, SearchValue, SortDirective,
    TotalMode,
};

use super::converters::{DateRange, parse_decimal};
use super::registry::SearchParameterRegistry;

/// Parameters that only affect response formatting.
const FORMAT_PARAMS: &[&str] = &["_format", "_pretty", "_summary", "_elements"];

/// Parses a raw (percent-encoded) query string.
pub fn parse_search_query(
    resource_type: &str,
    raw_query: &str,
    registry: &SearchParameterRegistry,
) -> Result<SearchQuery, SearchError> {
    let pairs = url::form_urlencoded::parse(raw_query.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()));
    parse_search_pairs(resource_type, pairs, registry)
}

/// Parses already-decoded key/value pairs.
pub fn parse_search_pairs<I>(
    resource_type: &str,
    pairs: I,
    registry: &SearchParameterRegistry,
) -> Result<SearchQuery, SearchError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let kind = ResourceKind::parse(resource_type);
    let mut query = SearchQuery::new(resource_type);

    for (key, value) in pairs {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        match key {
            "_count" => query.count = Some(parse_u32(key, &value)?),
            "_offset" => query.offset = Some(parse_u32(key, &value)?),
            "_cursor" => query.cursor = Some(value),
            "_total" => {
                query.total = Some(value.parse::<TotalMode>().map_err(|message| {
                    SearchError::QueryParseError { message }
                })?)
            }
            "_sort" => {
                for field in split_values(&value) {
                    let directive = SortDirective::parse(&field);
                    if registry.is_known(&kind, &directive.parameter) {
                        query.sort.push(directive);
                    } else {
                        query.ignored_parameters.push(format!("_sort={}", field));
                    }
                }
            }
            "_include" | "_include:iterate" | "_revinclude" | "_revinclude:iterate" => {
                let include_type = if key.starts_with("_revinclude") {
                    IncludeType::Revinclude
                } else {
                    IncludeType::Include
                };
                let iterate = key.ends_with(":iterate");
                match parse_include(&value, include_type, iterate, registry) {
                    Some(directive) => query.includes.push(directive),
                    None => query.ignored_parameters.push(format!("{}={}", key, value)),
                }
            }
            _ if key.starts_with("_has:") => {
                match parse_has(&key["_has:".len()..], &value, registry)? {
                    Some(reverse_chain) => query.reverse_chains.push(reverse_chain),
                    None => query.ignored_parameters.push(key.to_string()),
                }
            }
            _ if FORMAT_PARAMS.contains(&key) => {}
            _ => match parse_parameter(&kind, key, &value, registry)? {
                Some(param) => query.parameters.push(param),
                None => query.ignored_parameters.push(key.to_string()),
            },
        }
    }

    if !query.ignored_parameters.is_empty() {
        tracing::debug!(
            resource_type = resource_type,
            ignored = ?query.ignored_parameters,
            "Ignoring unknown search parameters"
        );
    }

    Ok(query)
}

fn parse_u32(key: &str, value: &str) -> Result<u32, SearchError> {
    value
        .trim()
        .parse()
        .map_err(|_| SearchError::QueryParseError {
            message: format!("{} must be a non-negative integer, got '{}'", key, value),
        })
}

/// Splits a value on unescaped commas and removes the escapes.
pub fn split_values(value: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => values.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    values.push(current);
    values.retain(|v| !v.is_empty());
    values
}

/// Splits `code:modifier` into its parts.
fn split_modifier(segment: &str) -> (&str, Option<&str>) {
    match segment.split_once(':') {
        Some((code, modifier)) => (code, Some(modifier)),
        None => (segment, None),
    }
}

fn parse_modifier(
    raw: Option<&str>,
    param_type: SearchParamType,
) -> Result<Option<SearchModifier>, SearchError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let unsupported = || SearchError::UnsupportedModifier {
        modifier: raw.to_string(),
        param_type: param_type.to_string(),
    };
    let modifier = SearchModifier::parse(raw).ok_or_else(unsupported)?;
    if !modifier.is_valid_for(param_type) {
        return Err(unsupported());
    }
    Ok(Some(modifier))
}

/// Builds a parameter of a known type, validating every value.
fn build_parameter(
    name: &str,
    param_type: SearchParamType,
    modifier: Option<SearchModifier>,
    raw_value: &str,
) -> Result<SearchParameter, SearchError> {
    let mut param = SearchParameter::new(name, param_type, Vec::new());

    if modifier == Some(SearchModifier::Missing) {
        let flag = raw_value.trim().to_ascii_lowercase();
        if flag != "true" && flag != "false" {
            return Err(SearchError::QueryParseError {
                message: format!("{}:missing must be true or false, got '{}'", name, raw_value),
            });
        }
        param.values = vec![SearchValue::eq(flag)];
        param.modifier = modifier;
        return Ok(param);
    }

    for raw in split_values(raw_value) {
        let value = SearchValue::parse_for(param_type, &raw);
        validate_value(name, param_type, &value)?;
        param.values.push(value);
    }
    param.modifier = modifier;
    Ok(param)
}

fn validate_value(
    name: &str,
    param_type: SearchParamType,
    value: &SearchValue,
) -> Result<(), SearchError> {
    let bad = |what: &str| SearchError::QueryParseError {
        message: format!("invalid {} value '{}' for parameter '{}'", what, value.value, name),
    };

    match param_type {
        SearchParamType::Date => {
            DateRange::parse(&value.value).map_err(|_| bad("date"))?;
        }
        SearchParamType::Number => {
            parse_decimal(&value.value).ok_or_else(|| bad("number"))?;
        }
        SearchParamType::Quantity => {
            let number = value.value.split('|').next().unwrap_or_default();
            parse_decimal(number).ok_or_else(|| bad("quantity"))?;
        }
        _ => {}
    }
    Ok(())
}

/// Parses a (possibly chained) parameter. Returns `None` for unknown names.
fn parse_parameter(
    kind: &ResourceKind,
    key: &str,
    value: &str,
    registry: &SearchParameterRegistry,
) -> Result<Option<SearchParameter>, SearchError> {
    let hops: Vec<(&str, Option<&str>)> = key.split('.').map(split_modifier).collect();

    if let [(code, modifier)] = hops.as_slice() {
        let Some(param_type) = registry.param_type(kind, code) else {
            return Ok(None);
        };
        let modifier = parse_modifier(*modifier, param_type)?;
        return build_parameter(code, param_type, modifier, value).map(Some);
    }

    let mut candidates = vec![kind.clone()];
    let mut chain = Vec::with_capacity(hops.len() - 1);

    for pair in hops.windows(2) {
        let (code, type_modifier) = pair[0];
        let (next_code, _) = pair[1];

        let Some(def) = candidates
            .iter()
            .find_map(|k| registry.get_param(k, code))
            .filter(|d| d.param_type == SearchParamType::Reference)
        else {
            return Ok(None);
        };

        let target_type = match type_modifier {
            Some(t) => match SearchModifier::parse(t) {
                Some(SearchModifier::Type(t)) => Some(t),
                _ => {
                    return Err(SearchError::UnsupportedModifier {
                        modifier: t.to_string(),
                        param_type: "chained reference".to_string(),
                    });
                }
            },
            None => None,
        };

        candidates = match &target_type {
            Some(t) => vec![ResourceKind::parse(t)],
            None if def.targets.is_empty() => ResourceKind::SUPPORTED.to_vec(),
            None => def.targets.clone(),
        };

        chain.push(ChainedParameter {
            reference_param: code.to_string(),
            target_type,
            target_param: next_code.to_string(),
        });
    }

    let (terminal_code, terminal_modifier) = hops[hops.len() - 1];
    let Some(param_type) = candidates
        .iter()
        .find_map(|k| registry.param_type(k, terminal_code))
    else {
        return Ok(None);
    };

    let modifier = parse_modifier(terminal_modifier, param_type)?;
    let mut param = build_parameter(hops[0].0, param_type, modifier, value)?;
    param.chain = chain;
    Ok(Some(param))
}

/// Parses the part of a `_has` key after `_has:`, e.g.
/// `Observation:patient:code` or `Encounter:subject:_has:Condition:encounter:code`.
fn parse_has(
    path: &str,
    value: &str,
    registry: &SearchParameterRegistry,
) -> Result<Option<ReverseChainedParameter>, SearchError> {
    let mut parts = path.splitn(3, ':');
    let (Some(source_type), Some(reference_param), Some(rest)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(SearchError::QueryParseError {
            message: format!("malformed _has parameter '_has:{}'", path),
        });
    };

    let source = ResourceKind::parse(source_type);
    let is_reference = registry
        .get_param(&source, reference_param)
        .is_some_and(|d| d.param_type == SearchParamType::Reference);
    if !source.is_supported() || !is_reference {
        return Ok(None);
    }

    if let Some(nested) = rest.strip_prefix("_has:") {
        return Ok(parse_has(nested, value, registry)?
            .map(|inner| ReverseChainedParameter::nested(source_type, reference_param, inner)));
    }

    Ok(parse_parameter(&source, rest, value, registry)?
        .map(|param| ReverseChainedParameter::terminal(source_type, reference_param, param)))
}

/// Parses `Source:param[:Target]`. Returns `None` if the directive names no
/// reference parameter.
fn parse_include(
    value: &str,
    include_type: IncludeType,
    iterate: bool,
    registry: &SearchParameterRegistry,
) -> Option<IncludeDirective> {
    let mut parts = value.split(':');
    let source_type = parts.next()?;
    let search_param = parts.next()?;
    let target_type = parts.next().map(String::from);

    let def = registry.get(source_type, search_param)?;
    if def.param_type != SearchParamType::Reference {
        return None;
    }

    Some(IncludeDirective {
        include_type,
        source_type: source_type.to_string(),
        search_param: search_param.to_string(),
        target_type,
        iterate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReverseChainFilter, SearchPrefix, SortDirection};

    fn parse(resource_type: &str, q: &str) -> Result<SearchQuery, SearchError> {
        parse_search_query(resource_type, q, &SearchParameterRegistry::standard())
    }

    #[test]
    fn test_comma_values_are_ored() {
        let query = parse("Observation", "code=a,b&status=final").unwrap();
        assert_eq!(query.parameters.len(), 2);
        assert_eq!(query.parameters[0].values.len(), 2);
    }

    #[test]
    fn test_escaped_comma() {
        assert_eq!(split_values(r"a\,b,c"), vec!["a,b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_prefix_and_type() {
        let query = parse("Observation", "date=ge2024-01-01").unwrap();
        let date = &query.parameters[0];
        assert_eq!(date.param_type, SearchParamType::Date);
        assert_eq!(date.values[0].prefix, SearchPrefix::Ge);
        assert_eq!(date.values[0].value, "2024-01-01");
    }

    #[test]
    fn test_bad_date_is_hard_error() {
        assert!(matches!(
            parse("Patient", "birthdate=gt20xx"),
            Err(SearchError::QueryParseError { .. })
        ));
    }

    #[test]
    fn test_unknown_modifier_is_hard_error() {
        assert!(matches!(
            parse("Patient", "family:fuzzy=Doe"),
            Err(SearchError::UnsupportedModifier { .. })
        ));
        assert!(matches!(
            parse("Patient", "gender:exact=male"),
            Err(SearchError::UnsupportedModifier { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter_is_ignored() {
        let query = parse("Patient", "shoe-size=12&family=Doe&_format=json").unwrap();
        assert_eq!(query.parameters.len(), 1);
        assert_eq!(query.ignored_parameters, vec!["shoe-size".to_string()]);
    }

    #[test]
    fn test_missing_modifier() {
        let query = parse("Patient", "birthdate:missing=true").unwrap();
        assert_eq!(query.parameters[0].missing_value(), Some(true));
        assert!(parse("Patient", "birthdate:missing=maybe").is_err());
    }

    #[test]
    fn test_chain_resolution() {
        let query = parse("Observation", "subject:Patient.organization.name=Acme").unwrap();
        let param = &query.parameters[0];
        assert_eq!(param.name, "subject");
        assert_eq!(param.param_type, SearchParamType::String);
        assert_eq!(param.chain.len(), 2);
        assert_eq!(param.chain[0].target_type.as_deref(), Some("Patient"));
        assert_eq!(param.chain[0].target_param, "organization");
        assert_eq!(param.chain[1].reference_param, "organization");
        assert_eq!(param.chain[1].target_param, "name");
    }

    #[test]
    fn test_chain_through_single_target() {
        let query = parse("Observation", "patient.family=Doe").unwrap();
        assert_eq!(query.parameters[0].chain.len(), 1);
        assert!(query.parameters[0].chain[0].target_type.is_none());
    }

    #[test]
    fn test_has_parsing() {
        let query = parse("Patient", "_has:Condition:patient:clinical-status=active").unwrap();
        let has = &query.reverse_chains[0];
        assert_eq!(has.source_type, "Condition");
        assert_eq!(has.reference_param, "patient");
        assert!(matches!(
            &has.filter,
            ReverseChainFilter::Parameter(p) if p.name == "clinical-status"
        ));
    }

    #[test]
    fn test_nested_has() {
        let query = parse(
            "Patient",
            "_has:Encounter:patient:_has:Condition:encounter:code=123",
        )
        .unwrap();
        assert_eq!(query.reverse_chains[0].depth(), 2);
    }

    #[test]
    fn test_include_directives() {
        let query = parse(
            "Observation",
            "_include=Observation:patient&_revinclude:iterate=Provenance:target&_include=Observation:bogus",
        )
        .unwrap();
        assert_eq!(query.includes.len(), 2);
        assert_eq!(query.includes[1].include_type, IncludeType::Revinclude);
        assert!(query.includes[1].iterate);
        assert_eq!(query.ignored_parameters.len(), 1);
    }

    #[test]
    fn test_paging_and_sort() {
        let query = parse("Patient", "_count=5&_sort=-birthdate,family&_total=accurate").unwrap();
        assert_eq!(query.count, Some(5));
        assert_eq!(query.sort.len(), 2);
        assert_eq!(query.sort[0].direction, SortDirection::Descending);
        assert_eq!(query.total, Some(TotalMode::Accurate));

        assert!(parse("Patient", "_count=lots").is_err());
        assert!(parse("Patient", "_total=some").is_err());
    }

    #[test]
    fn test_percent_decoding() {
        let query = parse("Patient", "identifier=http%3A%2F%2Fx.org%7C123").unwrap();
        assert_eq!(query.parameters[0].values[0].value, "http://x.org|123");
    }
}
