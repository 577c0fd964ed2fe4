//! String parameter SQL handler.

use crate::search::converters::normalize_string;
use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam, escape_like};

/// Handles string parameter SQL generation.
pub struct StringHandler;

impl StringHandler {
    /// Builds SQL for a string parameter value.
    ///
    /// - default: case- and accent-insensitive starts-with
    /// - `:exact`: exact match on the value as written
    /// - `:contains`: case- and accent-insensitive substring
    pub fn build_sql(value: &SearchValue, modifier: Option<&SearchModifier>) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Exact) => SqlFragment::with_params(
                "value_string = ?",
                vec![SqlParam::string(&value.value)],
            ),
            Some(SearchModifier::Contains) => SqlFragment::with_params(
                "value_string_norm LIKE ? ESCAPE '\\'",
                vec![SqlParam::string(format!(
                    "%{}%",
                    escape_like(&normalize_string(&value.value))
                ))],
            ),
            _ => SqlFragment::with_params(
                "value_string_norm LIKE ? ESCAPE '\\'",
                vec![SqlParam::string(format!(
                    "{}%",
                    escape_like(&normalize_string(&value.value))
                ))],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_default_starts_with() {
        let frag = StringHandler::build_sql(&SearchValue::eq("Smi"), None);
        assert_eq!(frag.sql, "value_string_norm LIKE ? ESCAPE '\\'");
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "smi%"));
    }

    #[test]
    fn test_string_exact() {
        let frag = StringHandler::build_sql(&SearchValue::eq("Smith"), Some(&SearchModifier::Exact));
        assert_eq!(frag.sql, "value_string = ?");
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "Smith"));
    }

    #[test]
    fn test_string_contains_escapes_wildcards() {
        let frag =
            StringHandler::build_sql(&SearchValue::eq("50%_off"), Some(&SearchModifier::Contains));
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "%50\\%\\_off%"));
    }
}
