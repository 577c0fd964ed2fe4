//! Reference parameter SQL handler.

use crate::search::converters::canonicalize_reference;
use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};

/// Handles reference parameter SQL generation.
///
/// Query values are canonicalised the same way indexed references are, so
/// `Patient/123`, `http://host/fhir/Patient/123`, `urn:uuid:123` and (for a
/// parameter whose only target is `Patient`) `123` all match the same rows.
/// A `:[Type]` modifier requires the stored type to be known.
pub struct ReferenceHandler;

impl ReferenceHandler {
    /// Builds SQL for a reference parameter value.
    ///
    /// `default_type` is the parameter's single declared target, if any.
    pub fn build_sql(
        value: &SearchValue,
        modifier: Option<&SearchModifier>,
        default_type: Option<&str>,
    ) -> SqlFragment {
        if matches!(modifier, Some(SearchModifier::Identifier)) {
            return Self::build_identifier(&value.value);
        }

        let type_modifier = match modifier {
            Some(SearchModifier::Type(t)) => Some(t.as_str()),
            _ => None,
        };

        match canonicalize_reference(&value.value, None, type_modifier.or(default_type)) {
            Some(target) => {
                let mut fragment = SqlFragment::with_params(
                    "reference_id = ?",
                    vec![SqlParam::string(target.id)],
                );
                match (target.resource_type, type_modifier) {
                    (Some(resource_type), Some(t)) => {
                        fragment = fragment.and(SqlFragment::with_params(
                            "reference_type = ?",
                            vec![SqlParam::string(resource_type)],
                        ));
                        fragment = fragment.and(SqlFragment::with_params(
                            "reference_type = ?",
                            vec![SqlParam::string(t)],
                        ));
                    }
                    // Untyped rows (bundle-internal references on a parameter
                    // with several targets) match any typed form of the id.
                    (Some(resource_type), None) => {
                        fragment = fragment.and(SqlFragment::with_params(
                            "reference_type = ? OR reference_type IS NULL",
                            vec![SqlParam::string(resource_type)],
                        ));
                    }
                    (None, _) => {}
                }
                fragment
            }
            None => SqlFragment::with_params(
                "reference_raw = ?",
                vec![SqlParam::string(&value.value)],
            ),
        }
    }

    /// `:identifier` matches `Reference.identifier` rather than the target.
    fn build_identifier(raw: &str) -> SqlFragment {
        match raw.split_once('|') {
            Some((system, value)) if !system.is_empty() => SqlFragment::with_params(
                "token_system = ? AND token_code = ?",
                vec![SqlParam::string(system), SqlParam::string(value)],
            ),
            Some((_, value)) => {
                SqlFragment::with_params("token_code = ?", vec![SqlParam::string(value)])
            }
            None => SqlFragment::with_params("token_code = ?", vec![SqlParam::string(raw)]),
        }
    }
}
