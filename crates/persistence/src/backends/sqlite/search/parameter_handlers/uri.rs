//! URI parameter SQL handler.

use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam, escape_like};

/// Handles URI parameter SQL generation.
pub struct UriHandler;

impl UriHandler {
    /// Builds SQL for a URI value: exact by default, prefix with `:below`,
    /// substring with `:contains`.
    pub fn build_sql(value: &SearchValue, modifier: Option<&SearchModifier>) -> SqlFragment {
        match modifier {
            Some(SearchModifier::Below) => SqlFragment::with_params(
                "value_uri LIKE ? ESCAPE '\\'",
                vec![SqlParam::string(format!("{}%", escape_like(&value.value)))],
            ),
            Some(SearchModifier::Contains) => SqlFragment::with_params(
                "value_uri LIKE ? ESCAPE '\\'",
                vec![SqlParam::string(format!("%{}%", escape_like(&value.value)))],
            ),
            _ => SqlFragment::with_params("value_uri = ?", vec![SqlParam::string(&value.value)]),
        }
    }
}
