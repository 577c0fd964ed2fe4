//! Token parameter SQL handler.

use crate::types::{SearchModifier, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam, escape_like};

/// Handles token parameter SQL generation.
///
/// `:not` is applied by the caller as a `NOT EXISTS` over all of a
/// resource's rows; this handler only produces the positive match.
pub struct TokenHandler;

impl TokenHandler {
    /// Builds SQL for a token parameter value.
    ///
    /// Token values can be:
    /// - `code` - matches any system
    /// - `system|code` - matches specific system and code
    /// - `|code` - matches code with no system
    /// - `system|` - matches any code in system
    pub fn build_sql(value: &SearchValue, modifier: Option<&SearchModifier>) -> SqlFragment {
        if matches!(modifier, Some(SearchModifier::Text)) {
            return SqlFragment::with_params(
                "token_display LIKE ? ESCAPE '\\'",
                vec![SqlParam::string(format!("%{}%", escape_like(&value.value)))],
            );
        }

        match value.value.split_once('|') {
            Some(("", code)) => SqlFragment::with_params(
                "token_system IS NULL AND token_code = ?",
                vec![SqlParam::string(code)],
            ),
            Some((system, "")) => {
                SqlFragment::with_params("token_system = ?", vec![SqlParam::string(system)])
            }
            Some((system, code)) => SqlFragment::with_params(
                "token_system = ? AND token_code = ?",
                vec![SqlParam::string(system), SqlParam::string(code)],
            ),
            None => SqlFragment::with_params(
                "token_code = ?",
                vec![SqlParam::string(&value.value)],
            ),
        }
    }
}
