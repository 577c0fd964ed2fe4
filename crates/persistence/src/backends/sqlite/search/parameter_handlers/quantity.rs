//! Quantity parameter SQL handler.

use crate::error::SearchError;
use crate::types::SearchValue;

use super::super::query_builder::{SqlFragment, SqlParam};
use super::NumberHandler;

/// Handles quantity parameter SQL generation.
pub struct QuantityHandler;

impl QuantityHandler {
    /// Builds SQL for a quantity value.
    ///
    /// Accepted forms:
    /// - `5.4` - number only, any unit
    /// - `5.4|http://unitsofmeasure.org|mg` - number, system and code
    /// - `5.4||mg` - number and code (or unit text) in any system
    pub fn build_sql(value: &SearchValue) -> Result<SqlFragment, SearchError> {
        let mut parts = value.value.splitn(3, '|');
        let number = NumberHandler::parse(parts.next().unwrap_or_default())?;
        let system = parts.next().filter(|s| !s.is_empty());
        let code = parts.next().filter(|s| !s.is_empty());

        let mut fragment =
            NumberHandler::build_for(value.prefix, number, "quantity_low", "quantity_high");

        if let Some(system) = system {
            fragment = fragment.and(SqlFragment::with_params(
                "quantity_system = ?",
                vec![SqlParam::string(system)],
            ));
        }
        if let Some(code) = code {
            let unit = if system.is_some() {
                SqlFragment::with_params("quantity_code = ?", vec![SqlParam::string(code)])
            } else {
                SqlFragment::with_params(
                    "(quantity_code = ? OR quantity_unit = ?)",
                    vec![SqlParam::string(code), SqlParam::string(code)],
                )
            };
            fragment = fragment.and(unit);
        }

        Ok(fragment)
    }
}
