//! Number parameter SQL handler.

use rust_decimal::Decimal;

use crate::error::SearchError;
use crate::search::converters::{decimal_to_f64, parse_decimal, precision_range};
use crate::types::{SearchPrefix, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};

/// Handles number parameter SQL generation.
///
/// Indexed values carry `[low, high]` bounds; a missing bound is unbounded.
/// Equality uses the implicit precision of the query literal, so `100`
/// matches anything in `[99.5, 100.5)`.
pub struct NumberHandler;

impl NumberHandler {
    /// Builds SQL for a number value against the given bound columns.
    pub fn build_sql(
        value: &SearchValue,
        low_col: &str,
        high_col: &str,
    ) -> Result<SqlFragment, SearchError> {
        let number = Self::parse(&value.value)?;
        Ok(Self::build_for(value.prefix, number, low_col, high_col))
    }

    pub(super) fn parse(raw: &str) -> Result<Decimal, SearchError> {
        parse_decimal(raw).ok_or_else(|| SearchError::QueryParseError {
            message: format!("invalid number '{}'", raw),
        })
    }

    pub(super) fn build_for(
        prefix: SearchPrefix,
        number: Decimal,
        low_col: &str,
        high_col: &str,
    ) -> SqlFragment {
        let s = decimal_to_f64(number);
        match prefix {
            SearchPrefix::Eq => {
                let (sl, sh) = precision_range(number);
                Self::overlaps(low_col, high_col, decimal_to_f64(sl), decimal_to_f64(sh), "<")
            }
            SearchPrefix::Ne => {
                let (sl, sh) = precision_range(number);
                let inner =
                    Self::overlaps(low_col, high_col, decimal_to_f64(sl), decimal_to_f64(sh), "<");
                SqlFragment::with_params(format!("NOT ({})", inner.sql), inner.params)
            }
            SearchPrefix::Gt => Self::open_bound(high_col, ">", s),
            SearchPrefix::Lt => Self::open_bound(low_col, "<", s),
            SearchPrefix::Ge => Self::open_bound(high_col, ">=", s),
            SearchPrefix::Le => Self::open_bound(low_col, "<=", s),
            SearchPrefix::Sa => Self::closed_bound(low_col, ">", s),
            SearchPrefix::Eb => Self::closed_bound(high_col, "<", s),
            SearchPrefix::Ap => {
                let margin = (s / 10.0).abs();
                Self::overlaps(low_col, high_col, s - margin, s + margin, "<=")
            }
        }
    }

    /// The indexed range intersects `[low, high)` (or `[low, high]` with
    /// `upper_op` of `<=`).
    fn overlaps(low_col: &str, high_col: &str, low: f64, high: f64, upper_op: &str) -> SqlFragment {
        SqlFragment::with_params(
            format!(
                "({low_col} IS NULL OR {low_col} {upper_op} ?) AND ({high_col} IS NULL OR {high_col} >= ?)"
            ),
            vec![SqlParam::float(high), SqlParam::float(low)],
        )
    }

    /// Comparison where an unbounded side satisfies the predicate.
    fn open_bound(col: &str, op: &str, s: f64) -> SqlFragment {
        SqlFragment::with_params(
            format!("({col} IS NULL OR {col} {op} ?)"),
            vec![SqlParam::float(s)],
        )
    }

    /// Comparison that requires the bound to be present.
    fn closed_bound(col: &str, op: &str, s: f64) -> SqlFragment {
        SqlFragment::with_params(
            format!("({col} IS NOT NULL AND {col} {op} ?)"),
            vec![SqlParam::float(s)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_param(frag: &SqlFragment, i: usize) -> f64 {
        match frag.params[i] {
            SqlParam::Float(f) => f,
            ref other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn test_number_eq_uses_precision() {
        let frag =
            NumberHandler::build_sql(&SearchValue::eq("100"), "number_low", "number_high").unwrap();
        assert_eq!(
            frag.sql,
            "(number_low IS NULL OR number_low < ?) AND (number_high IS NULL OR number_high >= ?)"
        );
        assert_eq!(float_param(&frag, 0), 100.5);
        assert_eq!(float_param(&frag, 1), 99.5);
    }

    #[test]
    fn test_number_sa_requires_low_bound() {
        let value = SearchValue::new(SearchPrefix::Sa, "5");
        let frag = NumberHandler::build_sql(&value, "number_low", "number_high").unwrap();
        assert_eq!(frag.sql, "(number_low IS NOT NULL AND number_low > ?)");
    }

    #[test]
    fn test_number_ap_ten_percent() {
        let value = SearchValue::new(SearchPrefix::Ap, "100");
        let frag = NumberHandler::build_sql(&value, "number_low", "number_high").unwrap();
        assert_eq!(float_param(&frag, 0), 110.0);
        assert_eq!(float_param(&frag, 1), 90.0);
    }

    #[test]
    fn test_invalid_number() {
        assert!(NumberHandler::build_sql(&SearchValue::eq("abc"), "a", "b").is_err());
    }
}
