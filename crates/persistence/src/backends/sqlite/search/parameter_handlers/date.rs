//! Date parameter SQL handler.

use chrono::NaiveDateTime;

use crate::error::SearchError;
use crate::search::converters::{DateRange, INDEX_INSTANT_FORMAT};
use crate::types::{SearchPrefix, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};

/// Handles date parameter SQL generation.
///
/// Both the query value and the indexed value are half-open intervals
/// `[start, end)`. A query of `2024-01` covers the whole month; an indexed
/// `Period` covers its own span.
pub struct DateHandler;

impl DateHandler {
    /// Builds SQL for a date parameter value against the given interval
    /// columns (or expressions).
    pub fn build_sql(
        value: &SearchValue,
        start_col: &str,
        end_col: &str,
    ) -> Result<SqlFragment, SearchError> {
        let range = DateRange::parse(&value.value).map_err(|message| {
            SearchError::QueryParseError {
                message: format!("invalid date '{}': {}", value.value, message),
            }
        })?;
        let (qs, qe) = (range.start, range.end);

        let fragment = match value.prefix {
            SearchPrefix::Eq => Self::contained(start_col, end_col, qs, qe),
            SearchPrefix::Ne => {
                let inner = Self::contained(start_col, end_col, qs, qe);
                SqlFragment::with_params(format!("NOT ({})", inner.sql), inner.params)
            }
            SearchPrefix::Gt => Self::compare(end_col, ">", qe),
            SearchPrefix::Lt => Self::compare(start_col, "<", qs),
            SearchPrefix::Ge => Self::compare(end_col, ">", qs),
            SearchPrefix::Le => Self::compare(start_col, "<", qe),
            SearchPrefix::Sa => Self::compare(start_col, ">=", qe),
            SearchPrefix::Eb => Self::compare(end_col, "<=", qs),
            SearchPrefix::Ap => {
                let (low, high) = Self::widen(&qs, &qe);
                Self::overlaps(start_col, end_col, low, high)
            }
        };
        Ok(fragment)
    }

    /// The indexed interval lies entirely within the query interval.
    fn contained(start_col: &str, end_col: &str, qs: String, qe: String) -> SqlFragment {
        SqlFragment::with_params(
            format!("{} >= ? AND {} <= ?", start_col, end_col),
            vec![SqlParam::string(qs), SqlParam::string(qe)],
        )
    }

    fn overlaps(start_col: &str, end_col: &str, low: String, high: String) -> SqlFragment {
        SqlFragment::with_params(
            format!("{} < ? AND {} > ?", start_col, end_col),
            vec![SqlParam::string(high), SqlParam::string(low)],
        )
    }

    fn compare(col: &str, op: &str, bound: String) -> SqlFragment {
        SqlFragment::with_params(format!("{} {} ?", col, op), vec![SqlParam::string(bound)])
    }

    /// Widens `[qs, qe)` by its own width on each side, so `ap2024-03-10`
    /// accepts the day before and after.
    fn widen(qs: &str, qe: &str) -> (String, String) {
        let parse = |s: &str| NaiveDateTime::parse_from_str(s, INDEX_INSTANT_FORMAT).ok();
        match (parse(qs), parse(qe)) {
            (Some(start), Some(end)) => {
                let width = end - start;
                let low = start.checked_sub_signed(width).unwrap_or(start);
                let high = end.checked_add_signed(width).unwrap_or(end);
                (
                    low.format(INDEX_INSTANT_FORMAT).to_string(),
                    high.format(INDEX_INSTANT_FORMAT).to_string(),
                )
            }
            _ => (qs.to_string(), qe.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "value_date_start";
    const END: &str = "value_date_end";

    #[test]
    fn test_date_eq_uses_containment() {
        let frag = DateHandler::build_sql(&SearchValue::eq("2024-01-15"), START, END).unwrap();
        assert_eq!(frag.sql, "value_date_start >= ? AND value_date_end <= ?");
        assert_eq!(frag.params.len(), 2);
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "2024-01-15T00:00:00.000"));
        assert!(matches!(&frag.params[1], SqlParam::String(s) if s == "2024-01-16T00:00:00.000"));
    }

    #[test]
    fn test_date_gt_compares_end() {
        let value = SearchValue::new(SearchPrefix::Gt, "2024");
        let frag = DateHandler::build_sql(&value, START, END).unwrap();
        assert_eq!(frag.sql, "value_date_end > ?");
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "2025-01-01T00:00:00.000"));
    }

    #[test]
    fn test_date_ne_negates() {
        let value = SearchValue::new(SearchPrefix::Ne, "2024-01");
        let frag = DateHandler::build_sql(&value, START, END).unwrap();
        assert!(frag.sql.starts_with("NOT ("));
    }

    #[test]
    fn test_date_ap_widens_by_width() {
        let value = SearchValue::new(SearchPrefix::Ap, "2024-03-10");
        let frag = DateHandler::build_sql(&value, START, END).unwrap();
        assert_eq!(frag.sql, "value_date_start < ? AND value_date_end > ?");
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "2024-03-12T00:00:00.000"));
        assert!(matches!(&frag.params[1], SqlParam::String(s) if s == "2024-03-09T00:00:00.000"));
    }

    #[test]
    fn test_invalid_date_is_error() {
        let err = DateHandler::build_sql(&SearchValue::eq("yesterday"), START, END).unwrap_err();
        assert!(matches!(err, SearchError::QueryParseError { .. }));
    }
}
