//! SQLite search index writer implementation.

use rusqlite::{Connection, params_from_iter};

use crate::search::converters::{IndexValue, decimal_to_f64};
use crate::search::extractor::ExtractedValue;

use super::query_builder::SqlParam;

/// Number of value columns following the four key columns.
const VALUE_COLUMNS: usize = 22;

/// Writes and clears the `search_index` rows of a resource.
///
/// Callers run both operations inside the transaction that writes the
/// document, so the index always matches the current version.
pub struct SqliteSearchIndexWriter;

impl SqliteSearchIndexWriter {
    /// The INSERT statement for a single index row.
    pub fn insert_sql() -> &'static str {
        r#"
        INSERT INTO search_index (
            resource_type, resource_id, param_name, param_type,
            value_string, value_string_norm,
            token_system, token_code, token_display,
            value_date_start, value_date_end,
            number_value, number_low, number_high,
            quantity_value, quantity_low, quantity_high,
            quantity_unit, quantity_system, quantity_code,
            reference_type, reference_id, reference_raw,
            value_uri, composite_group, component
        ) VALUES (
            ?, ?, ?, ?,
            ?, ?,
            ?, ?, ?,
            ?, ?,
            ?, ?, ?,
            ?, ?, ?,
            ?, ?, ?,
            ?, ?, ?,
            ?, ?, ?
        )
        "#
    }

    /// The DELETE statement clearing a resource's rows.
    pub fn delete_sql() -> &'static str {
        "DELETE FROM search_index WHERE resource_type = ?1 AND resource_id = ?2"
    }

    /// Converts an extracted value to the row's bound parameters.
    pub fn to_sql_params(
        resource_type: &str,
        resource_id: &str,
        extracted: &ExtractedValue,
    ) -> Vec<SqlParam> {
        let mut row = vec![SqlParam::Null; 4 + VALUE_COLUMNS];
        row[0] = SqlParam::string(resource_type);
        row[1] = SqlParam::string(resource_id);
        row[2] = SqlParam::string(&extracted.param_name);
        row[3] = SqlParam::string(extracted.param_type.to_string());

        let text = |s: &Option<String>| s.as_deref().map_or(SqlParam::Null, SqlParam::string);
        let real = |d: &Option<rust_decimal::Decimal>| {
            d.map_or(SqlParam::Null, |d| SqlParam::float(decimal_to_f64(d)))
        };

        match &extracted.value {
            IndexValue::String { raw, normalized } => {
                row[4] = SqlParam::string(raw);
                row[5] = SqlParam::string(normalized);
            }
            IndexValue::Token {
                system,
                code,
                display,
            } => {
                row[6] = text(system);
                row[7] = text(code);
                row[8] = text(display);
            }
            IndexValue::Date(range) => {
                row[9] = SqlParam::string(&range.start);
                row[10] = SqlParam::string(&range.end);
            }
            IndexValue::Number { value, low, high } => {
                row[11] = SqlParam::float(decimal_to_f64(*value));
                row[12] = real(low);
                row[13] = real(high);
            }
            IndexValue::Quantity {
                value,
                low,
                high,
                unit,
                system,
                code,
            } => {
                row[14] = SqlParam::float(decimal_to_f64(*value));
                row[15] = real(low);
                row[16] = real(high);
                row[17] = text(unit);
                row[18] = text(system);
                row[19] = text(code);
            }
            IndexValue::Reference {
                raw,
                target,
                identifier_system,
                identifier_value,
            } => {
                if let Some(target) = target {
                    row[20] = text(&target.resource_type);
                    row[21] = SqlParam::string(&target.id);
                }
                row[22] = SqlParam::string(raw);
                // `:identifier` searches the token columns.
                row[6] = text(identifier_system);
                row[7] = text(identifier_value);
            }
            IndexValue::Uri(uri) => {
                row[23] = SqlParam::string(uri);
            }
        }

        if let Some(group) = extracted.composite_group {
            row[24] = SqlParam::integer(i64::from(group));
        }
        row[25] = text(&extracted.component);

        row
    }

    /// Deletes every index row of a resource.
    pub fn clear(conn: &Connection, resource_type: &str, resource_id: &str) -> rusqlite::Result<usize> {
        conn.execute(Self::delete_sql(), [resource_type, resource_id])
    }

    /// Inserts index rows for a resource. Returns the number written.
    pub fn write(
        conn: &Connection,
        resource_type: &str,
        resource_id: &str,
        values: &[ExtractedValue],
    ) -> rusqlite::Result<usize> {
        let mut stmt = conn.prepare_cached(Self::insert_sql())?;
        for extracted in values {
            let row = Self::to_sql_params(resource_type, resource_id, extracted);
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::converters::{CanonicalReference, DateRange};
    use crate::types::SearchParamType;

    #[test]
    fn test_insert_sql_placeholder_count() {
        let placeholders = SqliteSearchIndexWriter::insert_sql().matches('?').count();
        assert_eq!(placeholders, 4 + VALUE_COLUMNS);
    }

    #[test]
    fn test_token_params() {
        let extracted = ExtractedValue::new(
            "gender",
            SearchParamType::Token,
            IndexValue::token(None, "male", None),
        );
        let row = SqliteSearchIndexWriter::to_sql_params("Patient", "p1", &extracted);
        assert_eq!(row.len(), 26);
        assert_eq!(row[3], SqlParam::string("token"));
        assert_eq!(row[6], SqlParam::Null);
        assert_eq!(row[7], SqlParam::string("male"));
    }

    #[test]
    fn test_reference_params() {
        let extracted = ExtractedValue::new(
            "subject",
            SearchParamType::Reference,
            IndexValue::Reference {
                raw: "Patient/123".to_string(),
                target: Some(CanonicalReference {
                    resource_type: Some("Patient".to_string()),
                    id: "123".to_string(),
                }),
                identifier_system: None,
                identifier_value: None,
            },
        );
        let row = SqliteSearchIndexWriter::to_sql_params("Observation", "o1", &extracted);
        assert_eq!(row[20], SqlParam::string("Patient"));
        assert_eq!(row[21], SqlParam::string("123"));
        assert_eq!(row[22], SqlParam::string("Patient/123"));
    }

    #[test]
    fn test_composite_component_params() {
        let extracted = ExtractedValue::new(
            "code-value-quantity",
            SearchParamType::Date,
            IndexValue::Date(DateRange::parse("2024-01-01").unwrap()),
        )
        .with_component(2, "effective");
        let row = SqliteSearchIndexWriter::to_sql_params("Observation", "o1", &extracted);
        assert_eq!(row[9], SqlParam::string("2024-01-01T00:00:00.000"));
        assert_eq!(row[24], SqlParam::integer(2));
        assert_eq!(row[25], SqlParam::string("effective"));
    }
}
