//! Value converters for the search index.
//!
//! Converts JSON element values into index-friendly values. Each supported
//! data type is mapped to the columns its parameter type is queried on:
//!
//! | Parameter | Source shapes | Stored as |
//! |-----------|---------------|-----------|
//! | string | string, HumanName, Address | raw + lower-cased text |
//! | token | code, boolean, Coding, CodeableConcept, Identifier, ContactPoint | system, code, display |
//! | date | date, dateTime, instant, Period | `[start, end)` interval |
//! | number | number, numeric string | value with low/high bounds |
//! | quantity | Quantity, Age, Duration | value with comparator bounds, unit |
//! | reference | Reference, reference string | canonical `(type, id)` |
//! | uri | string | text |

use std::str::FromStr;

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::SearchParamType;

use super::errors::ExtractionError;

/// Format of instants stored in the index. Lexical order equals time order.
pub const INDEX_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Lower bound used for open-started periods.
pub const MIN_INSTANT: &str = "0001-01-01T00:00:00.000";

/// Upper bound used for open-ended periods.
pub const MAX_INSTANT: &str = "9999-12-31T23:59:59.999";

static DATE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})(?:-(\d{2})(?:-(\d{2})(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?(Z|[+-]\d{2}:\d{2})?)?)?)?$",
    )
    .expect("date literal pattern is valid")
});

static LITERAL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://.+/)?([A-Z][A-Za-z]+)/([A-Za-z0-9\-.]{1,64})(?:/_history/[A-Za-z0-9\-.]{1,64})?/?$",
    )
    .expect("reference pattern is valid")
});

/// A half-open time interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start, formatted with [`INDEX_INSTANT_FORMAT`].
    pub start: String,
    /// Exclusive end, formatted with [`INDEX_INSTANT_FORMAT`].
    pub end: String,
}

impl DateRange {
    /// Parses a date, dateTime or instant literal into the interval its
    /// precision covers. `2024` covers the whole year.
    pub fn parse(literal: &str) -> Result<Self, String> {
        let (start, end) = parse_instant_bounds(literal)?;
        Ok(Self {
            start: format_instant(start),
            end: format_instant(end),
        })
    }

    /// Builds the interval of a Period from its optional bounds.
    pub fn period(start: Option<&str>, end: Option<&str>) -> Result<Self, String> {
        let start = match start {
            Some(s) => format_instant(parse_instant_bounds(s)?.0),
            None => MIN_INSTANT.to_string(),
        };
        let end = match end {
            Some(e) => format_instant(parse_instant_bounds(e)?.1),
            None => MAX_INSTANT.to_string(),
        };
        Ok(Self { start, end })
    }
}

fn format_instant(instant: NaiveDateTime) -> String {
    let formatted = instant.format(INDEX_INSTANT_FORMAT).to_string();
    if formatted.len() != MAX_INSTANT.len() || formatted.as_str() > MAX_INSTANT {
        MAX_INSTANT.to_string()
    } else {
        formatted
    }
}

fn parse_instant_bounds(literal: &str) -> Result<(NaiveDateTime, NaiveDateTime), String> {
    let caps = DATE_LITERAL
        .captures(literal.trim())
        .ok_or_else(|| format!("'{}' is not a valid date", literal))?;
    let num = |i: usize| -> Option<u32> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };
    let invalid = || format!("'{}' is not a valid date", literal);

    let year: i32 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;

    let (Some(month), Some(day)) = (num(2), num(3)) else {
        // Year or year-month precision.
        let (start, end) = match num(2) {
            None => (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year + 1, 1, 1),
            ),
            Some(month) => {
                let (ny, nm) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                (
                    NaiveDate::from_ymd_opt(year, month, 1),
                    NaiveDate::from_ymd_opt(ny, nm, 1),
                )
            }
        };
        let (start, end) = start.zip(end).ok_or_else(invalid)?;
        return Ok((start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN)));
    };

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let (Some(hour), Some(minute)) = (num(4), num(5)) else {
        let start = date.and_time(NaiveTime::MIN);
        return Ok((start, start + Duration::days(1)));
    };

    let second = num(6);
    let fraction = caps.get(7).map(|m| m.as_str());
    let (nanos, width) = match fraction {
        Some(f) => {
            let digits = &f[..f.len().min(3)];
            let millis: u32 = format!("{:0<3}", digits).parse().map_err(|_| invalid())?;
            let width = match digits.len() {
                1 => Duration::milliseconds(100),
                2 => Duration::milliseconds(10),
                _ => Duration::milliseconds(1),
            };
            (millis * 1_000_000, width)
        }
        None if second.is_some() => (0, Duration::seconds(1)),
        None => (0, Duration::minutes(1)),
    };

    let time = NaiveTime::from_hms_nano_opt(hour, minute, second.unwrap_or(0), nanos)
        .ok_or_else(invalid)?;
    let local = date.and_time(time);

    let utc = match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => local,
        Some(offset) => {
            let offset: FixedOffset = offset.parse().map_err(|_| invalid())?;
            offset
                .from_local_datetime(&local)
                .single()
                .map(|dt| dt.with_timezone(&Utc).naive_utc())
                .ok_or_else(invalid)?
        }
    };

    Ok((utc, utc + width))
}

/// Parses a decimal literal, accepting exponent notation.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// Returns the implicit precision range `[low, high)` of a decimal literal:
/// `100` covers `[99.5, 100.5)`, `100.0` covers `[99.95, 100.05)`.
pub fn precision_range(value: Decimal) -> (Decimal, Decimal) {
    let half = Decimal::new(5, (value.scale() + 1).min(28));
    (value - half, value + half)
}

/// Converts a decimal to the floating representation stored in the index.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// A reference normalised to the target's type and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReference {
    /// The target type, when it can be determined.
    pub resource_type: Option<String>,
    /// The target's logical id.
    pub id: String,
}

/// Normalises a reference in relative (`Patient/1`), absolute
/// (`http://host/fhir/Patient/1`, optionally `/_history/n`) or
/// bundle-internal (`urn:uuid:...`) form.
///
/// `declared_type` is `Reference.type`; `default_type` is used when the form
/// itself carries no type (bundle-internal references and bare ids).
/// Contained references (`#x`) are not resolvable and yield `None`.
pub fn canonicalize_reference(
    reference: &str,
    declared_type: Option<&str>,
    default_type: Option<&str>,
) -> Option<CanonicalReference> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let fallback = || declared_type.or(default_type).map(String::from);

    for prefix in ["urn:uuid:", "urn:oid:"] {
        if let Some(id) = reference.strip_prefix(prefix) {
            return (!id.is_empty()).then(|| CanonicalReference {
                resource_type: fallback(),
                id: id.to_string(),
            });
        }
    }

    if let Some(caps) = LITERAL_REFERENCE.captures(reference) {
        return Some(CanonicalReference {
            resource_type: Some(caps[1].to_string()),
            id: caps[2].to_string(),
        });
    }

    // A bare id, as used in queries like `patient=123`.
    if !reference.contains('/') && !reference.contains(':') {
        return Some(CanonicalReference {
            resource_type: fallback(),
            id: reference.to_string(),
        });
    }

    None
}

/// A value extracted and converted for the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    /// String value.
    String {
        /// The value as written.
        raw: String,
        /// The lower-cased value used for default and `:contains` matching.
        normalized: String,
    },

    /// Token value.
    Token {
        /// Code system URI.
        system: Option<String>,
        /// Code value. `None` for text-only concepts.
        code: Option<String>,
        /// Display text (Coding.display or CodeableConcept.text).
        display: Option<String>,
    },

    /// Date interval.
    Date(DateRange),

    /// Number with bounds. Unbounded sides are `None`.
    Number {
        /// The stated value.
        value: Decimal,
        /// Lower bound.
        low: Option<Decimal>,
        /// Upper bound.
        high: Option<Decimal>,
    },

    /// Quantity with bounds and unit.
    Quantity {
        /// The stated value.
        value: Decimal,
        /// Lower bound, `None` for `<` and `<=` comparators.
        low: Option<Decimal>,
        /// Upper bound, `None` for `>` and `>=` comparators.
        high: Option<Decimal>,
        /// Human-readable unit.
        unit: Option<String>,
        /// Unit system URI.
        system: Option<String>,
        /// Unit code.
        code: Option<String>,
    },

    /// Reference to another resource.
    Reference {
        /// The reference as written.
        raw: String,
        /// Canonical target, when resolvable.
        target: Option<CanonicalReference>,
        /// `Reference.identifier` system, for `:identifier`.
        identifier_system: Option<String>,
        /// `Reference.identifier` value, for `:identifier`.
        identifier_value: Option<String>,
    },

    /// URI value.
    Uri(String),
}

impl IndexValue {
    /// Creates a string index value.
    pub fn string(s: impl Into<String>) -> Self {
        let raw = s.into();
        let normalized = normalize_string(&raw);
        IndexValue::String { raw, normalized }
    }

    /// Creates a token index value.
    pub fn token(system: Option<String>, code: impl Into<String>, display: Option<String>) -> Self {
        IndexValue::Token {
            system,
            code: Some(code.into()),
            display,
        }
    }

    /// Creates a token that only carries display text.
    pub fn token_text(display: impl Into<String>) -> Self {
        IndexValue::Token {
            system: None,
            code: None,
            display: Some(display.into()),
        }
    }

    /// Creates an exact number.
    pub fn number(value: Decimal) -> Self {
        IndexValue::Number {
            value,
            low: Some(value),
            high: Some(value),
        }
    }

    /// Returns the parameter type this value is appropriate for.
    pub fn param_type(&self) -> SearchParamType {
        match self {
            IndexValue::String { .. } => SearchParamType::String,
            IndexValue::Token { .. } => SearchParamType::Token,
            IndexValue::Date(_) => SearchParamType::Date,
            IndexValue::Number { .. } => SearchParamType::Number,
            IndexValue::Quantity { .. } => SearchParamType::Quantity,
            IndexValue::Reference { .. } => SearchParamType::Reference,
            IndexValue::Uri(_) => SearchParamType::Uri,
        }
    }
}

/// Lower-cases text for case-insensitive matching.
pub fn normalize_string(s: &str) -> String {
    s.trim().to_lowercase()
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Converter for transforming JSON values to index values.
pub struct ValueConverter;

impl ValueConverter {
    /// Converts a JSON value to index values based on the target parameter type.
    ///
    /// Arrays are flattened. `default_target` is the parameter's single
    /// declared target type, used to resolve bundle-internal references.
    pub fn convert(
        value: &Value,
        target_type: SearchParamType,
        param_name: &str,
        default_target: Option<&str>,
    ) -> Result<Vec<IndexValue>, ExtractionError> {
        match value {
            Value::Array(arr) => {
                let mut results = Vec::new();
                for item in arr {
                    results.extend(Self::convert(item, target_type, param_name, default_target)?);
                }
                Ok(results)
            }
            Value::Null => Ok(Vec::new()),
            _ => match target_type {
                SearchParamType::String => Ok(Self::convert_to_string(value)),
                SearchParamType::Token => Ok(Self::convert_to_token(value)),
                SearchParamType::Date => Self::convert_to_date(value, param_name),
                SearchParamType::Number => Self::convert_to_number(value, param_name),
                SearchParamType::Quantity => Self::convert_to_quantity(value, param_name),
                SearchParamType::Reference => {
                    Ok(Self::convert_to_reference(value, default_target))
                }
                SearchParamType::Uri => Ok(value
                    .as_str()
                    .map(|s| vec![IndexValue::Uri(s.to_string())])
                    .unwrap_or_default()),
                SearchParamType::Composite => Err(ExtractionError::UnsupportedType {
                    parameter: param_name.to_string(),
                    value_type: "composite".to_string(),
                }),
            },
        }
    }

    fn convert_to_string(value: &Value) -> Vec<IndexValue> {
        const PARTS: &[&str] = &[
            // HumanName
            "family", "given", "prefix", "suffix",
            // Address
            "line", "city", "district", "state", "postalCode", "country",
            // Both
            "text",
        ];

        let mut results = Vec::new();
        match value {
            Value::String(s) => results.push(IndexValue::string(s.clone())),
            Value::Object(obj) => {
                for part in PARTS {
                    match obj.get(*part) {
                        Some(Value::String(s)) => results.push(IndexValue::string(s.clone())),
                        Some(Value::Array(items)) => {
                            results.extend(
                                items
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(IndexValue::string),
                            );
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        results
    }

    fn convert_to_token(value: &Value) -> Vec<IndexValue> {
        let mut results = Vec::new();

        match value {
            Value::String(s) => results.push(IndexValue::token(None, s.clone(), None)),
            Value::Bool(b) => results.push(IndexValue::token(None, b.to_string(), None)),
            Value::Number(n) => results.push(IndexValue::token(None, n.to_string(), None)),
            Value::Object(obj) => {
                if let Some(coding) = obj.get("coding").and_then(Value::as_array) {
                    // CodeableConcept
                    for c in coding.iter().filter_map(Value::as_object) {
                        if let Some(code) = str_field(c, "code") {
                            results.push(IndexValue::token(
                                str_field(c, "system"),
                                code,
                                str_field(c, "display"),
                            ));
                        }
                    }
                    if let Some(text) = str_field(obj, "text").filter(|t| !t.is_empty()) {
                        results.push(IndexValue::token_text(text));
                    }
                } else if let Some(code) = str_field(obj, "code") {
                    // Coding
                    results.push(IndexValue::token(
                        str_field(obj, "system"),
                        code,
                        str_field(obj, "display"),
                    ));
                } else if let Some(val) = str_field(obj, "value") {
                    // Identifier or ContactPoint; both carry system + value.
                    results.push(IndexValue::token(str_field(obj, "system"), val, None));
                } else if let Some(text) = str_field(obj, "text") {
                    results.push(IndexValue::token_text(text));
                }
            }
            _ => {}
        }

        results
    }

    fn convert_to_date(value: &Value, param_name: &str) -> Result<Vec<IndexValue>, ExtractionError> {
        let invalid = |message: String| {
            ExtractionError::invalid_value(param_name, value.to_string(), message)
        };

        match value {
            Value::String(s) => Ok(vec![IndexValue::Date(DateRange::parse(s).map_err(invalid)?)]),
            Value::Object(obj) => {
                let start = obj.get("start").and_then(Value::as_str);
                let end = obj.get("end").and_then(Value::as_str);
                if start.is_none() && end.is_none() {
                    return Ok(Vec::new());
                }
                Ok(vec![IndexValue::Date(
                    DateRange::period(start, end).map_err(invalid)?,
                )])
            }
            other => Err(ExtractionError::UnsupportedType {
                parameter: param_name.to_string(),
                value_type: json_kind(other).to_string(),
            }),
        }
    }

    fn convert_to_number(value: &Value, param_name: &str) -> Result<Vec<IndexValue>, ExtractionError> {
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => {
                return Err(ExtractionError::UnsupportedType {
                    parameter: param_name.to_string(),
                    value_type: json_kind(other).to_string(),
                });
            }
        };
        let decimal = parse_decimal(&text).ok_or_else(|| {
            ExtractionError::invalid_value(param_name, text.clone(), "not a decimal number")
        })?;
        Ok(vec![IndexValue::number(decimal)])
    }

    fn convert_to_quantity(
        value: &Value,
        param_name: &str,
    ) -> Result<Vec<IndexValue>, ExtractionError> {
        let Value::Object(obj) = value else {
            return Err(ExtractionError::UnsupportedType {
                parameter: param_name.to_string(),
                value_type: json_kind(value).to_string(),
            });
        };
        let Some(raw) = obj.get("value") else {
            return Ok(Vec::new());
        };
        let text = match raw {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let decimal = parse_decimal(&text).ok_or_else(|| {
            ExtractionError::invalid_value(param_name, text.clone(), "quantity value is not a number")
        })?;

        let (low, high) = match obj.get("comparator").and_then(Value::as_str) {
            Some("<") | Some("<=") => (None, Some(decimal)),
            Some(">") | Some(">=") => (Some(decimal), None),
            Some("ad") | None => (Some(decimal), Some(decimal)),
            Some(other) => {
                return Err(ExtractionError::invalid_value(
                    param_name,
                    other,
                    "unknown quantity comparator",
                ));
            }
        };

        Ok(vec![IndexValue::Quantity {
            value: decimal,
            low,
            high,
            unit: str_field(obj, "unit"),
            system: str_field(obj, "system"),
            code: str_field(obj, "code"),
        }])
    }

    fn convert_to_reference(value: &Value, default_target: Option<&str>) -> Vec<IndexValue> {
        match value {
            Value::String(s) => vec![IndexValue::Reference {
                raw: s.clone(),
                target: canonicalize_reference(s, None, default_target),
                identifier_system: None,
                identifier_value: None,
            }],
            Value::Object(obj) => {
                let raw = str_field(obj, "reference");
                let identifier = obj.get("identifier").and_then(Value::as_object);
                let identifier_value = identifier.and_then(|i| str_field(i, "value"));
                if raw.is_none() && identifier_value.is_none() {
                    return Vec::new();
                }

                let declared = obj.get("type").and_then(Value::as_str);
                let target = raw
                    .as_deref()
                    .and_then(|r| canonicalize_reference(r, declared, default_target));
                vec![IndexValue::Reference {
                    raw: raw.unwrap_or_default(),
                    target,
                    identifier_system: identifier.and_then(|i| str_field(i, "system")),
                    identifier_value,
                }]
            }
            _ => Vec::new(),
        }
    }
}
