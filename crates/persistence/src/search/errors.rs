//! Search-specific error types.
//!
//! [`ExtractionError`] is raised by the indexer while deriving search rows
//! from a document. Any extraction error aborts the triggering write.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error during search value extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractionError {
    /// A declared parameter found a value it cannot index.
    InvalidValue {
        /// The parameter name.
        parameter: String,
        /// The offending value, rendered as text.
        value: String,
        /// What was wrong with it.
        message: String,
    },

    /// A declared parameter found a JSON shape it does not understand.
    UnsupportedType {
        /// The parameter name.
        parameter: String,
        /// The JSON shape found.
        value_type: String,
    },

    /// Resource is not a valid JSON object.
    InvalidResource {
        /// Description of the problem.
        message: String,
    },
}

impl ExtractionError {
    /// Builds an [`ExtractionError::InvalidValue`].
    pub fn invalid_value(
        parameter: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ExtractionError::InvalidValue {
            parameter: parameter.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::InvalidValue {
                parameter,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for parameter '{}': {}",
                    value, parameter, message
                )
            }
            ExtractionError::UnsupportedType {
                parameter,
                value_type,
            } => {
                write!(
                    f,
                    "Cannot index {} value for parameter '{}'",
                    value_type, parameter
                )
            }
            ExtractionError::InvalidResource { message } => {
                write!(f, "Invalid resource: {}", message)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ExtractionError::invalid_value("birthdate", "1980-13-45", "month out of range");
        let msg = err.to_string();
        assert!(msg.contains("birthdate"));
        assert!(msg.contains("1980-13-45"));
        assert!(msg.contains("month out of range"));
    }

    #[test]
    fn test_unsupported_type_display() {
        let err = ExtractionError::UnsupportedType {
            parameter: "value-quantity".to_string(),
            value_type: "array".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot index array value for parameter 'value-quantity'"
        );
    }
}
