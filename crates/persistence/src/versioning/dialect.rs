//! Wire-format dialects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::VersionError;

/// A FHIR wire-format dialect.
///
/// Dialects are ordered oldest first, so `R4 < R5 < R6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum FhirDialect {
    /// FHIR R4 (4.0.1)
    #[default]
    R4,
    /// FHIR R5 (5.0.0)
    R5,
    /// FHIR R6 (6.0.0)
    R6,
}

impl FhirDialect {
    /// All dialects, oldest first.
    pub const ALL: &'static [FhirDialect] = &[FhirDialect::R4, FhirDialect::R5, FhirDialect::R6];

    /// Returns the short name ("R4").
    pub fn as_str(&self) -> &'static str {
        match self {
            FhirDialect::R4 => "R4",
            FhirDialect::R5 => "R5",
            FhirDialect::R6 => "R6",
        }
    }

    /// Returns the full version number ("4.0.1").
    pub fn version(&self) -> &'static str {
        match self {
            FhirDialect::R4 => "4.0.1",
            FhirDialect::R5 => "5.0.0",
            FhirDialect::R6 => "6.0.0",
        }
    }

    /// Returns `major.minor`, as used in cross-version extension URLs.
    pub fn major_minor(&self) -> &'static str {
        match self {
            FhirDialect::R4 => "4.0",
            FhirDialect::R5 => "5.0",
            FhirDialect::R6 => "6.0",
        }
    }

    /// Returns the value used in the `fhirVersion` MIME parameter.
    pub fn as_mime_param(&self) -> &'static str {
        self.version()
    }

    /// Parses a version string leniently.
    ///
    /// Accepts `R4`, `4.0` and `4.0.1` style values (and the R5 and R6
    /// equivalents), ignoring any pre-release suffix such as `-ballot3`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_matches('"');
        let base = s.split('-').next().unwrap_or(s);
        match base.to_ascii_uppercase().as_str() {
            "R4" | "4.0" | "4.0.0" | "4.0.1" => Some(FhirDialect::R4),
            "R5" | "5.0" | "5.0.0" => Some(FhirDialect::R5),
            "R6" | "6.0" | "6.0.0" => Some(FhirDialect::R6),
            _ => None,
        }
    }

    /// Returns the next newer dialect.
    pub fn next(&self) -> Option<Self> {
        match self {
            FhirDialect::R4 => Some(FhirDialect::R5),
            FhirDialect::R5 => Some(FhirDialect::R6),
            FhirDialect::R6 => None,
        }
    }

    /// Returns the next older dialect.
    pub fn previous(&self) -> Option<Self> {
        match self {
            FhirDialect::R4 => None,
            FhirDialect::R5 => Some(FhirDialect::R4),
            FhirDialect::R6 => Some(FhirDialect::R5),
        }
    }

    /// Returns the adjacent hops leading from `self` to `target`.
    ///
    /// Empty when the dialects are equal.
    pub fn hops_to(self, target: FhirDialect) -> Vec<(FhirDialect, FhirDialect)> {
        let mut hops = Vec::new();
        let mut current = self;
        while current != target {
            let step = if current < target {
                current.next()
            } else {
                current.previous()
            };
            let Some(step) = step else { break };
            hops.push((current, step));
            current = step;
        }
        hops
    }
}

impl fmt::Display for FhirDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FhirDialect {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FhirDialect::parse(s).ok_or_else(|| VersionError::UnsupportedVersion {
            version: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(FhirDialect::parse("4.0"), Some(FhirDialect::R4));
        assert_eq!(FhirDialect::parse("4.0.1"), Some(FhirDialect::R4));
        assert_eq!(FhirDialect::parse("r5"), Some(FhirDialect::R5));
        assert_eq!(FhirDialect::parse("6.0.0-ballot3"), Some(FhirDialect::R6));
        assert_eq!(FhirDialect::parse("3.0.2"), None);
        assert!("1.0".parse::<FhirDialect>().is_err());
    }

    #[test]
    fn test_ordering_and_default() {
        assert!(FhirDialect::R4 < FhirDialect::R6);
        assert_eq!(FhirDialect::default(), FhirDialect::R4);
        assert_eq!(FhirDialect::R5.to_string(), "R5");
        assert_eq!(FhirDialect::R6.version(), "6.0.0");
    }

    #[test]
    fn test_hops() {
        assert!(FhirDialect::R5.hops_to(FhirDialect::R5).is_empty());
        assert_eq!(
            FhirDialect::R4.hops_to(FhirDialect::R6),
            vec![
                (FhirDialect::R4, FhirDialect::R5),
                (FhirDialect::R5, FhirDialect::R6)
            ]
        );
        assert_eq!(
            FhirDialect::R6.hops_to(FhirDialect::R4),
            vec![
                (FhirDialect::R6, FhirDialect::R5),
                (FhirDialect::R5, FhirDialect::R4)
            ]
        );
    }
}
