//! Compatibility model for dialect conversions.
//!
//! A [`VersionCompatibility`] summarises how well documents of one kind
//! convert between two dialects. It is derived from the field effects the
//! transformation plans declare, and composes across hops by taking the
//! worst level and the highest risk.

use serde::{Deserialize, Serialize};

use crate::types::ResourceKind;

use super::dialect::FhirDialect;

/// Coarse classification of a conversion's fidelity.
///
/// Ordered worst first, so `min` of two levels is the worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityLevel {
    /// No conversion is possible.
    None,
    /// Conversion loses several fields.
    Minimal,
    /// Conversion loses a few fields.
    Partial,
    /// Conversion is lossless.
    Full,
}

impl CompatibilityLevel {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::None => "none",
            CompatibilityLevel::Minimal => "minimal",
            CompatibilityLevel::Partial => "partial",
            CompatibilityLevel::Full => "full",
        }
    }
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Likelihood that a conversion drops data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLossRisk {
    /// Nothing is dropped.
    None,
    /// Only unusual documents lose data.
    Low,
    /// One field is dropped.
    Medium,
    /// Two fields are dropped.
    High,
    /// Most content is dropped, or conversion is impossible.
    Severe,
}

impl DataLossRisk {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataLossRisk::None => "none",
            DataLossRisk::Low => "low",
            DataLossRisk::Medium => "medium",
            DataLossRisk::High => "high",
            DataLossRisk::Severe => "severe",
        }
    }
}

impl std::fmt::Display for DataLossRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compatibility of one kind between a source and target dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCompatibility {
    /// Source dialect.
    pub source: FhirDialect,
    /// Target dialect.
    pub target: FhirDialect,
    /// The resource type.
    pub resource_type: String,
    /// Fidelity of the conversion.
    pub level: CompatibilityLevel,
    /// Likelihood of data loss.
    pub risk: DataLossRisk,
    /// Fields carried across, possibly under a new name.
    pub preserved_fields: Vec<String>,
    /// Fields with no counterpart in the target.
    pub lost_fields: Vec<String>,
    /// Fields that only exist in the target.
    pub added_fields: Vec<String>,
}

impl VersionCompatibility {
    /// A lossless conversion with no declared field changes.
    pub fn full(kind: &ResourceKind, source: FhirDialect, target: FhirDialect) -> Self {
        Self {
            source,
            target,
            resource_type: kind.as_str().to_string(),
            level: CompatibilityLevel::Full,
            risk: DataLossRisk::None,
            preserved_fields: Vec::new(),
            lost_fields: Vec::new(),
            added_fields: Vec::new(),
        }
    }

    /// A conversion that cannot be performed at all.
    pub fn unavailable(kind: &ResourceKind, source: FhirDialect, target: FhirDialect) -> Self {
        Self {
            level: CompatibilityLevel::None,
            risk: DataLossRisk::Severe,
            ..Self::full(kind, source, target)
        }
    }

    /// Builds the compatibility from declared field effects.
    ///
    /// `conditional_loss` is set when some rule only loses data for certain
    /// documents (e.g. collapsing a list to one element).
    pub fn from_fields(
        kind: &ResourceKind,
        source: FhirDialect,
        target: FhirDialect,
        preserved_fields: Vec<String>,
        lost_fields: Vec<String>,
        added_fields: Vec<String>,
        conditional_loss: bool,
    ) -> Self {
        let level = match lost_fields.len() {
            0 => CompatibilityLevel::Full,
            1 | 2 => CompatibilityLevel::Partial,
            _ => CompatibilityLevel::Minimal,
        };
        let risk = match (lost_fields.len(), conditional_loss) {
            (0, false) => DataLossRisk::None,
            (0, true) => DataLossRisk::Low,
            (1, _) => DataLossRisk::Medium,
            (2, _) => DataLossRisk::High,
            _ => DataLossRisk::Severe,
        };

        Self {
            source,
            target,
            resource_type: kind.as_str().to_string(),
            level,
            risk,
            preserved_fields,
            lost_fields,
            added_fields,
        }
    }

    /// Returns true if the conversion can be attempted.
    pub fn is_available(&self) -> bool {
        self.level != CompatibilityLevel::None
    }

    /// Composes this hop with the following one.
    pub fn then(mut self, next: &VersionCompatibility) -> Self {
        self.target = next.target;
        self.level = self.level.min(next.level);
        self.risk = self.risk.max(next.risk);
        merge_unique(&mut self.preserved_fields, &next.preserved_fields);
        merge_unique(&mut self.lost_fields, &next.lost_fields);
        merge_unique(&mut self.added_fields, &next.added_fields);
        self
    }
}

fn merge_unique(into: &mut Vec<String>, from: &[String]) {
    for field in from {
        if !into.contains(field) {
            into.push(field.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_lost_fields() {
        let kind = ResourceKind::Encounter;
        let c = VersionCompatibility::from_fields(
            &kind,
            FhirDialect::R5,
            FhirDialect::R4,
            vec!["class".into()],
            vec!["virtualService".into()],
            vec![],
            true,
        );
        assert_eq!(c.level, CompatibilityLevel::Partial);
        assert_eq!(c.risk, DataLossRisk::Medium);

        let lossless = VersionCompatibility::from_fields(
            &kind,
            FhirDialect::R4,
            FhirDialect::R5,
            vec![],
            vec![],
            vec![],
            false,
        );
        assert_eq!(lossless.level, CompatibilityLevel::Full);
        assert_eq!(lossless.risk, DataLossRisk::None);
    }

    #[test]
    fn test_compose_takes_worst() {
        let kind = ResourceKind::Encounter;
        let first = VersionCompatibility::full(&kind, FhirDialect::R6, FhirDialect::R5);
        let second = VersionCompatibility::from_fields(
            &kind,
            FhirDialect::R5,
            FhirDialect::R4,
            vec![],
            vec!["virtualService".into()],
            vec![],
            false,
        );
        let composed = first.then(&second);
        assert_eq!(composed.source, FhirDialect::R6);
        assert_eq!(composed.target, FhirDialect::R4);
        assert_eq!(composed.level, CompatibilityLevel::Partial);
        assert_eq!(composed.lost_fields, vec!["virtualService".to_string()]);
    }

    #[test]
    fn test_unavailable() {
        let c = VersionCompatibility::unavailable(
            &ResourceKind::Media,
            FhirDialect::R4,
            FhirDialect::R5,
        );
        assert!(!c.is_available());
        assert_eq!(c.risk, DataLossRisk::Severe);
    }
}
