//! The closed set of resource kinds this server stores and indexes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::versioning::FhirDialect;

/// A supported resource kind.
///
/// Unrecognised type names parse to [`ResourceKind::Unknown`] so callers can
/// report them; the store refuses to persist unknown kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AllergyIntolerance,
    Condition,
    DiagnosticReport,
    Encounter,
    Immunization,
    Location,
    Media,
    Medication,
    MedicationRequest,
    Observation,
    Organization,
    Patient,
    Practitioner,
    Procedure,
    Provenance,
    RiskAssessment,
    /// A type name outside the supported set.
    Unknown(String),
}

impl ResourceKind {
    /// Every supported kind, in alphabetical order.
    pub const SUPPORTED: &'static [ResourceKind] = &[
        ResourceKind::AllergyIntolerance,
        ResourceKind::Condition,
        ResourceKind::DiagnosticReport,
        ResourceKind::Encounter,
        ResourceKind::Immunization,
        ResourceKind::Location,
        ResourceKind::Media,
        ResourceKind::Medication,
        ResourceKind::MedicationRequest,
        ResourceKind::Observation,
        ResourceKind::Organization,
        ResourceKind::Patient,
        ResourceKind::Practitioner,
        ResourceKind::Procedure,
        ResourceKind::Provenance,
        ResourceKind::RiskAssessment,
    ];

    /// Parses a type name; never fails.
    pub fn parse(name: &str) -> Self {
        match name {
            "AllergyIntolerance" => ResourceKind::AllergyIntolerance,
            "Condition" => ResourceKind::Condition,
            "DiagnosticReport" => ResourceKind::DiagnosticReport,
            "Encounter" => ResourceKind::Encounter,
            "Immunization" => ResourceKind::Immunization,
            "Location" => ResourceKind::Location,
            "Media" => ResourceKind::Media,
            "Medication" => ResourceKind::Medication,
            "MedicationRequest" => ResourceKind::MedicationRequest,
            "Observation" => ResourceKind::Observation,
            "Organization" => ResourceKind::Organization,
            "Patient" => ResourceKind::Patient,
            "Practitioner" => ResourceKind::Practitioner,
            "Procedure" => ResourceKind::Procedure,
            "Provenance" => ResourceKind::Provenance,
            "RiskAssessment" => ResourceKind::RiskAssessment,
            other => ResourceKind::Unknown(other.to_string()),
        }
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::AllergyIntolerance => "AllergyIntolerance",
            ResourceKind::Condition => "Condition",
            ResourceKind::DiagnosticReport => "DiagnosticReport",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::Immunization => "Immunization",
            ResourceKind::Location => "Location",
            ResourceKind::Media => "Media",
            ResourceKind::Medication => "Medication",
            ResourceKind::MedicationRequest => "MedicationRequest",
            ResourceKind::Observation => "Observation",
            ResourceKind::Organization => "Organization",
            ResourceKind::Patient => "Patient",
            ResourceKind::Practitioner => "Practitioner",
            ResourceKind::Procedure => "Procedure",
            ResourceKind::Provenance => "Provenance",
            ResourceKind::RiskAssessment => "RiskAssessment",
            ResourceKind::Unknown(name) => name,
        }
    }

    /// Returns true for every kind except [`ResourceKind::Unknown`].
    pub fn is_supported(&self) -> bool {
        !matches!(self, ResourceKind::Unknown(_))
    }

    /// Returns the dialects in which this kind exists.
    pub fn dialects(&self) -> &'static [FhirDialect] {
        match self {
            // Replaced by DocumentReference from R5 onwards.
            ResourceKind::Media => &[FhirDialect::R4],
            ResourceKind::Unknown(_) => &[],
            _ => FhirDialect::ALL,
        }
    }

    /// Returns true if this kind exists in `dialect`.
    pub fn is_available_in(&self, dialect: FhirDialect) -> bool {
        self.dialects().contains(&dialect)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ResourceKind::parse(s))
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ResourceKind::parse(&name))
    }
}
