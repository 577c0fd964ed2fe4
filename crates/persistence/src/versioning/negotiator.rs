//! Response dialect negotiation.
//!
//! Clients name the dialects they accept through `fhirVersion` parameters on
//! `Accept` media ranges, optionally weighted with `q`. The negotiator picks
//! the response dialect and reports whether (and how well) the stored
//! document must be transformed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::ResourceKind;

use super::compatibility::VersionCompatibility;
use super::dialect::FhirDialect;
use super::error::VersionError;
use super::plans::PlanRegistry;

/// One client-requested version with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPreference {
    /// The version string as sent.
    pub version: String,
    /// The `q` weight in `(0, 1]`.
    pub quality: f32,
}

impl VersionPreference {
    /// Creates a preference with weight 1.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            quality: 1.0,
        }
    }

    /// Returns the dialect this preference names, if supported.
    pub fn dialect(&self) -> Option<FhirDialect> {
        FhirDialect::parse(&self.version)
    }
}

/// Parses the `fhirVersion` preferences from an `Accept` header value.
///
/// Media ranges without a `fhirVersion` parameter are skipped, as are ranges
/// with `q=0`. The result is ordered by weight, then header order.
///
/// ```
/// use hcs_persistence::versioning::parse_accept_preferences;
///
/// let prefs = parse_accept_preferences(
///     "application/fhir+json; fhirVersion=4.0; q=0.5, application/fhir+json; fhirVersion=5.0",
/// );
/// assert_eq!(prefs[0].version, "5.0");
/// assert_eq!(prefs[1].version, "4.0");
/// ```
pub fn parse_accept_preferences(accept: &str) -> Vec<VersionPreference> {
    let mut prefs = Vec::new();

    for range in accept.split(',') {
        let mut version = None;
        let mut quality = 1.0f32;
        for param in range.split(';').skip(1) {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match name.trim().to_ascii_lowercase().as_str() {
                "fhirversion" => version = Some(value.to_string()),
                "q" => quality = value.parse().unwrap_or(1.0),
                _ => {}
            }
        }
        if let Some(version) = version {
            if quality > 0.0 {
                prefs.push(VersionPreference { version, quality });
            }
        }
    }

    // Stable sort keeps header order among equal weights.
    prefs.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    prefs
}

/// The negotiated response dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResult {
    /// Dialect the document is stored in.
    pub source: FhirDialect,
    /// Dialect to respond in.
    pub target: FhirDialect,
    /// True when `source != target`.
    pub transformation_needed: bool,
    /// How well the document converts.
    pub compatibility: VersionCompatibility,
}

/// Chooses response dialects against the server's capabilities.
#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    supported: Vec<FhirDialect>,
    default_dialect: FhirDialect,
    plans: Arc<PlanRegistry>,
}

impl VersionNegotiator {
    /// Creates a negotiator serving `supported`, falling back to
    /// `default_dialect` when the client expresses no preference.
    pub fn new(
        supported: Vec<FhirDialect>,
        default_dialect: FhirDialect,
        plans: Arc<PlanRegistry>,
    ) -> Self {
        Self {
            supported,
            default_dialect,
            plans,
        }
    }

    /// Returns the served dialects.
    pub fn supported(&self) -> &[FhirDialect] {
        &self.supported
    }

    /// Returns the server default dialect.
    pub fn default_dialect(&self) -> FhirDialect {
        self.default_dialect
    }

    /// Returns true if `dialect` is served.
    pub fn is_supported(&self, dialect: FhirDialect) -> bool {
        self.supported.contains(&dialect)
    }

    /// Picks the response dialect for a document stored in `source`.
    ///
    /// Among the highest-weighted supported preferences, the source dialect
    /// wins (no transformation); otherwise the newest one does. With no
    /// preferences the source is used when served, else the default.
    pub fn negotiate(
        &self,
        preferences: &[VersionPreference],
        source: FhirDialect,
        kind: &ResourceKind,
    ) -> Result<NegotiationResult, VersionError> {
        let target = if preferences.is_empty() {
            if self.is_supported(source) {
                source
            } else {
                self.default_dialect
            }
        } else {
            let candidates: Vec<(FhirDialect, f32)> = preferences
                .iter()
                .filter_map(|p| p.dialect().map(|d| (d, p.quality)))
                .filter(|(d, _)| self.is_supported(*d))
                .collect();

            let Some(top) = candidates.iter().map(|(_, q)| *q).reduce(f32::max) else {
                return Err(VersionError::NoAcceptableVersion {
                    requested: preferences.iter().map(|p| p.version.clone()).collect(),
                    supported: self.supported.clone(),
                });
            };

            let best: Vec<FhirDialect> = candidates
                .iter()
                .filter(|(_, q)| *q == top)
                .map(|(d, _)| *d)
                .collect();
            if best.contains(&source) {
                source
            } else {
                best.into_iter().max().unwrap_or(self.default_dialect)
            }
        };

        Ok(NegotiationResult {
            source,
            target,
            transformation_needed: source != target,
            compatibility: self.plans.compatibility(kind, source, target),
        })
    }
}

impl Default for VersionNegotiator {
    fn default() -> Self {
        Self::new(
            FhirDialect::ALL.to_vec(),
            FhirDialect::default(),
            Arc::new(PlanRegistry::standard()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::CompatibilityLevel;

    fn negotiator(supported: &[FhirDialect]) -> VersionNegotiator {
        VersionNegotiator::new(
            supported.to_vec(),
            FhirDialect::R4,
            Arc::new(PlanRegistry::standard()),
        )
    }

    #[test]
    fn test_parse_accept() {
        let prefs = parse_accept_preferences(
            "application/fhir+json; fhirVersion=4.0.1; q=0.2, application/json, \
             application/fhir+json; fhirVersion=6.0; q=0",
        );
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].version, "4.0.1");
        assert!(parse_accept_preferences("application/fhir+json").is_empty());
    }

    #[test]
    fn test_no_preferences_uses_source() {
        let n = negotiator(FhirDialect::ALL);
        let result = n.negotiate(&[], FhirDialect::R5, &ResourceKind::Patient).unwrap();
        assert_eq!(result.target, FhirDialect::R5);
        assert!(!result.transformation_needed);

        let r4_only = negotiator(&[FhirDialect::R4]);
        let result = r4_only
            .negotiate(&[], FhirDialect::R5, &ResourceKind::Patient)
            .unwrap();
        assert_eq!(result.target, FhirDialect::R4);
        assert!(result.transformation_needed);
    }

    #[test]
    fn test_exact_match_preferred() {
        let n = negotiator(FhirDialect::ALL);
        let prefs = vec![VersionPreference::new("5.0"), VersionPreference::new("4.0")];
        let result = n
            .negotiate(&prefs, FhirDialect::R4, &ResourceKind::MedicationRequest)
            .unwrap();
        assert_eq!(result.target, FhirDialect::R4);
    }

    #[test]
    fn test_highest_supported_when_transforming() {
        let n = negotiator(FhirDialect::ALL);
        let prefs = vec![VersionPreference::new("5.0"), VersionPreference::new("6.0")];
        let result = n
            .negotiate(&prefs, FhirDialect::R4, &ResourceKind::Encounter)
            .unwrap();
        assert_eq!(result.target, FhirDialect::R6);
        assert!(result.transformation_needed);
        assert_eq!(result.compatibility.level, CompatibilityLevel::Full);
    }

    #[test]
    fn test_no_acceptable_version() {
        let n = negotiator(&[FhirDialect::R4]);
        let prefs = vec![VersionPreference::new("5.0"), VersionPreference::new("3.0")];
        let err = n
            .negotiate(&prefs, FhirDialect::R4, &ResourceKind::Patient)
            .unwrap_err();
        assert!(matches!(err, VersionError::NoAcceptableVersion { .. }));
    }

    #[test]
    fn test_media_compatibility_none() {
        let n = negotiator(FhirDialect::ALL);
        let result = n
            .negotiate(
                &[VersionPreference::new("5.0")],
                FhirDialect::R4,
                &ResourceKind::Media,
            )
            .unwrap();
        assert_eq!(result.compatibility.level, CompatibilityLevel::None);
    }
}
