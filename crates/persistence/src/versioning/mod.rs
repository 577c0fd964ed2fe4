//! Multi-dialect support.
//!
//! - [`FhirDialect`] - The supported wire-format releases
//! - [`VersionDetector`] - Guesses the dialect of an incoming document
//! - [`VersionNegotiator`] - Chooses the response dialect from `Accept`
//! - [`VersionTransformer`] - Converts documents between dialects
//! - [`PlanRegistry`] - Per-kind field-mapping plans with a default plan
//! - [`VersionCompatibility`] - Fidelity of a conversion
//!
//! Everything here is a pure function of its inputs; the registries are
//! built once and shared behind `Arc`.
//!
//! # Example
//!
//! ```
//! use hcs_persistence::versioning::{FhirDialect, VersionTransformer};
//! use serde_json::json;
//!
//! let transformer = VersionTransformer::default();
//! let r4 = json!({
//!     "resourceType": "MedicationRequest",
//!     "medicationCodeableConcept": {"text": "Aspirin"}
//! });
//!
//! let r5 = transformer
//!     .transform(&r4, FhirDialect::R4, FhirDialect::R5, "MedicationRequest")
//!     .unwrap();
//! assert_eq!(r5.resource["medication"]["concept"]["text"], "Aspirin");
//! assert!(!r5.warnings.is_empty());
//! ```

mod compatibility;
mod detector;
mod dialect;
mod error;
mod negotiator;
mod plans;
mod rules;
mod transformer;

pub use compatibility::{CompatibilityLevel, DataLossRisk, VersionCompatibility};
pub use detector::{DetectionResult, FALLBACK_CONFIDENCE, FHIR_VERSION_TAG_SYSTEM, VersionDetector};
pub use dialect::FhirDialect;
pub use error::VersionError;
pub use negotiator::{
    NegotiationResult, VersionNegotiator, VersionPreference, parse_accept_preferences,
};
pub use plans::{PlanRegistry, TransformationPlan};
pub use rules::{DataLossEvent, FieldEffect, RuleLog, TransformRule, cross_version_extension_url};
pub use transformer::{TransformationResult, VersionTransformer};
