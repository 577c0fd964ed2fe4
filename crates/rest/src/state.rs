//! Application state shared by all handlers.
//!
//! The state is built once at start-up and cloned into each request. It owns
//! the store and the versioning services; nothing else is global.

use std::sync::Arc;

use hcs_persistence::core::{
    ConditionalStorage, IncludeProvider, InstanceHistoryProvider, ResourceStorage, SearchProvider,
    VersionedStorage,
};
use hcs_persistence::search::SearchParameterRegistry;
use hcs_persistence::versioning::{
    FhirDialect, PlanRegistry, VersionDetector, VersionNegotiator, VersionTransformer,
};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Every storage capability the REST API uses.
///
/// Implemented automatically for any store providing the individual traits.
pub trait ClinicalStorage:
    ResourceStorage
    + VersionedStorage
    + ConditionalStorage
    + InstanceHistoryProvider
    + SearchProvider
    + IncludeProvider
    + 'static
{
}

impl<T> ClinicalStorage for T where
    T: ResourceStorage
        + VersionedStorage
        + ConditionalStorage
        + InstanceHistoryProvider
        + SearchProvider
        + IncludeProvider
        + 'static
{
}

/// Shared application state.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hcs_rest::{AppState, ServerConfig};
/// use hcs_persistence::backends::sqlite::SqliteBackend;
///
/// let backend = SqliteBackend::in_memory().unwrap();
/// backend.init_schema().unwrap();
/// let state = AppState::new(Arc::new(backend), ServerConfig::default());
/// ```
pub struct AppState<S> {
    storage: Arc<S>,
    config: Arc<ServerConfig>,
    transformer: Arc<VersionTransformer>,
    negotiator: Arc<VersionNegotiator>,
    detector: Arc<VersionDetector>,
    search_registry: Arc<SearchParameterRegistry>,
    shutdown: CancellationToken,
}

// S is behind an Arc and need not be Clone.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: Arc::clone(&self.config),
            transformer: Arc::clone(&self.transformer),
            negotiator: Arc::clone(&self.negotiator),
            detector: Arc::clone(&self.detector),
            search_registry: Arc::clone(&self.search_registry),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: ResourceStorage> AppState<S> {
    /// Creates the state with the standard transformation plans.
    pub fn new(storage: Arc<S>, config: ServerConfig) -> Self {
        Self::with_plans(storage, config, Arc::new(PlanRegistry::standard()))
    }

    /// Creates the state with a custom plan registry.
    pub fn with_plans(storage: Arc<S>, config: ServerConfig, plans: Arc<PlanRegistry>) -> Self {
        let negotiator = VersionNegotiator::new(
            config.fhir_versions.clone(),
            storage.storage_dialect(),
            Arc::clone(&plans),
        );

        Self {
            storage,
            config: Arc::new(config),
            transformer: Arc::new(VersionTransformer::new(Arc::clone(&plans))),
            negotiator: Arc::new(negotiator),
            detector: Arc::new(VersionDetector::new(plans)),
            search_registry: Arc::new(SearchParameterRegistry::standard()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Returns the dialect documents are stored in.
    pub fn storage_dialect(&self) -> FhirDialect {
        self.storage.storage_dialect()
    }

    /// Returns the document transformer.
    pub fn transformer(&self) -> &VersionTransformer {
        &self.transformer
    }

    /// Returns the response dialect negotiator.
    pub fn negotiator(&self) -> &VersionNegotiator {
        &self.negotiator
    }

    /// Returns the incoming document dialect detector.
    pub fn detector(&self) -> &VersionDetector {
        &self.detector
    }

    /// Returns the search parameter definitions used to parse queries.
    pub fn search_registry(&self) -> &SearchParameterRegistry {
        &self.search_registry
    }

    /// Returns the server-wide shutdown token.
    ///
    /// Request contexts are child tokens, so cancelling this one cancels
    /// all in-flight work.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcs_persistence::backends::sqlite::SqliteBackend;

    fn backend() -> Arc<SqliteBackend> {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        Arc::new(backend)
    }

    #[test]
    fn test_app_state_creation() {
        let config = ServerConfig {
            base_url: "https://fhir.example.com/".to_string(),
            ..ServerConfig::for_testing()
        };
        let state = AppState::new(backend(), config);

        assert_eq!(state.storage().backend_name(), "sqlite");
        assert_eq!(state.base_url(), "https://fhir.example.com");
        assert_eq!(state.storage_dialect(), FhirDialect::R4);
        assert_eq!(state.negotiator().default_dialect(), FhirDialect::R4);
        assert_eq!(state.negotiator().supported().len(), 3);
    }

    #[test]
    fn test_app_state_clone_shares_services() {
        let state = AppState::new(backend(), ServerConfig::for_testing());
        let cloned = state.clone();

        assert!(Arc::ptr_eq(&state.storage, &cloned.storage));
        assert!(Arc::ptr_eq(&state.transformer, &cloned.transformer));
    }
}
