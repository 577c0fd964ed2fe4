//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, StorageError, StorageResult};
use crate::search::{SearchParameterExtractor, SearchParameterRegistry};
use crate::versioning::FhirDialect;

use super::schema;

/// SQLite backend for resource storage and search.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    /// Search parameter definitions, shared with the extractor.
    search_registry: Arc<SearchParameterRegistry>,
    /// Extractor for deriving searchable values from resources.
    search_extractor: Arc<SearchParameterExtractor>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("search_registry_len", &self.search_registry.len())
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool. In-memory databases always
    /// use a single connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,

    /// Dialect documents are stored in.
    #[serde(default)]
    pub storage_dialect: FhirDialect,

    /// Bounds applied to search requests.
    #[serde(default)]
    pub search: SearchLimits,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
            storage_dialect: FhirDialect::default(),
            search: SearchLimits::default(),
        }
    }
}

/// Bounds on page sizes and query expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Page size when `_count` is absent.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Largest page size honoured.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Number of include levels, counting the first.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Cap on resources attached by `_include` / `_revinclude`.
    #[serde(default = "default_max_included_resources")]
    pub max_included_resources: usize,

    /// Cap on reference hops in a chain or `_has`.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Counting stops here for `_total=estimate`.
    #[serde(default = "default_total_estimate_cap")]
    pub total_estimate_cap: u64,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    1000
}

fn default_max_include_depth() -> usize {
    3
}

fn default_max_included_resources() -> usize {
    1000
}

fn default_max_chain_depth() -> usize {
    4
}

fn default_total_estimate_cap() -> u64 {
    10_000
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_include_depth: default_max_include_depth(),
            max_included_resources: default_max_included_resources(),
            max_chain_depth: default_max_chain_depth(),
            total_estimate_cap: default_total_estimate_cap(),
        }
    }
}

impl SearchLimits {
    /// Resolves the page size for a requested `_count`.
    ///
    /// `0` is kept (a total-only request); anything else is clamped to
    /// `[1, max_page_size]`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            None => self.default_page_size.clamp(1, self.max_page_size.max(1)),
            Some(0) => 0,
            Some(n) => n.clamp(1, self.max_page_size.max(1)),
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration and the standard
    /// parameter table.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        Self::with_registry(path, config, Arc::new(SearchParameterRegistry::standard()))
    }

    /// Creates a backend with a custom parameter table.
    pub fn with_registry<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
        search_registry: Arc<SearchParameterRegistry>,
    ) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        }
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            }
            if wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(())
        });

        // Every in-memory connection is its own database, so the pool holds
        // exactly one and never recycles it.
        let max_size = if is_memory { 1 } else { config.max_connections.max(1) };
        let mut builder = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to open database {}: {}", path_str, e),
                source: None,
            })
        })?;

        tracing::info!(
            path = %path_str,
            pool_size = max_size,
            storage_dialect = %config.storage_dialect,
            search_params = search_registry.len(),
            "Opened SQLite backend"
        );

        let search_extractor = Arc::new(SearchParameterExtractor::new(search_registry.clone()));

        Ok(Self {
            pool,
            config,
            is_memory,
            search_registry,
            search_extractor,
        })
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Runs a trivial query to confirm the database is reachable.
    pub fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns the search bounds.
    pub fn search_limits(&self) -> &SearchLimits {
        &self.config.search
    }

    /// Returns a reference to the search parameter registry.
    pub fn search_registry(&self) -> &Arc<SearchParameterRegistry> {
        &self.search_registry
    }

    /// Returns a reference to the search parameter extractor.
    pub fn search_extractor(&self) -> &Arc<SearchParameterExtractor> {
        &self.search_extractor
    }
}
