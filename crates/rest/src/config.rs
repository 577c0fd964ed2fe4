//! Server configuration for the clinical data REST API.
//!
//! Every setting can come from the command line or from an environment
//! variable; unset values fall back to the defaults below.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HCS_PORT` | 8080 | Server port |
//! | `HCS_HOST` | 127.0.0.1 | Host to bind |
//! | `HCS_LOG_LEVEL` | info | Log level |
//! | `HCS_BASE_URL` | http://localhost:8080 | Base URL used in links and `Location` |
//! | `HCS_DATABASE_URL` | (in-memory) | SQLite database file |
//! | `HCS_REQUEST_TIMEOUT` | 30s | Request timeout (`humantime` syntax) |
//! | `HCS_DEFAULT_PAGE_SIZE` | 20 | Search page size when `_count` is absent |
//! | `HCS_MAX_PAGE_SIZE` | 1000 | Upper bound for `_count` |
//! | `HCS_MAX_INCLUDE_DEPTH` | 3 | `_include:iterate` rounds |
//! | `HCS_MAX_INCLUDED_RESOURCES` | 1000 | Included resources per search |
//! | `HCS_MAX_CHAIN_DEPTH` | 4 | Chain and `_has` nesting |
//! | `HCS_STORAGE_VERSION` | 4.0.1 | Dialect documents are stored in |
//! | `HCS_FHIR_VERSIONS` | 4.0.1,5.0.0,6.0.0 | Dialects served to clients |
//! | `HCS_ENABLE_CORS` | true | Enable CORS |
//! | `HCS_CORS_ORIGINS` | * | Allowed origins |
//!
//! # Example
//!
//! ```rust
//! use hcs_rest::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 3000,
//!     host: "0.0.0.0".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use clap::Parser;
use hcs_persistence::backends::sqlite::{SearchLimits, SqliteBackendConfig};
use hcs_persistence::versioning::FhirDialect;

/// Server configuration.
///
/// Built from the command line and environment with [`ServerConfig::parse`],
/// from the environment only with [`ServerConfig::from_env`], or
/// programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "hcs")]
#[command(about = "Helios Clinical Server")]
pub struct ServerConfig {
    /// Server port.
    #[arg(short, long, env = "HCS_PORT", default_value = "8080")]
    pub port: u16,

    /// Host to bind.
    #[arg(long, env = "HCS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HCS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Base URL used in bundle links and `Location` headers.
    #[arg(long, env = "HCS_BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// SQLite database file. In-memory when unset.
    #[arg(long, env = "HCS_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Request timeout, e.g. `30s` or `2m`.
    #[arg(long, env = "HCS_REQUEST_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Search page size when `_count` is absent.
    #[arg(long, env = "HCS_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: u32,

    /// Upper bound for `_count`.
    #[arg(long, env = "HCS_MAX_PAGE_SIZE", default_value = "1000")]
    pub max_page_size: u32,

    /// Rounds of `_include:iterate` expansion.
    #[arg(long, env = "HCS_MAX_INCLUDE_DEPTH", default_value = "3")]
    pub max_include_depth: usize,

    /// Included resources per search response.
    #[arg(long, env = "HCS_MAX_INCLUDED_RESOURCES", default_value = "1000")]
    pub max_included_resources: usize,

    /// Nesting bound for chained parameters and `_has`.
    #[arg(long, env = "HCS_MAX_CHAIN_DEPTH", default_value = "4")]
    pub max_chain_depth: usize,

    /// Dialect documents are stored in.
    #[arg(long, env = "HCS_STORAGE_VERSION", default_value = "4.0.1", value_parser = parse_dialect)]
    pub storage_version: FhirDialect,

    /// Dialects served to clients.
    #[arg(
        long,
        env = "HCS_FHIR_VERSIONS",
        default_value = "4.0.1,5.0.0,6.0.0",
        value_delimiter = ',',
        value_parser = parse_dialect
    )]
    pub fhir_versions: Vec<FhirDialect>,

    /// Enable CORS.
    #[arg(long, env = "HCS_ENABLE_CORS", default_value = "true")]
    pub enable_cors: bool,

    /// Allowed CORS origins, comma separated, or `*`.
    #[arg(long, env = "HCS_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,
}

fn parse_dialect(value: &str) -> Result<FhirDialect, String> {
    FhirDialect::parse(value.trim()).ok_or_else(|| format!("unsupported FHIR version: {value}"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = SearchLimits::default();
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            base_url: "http://localhost:8080".to_string(),
            database_url: None,
            request_timeout: Duration::from_secs(30),
            default_page_size: limits.default_page_size,
            max_page_size: limits.max_page_size,
            max_include_depth: limits.max_include_depth,
            max_included_resources: limits.max_included_resources,
            max_chain_depth: limits.max_chain_depth,
            storage_version: FhirDialect::R4,
            fhir_versions: FhirDialect::ALL.to_vec(),
            enable_cors: true,
            cors_origins: "*".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::try_parse_from(["hcs"]).unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns the store's search bounds.
    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            max_include_depth: self.max_include_depth,
            max_included_resources: self.max_included_resources,
            max_chain_depth: self.max_chain_depth,
            ..SearchLimits::default()
        }
    }

    /// Returns the SQLite backend configuration.
    pub fn backend_config(&self) -> SqliteBackendConfig {
        SqliteBackendConfig {
            storage_dialect: self.storage_version,
            search: self.search_limits(),
            ..SqliteBackendConfig::default()
        }
    }

    /// Validates the configuration and returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Port cannot be 0".to_string());
        }

        if self.request_timeout.is_zero() {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if self.max_chain_depth == 0 {
            errors.push("Max chain depth cannot be 0".to_string());
        }

        if self.fhir_versions.is_empty() {
            errors.push("At least one FHIR version must be served".to_string());
        }

        if !self.fhir_versions.contains(&self.storage_version) {
            errors.push(format!(
                "Storage version {} is not among the served versions",
                self.storage_version.version()
            ));
        }

        if url::Url::parse(&self.base_url).is_err() {
            errors.push(format!("Base URL is not a valid URL: {}", self.base_url));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for tests.
    pub fn for_testing() -> Self {
        Self {
            port: 0,
            log_level: "debug".to_string(),
            base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(5),
            default_page_size: 10,
            max_page_size: 100,
            enable_cors: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_version, FhirDialect::R4);
        assert_eq!(config.fhir_versions.len(), 3);
        assert_eq!(config.max_chain_depth, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            port: 3000,
            host: "0.0.0.0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_parse_from_args() {
        let config = ServerConfig::try_parse_from([
            "hcs",
            "--port",
            "9090",
            "--request-timeout",
            "2m",
            "--fhir-versions",
            "4.0,R5",
            "--storage-version",
            "5.0.0",
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.fhir_versions, vec![FhirDialect::R4, FhirDialect::R5]);
        assert_eq!(config.storage_version, FhirDialect::R5);
    }

    #[test]
    fn test_rejects_unknown_version() {
        assert!(ServerConfig::try_parse_from(["hcs", "--storage-version", "3.0"]).is_err());
    }

    #[test]
    fn test_validate_collects_errors() {
        let config = ServerConfig {
            port: 0,
            default_page_size: 100,
            max_page_size: 50,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("Port")));
    }

    #[test]
    fn test_storage_version_must_be_served() {
        let config = ServerConfig {
            storage_version: FhirDialect::R6,
            fhir_versions: vec![FhirDialect::R4],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_search_limits() {
        let config = ServerConfig {
            max_include_depth: 1,
            ..ServerConfig::for_testing()
        };
        let limits = config.search_limits();
        assert_eq!(limits.max_include_depth, 1);
        assert_eq!(limits.max_page_size, 100);
    }
}
