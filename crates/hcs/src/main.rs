//! Helios Clinical Server (HCS).
//!
//! Serves FHIR R4, R5 and R6 clients from one SQLite store.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hcs_persistence::backends::sqlite::SqliteBackend;
use hcs_rest::{AppState, ServerConfig, init_logging, serve};
use tracing::info;

/// Opens the SQLite store named by the configuration and creates its schema.
fn create_sqlite_backend(config: &ServerConfig) -> anyhow::Result<SqliteBackend> {
    let db_path = config.database_url.as_deref().unwrap_or(":memory:");
    info!(database = %db_path, "Initializing SQLite backend");

    let backend = SqliteBackend::with_config(db_path, config.backend_config())
        .with_context(|| format!("failed to open database {}", db_path))?;
    backend
        .init_schema()
        .context("failed to initialize database schema")?;

    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        anyhow::bail!("invalid configuration ({} errors)", errors.len());
    }

    info!(
        port = config.port,
        host = %config.host,
        storage_version = %config.storage_version,
        fhir_versions = ?config.fhir_versions,
        "Starting Helios Clinical Server"
    );

    let backend = create_sqlite_backend(&config)?;
    serve(AppState::new(Arc::new(backend), config)).await
}
