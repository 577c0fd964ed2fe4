//! SQLite schema definitions.
//!
//! Three tables make up the durable state:
//!
//! - `resources` holds the current version of every resource, including
//!   deletion markers.
//! - `resource_history` holds every version ever written.
//! - `search_index` holds the rows derived from each current version. It is
//!   disposable and can be rebuilt from `resources`.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

fn schema_error(what: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message: format!("Failed to {}: {}", what, e),
        source: None,
    })
}

/// Initialize the database schema. Safe to call repeatedly.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::info!(version = SCHEMA_VERSION, "Created SQLite schema");
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| schema_error("create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| schema_error("clear schema_version", e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| schema_error("set schema_version", e))?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resources (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            data BLOB NOT NULL,
            last_updated TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            fhir_version TEXT NOT NULL,
            PRIMARY KEY (resource_type, id)
        )",
        [],
    )
    .map_err(|e| schema_error("create resources table", e))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS resource_history (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            data BLOB NOT NULL,
            last_updated TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            fhir_version TEXT NOT NULL,
            method TEXT NOT NULL,
            PRIMARY KEY (resource_type, id, version_id)
        )",
        [],
    )
    .map_err(|e| schema_error("create resource_history table", e))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS search_index (
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            param_name TEXT NOT NULL,
            param_type TEXT NOT NULL,
            value_string TEXT,
            value_string_norm TEXT,
            token_system TEXT,
            token_code TEXT,
            token_display TEXT,
            value_date_start TEXT,
            value_date_end TEXT,
            number_value REAL,
            number_low REAL,
            number_high REAL,
            quantity_value REAL,
            quantity_low REAL,
            quantity_high REAL,
            quantity_unit TEXT,
            quantity_system TEXT,
            quantity_code TEXT,
            reference_type TEXT,
            reference_id TEXT,
            reference_raw TEXT,
            value_uri TEXT,
            composite_group INTEGER,
            component TEXT,
            FOREIGN KEY (resource_type, resource_id)
                REFERENCES resources(resource_type, id) ON DELETE CASCADE
        )",
        [],
    )
    .map_err(|e| schema_error("create search_index table", e))?;

    create_indexes(conn)
}

/// Create indexes for efficient queries.
fn create_indexes(conn: &Connection) -> StorageResult<()> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_resources_type ON resources(resource_type, is_deleted)",
        "CREATE INDEX IF NOT EXISTS idx_resources_updated ON resources(resource_type, last_updated)",
        "CREATE INDEX IF NOT EXISTS idx_history_updated ON resource_history(resource_type, id, last_updated)",
        "CREATE INDEX IF NOT EXISTS idx_search_resource ON search_index(resource_type, resource_id)",
        "CREATE INDEX IF NOT EXISTS idx_search_string ON search_index(resource_type, param_name, value_string_norm)",
        "CREATE INDEX IF NOT EXISTS idx_search_token ON search_index(resource_type, param_name, token_code, token_system)",
        "CREATE INDEX IF NOT EXISTS idx_search_date ON search_index(resource_type, param_name, value_date_start, value_date_end)",
        "CREATE INDEX IF NOT EXISTS idx_search_number ON search_index(resource_type, param_name, number_value)",
        "CREATE INDEX IF NOT EXISTS idx_search_quantity ON search_index(resource_type, param_name, quantity_value, quantity_code)",
        "CREATE INDEX IF NOT EXISTS idx_search_reference ON search_index(resource_type, param_name, reference_id, reference_type)",
        "CREATE INDEX IF NOT EXISTS idx_search_reverse ON search_index(param_name, reference_type, reference_id)",
        "CREATE INDEX IF NOT EXISTS idx_search_uri ON search_index(resource_type, param_name, value_uri)",
        "CREATE INDEX IF NOT EXISTS idx_search_composite ON search_index(resource_type, resource_id, param_name, composite_group)",
    ];

    for index_sql in &indexes {
        conn.execute(index_sql, [])
            .map_err(|e| schema_error("create index", e))?;
    }

    Ok(())
}
