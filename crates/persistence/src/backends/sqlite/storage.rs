//! ResourceStorage, VersionedStorage, ConditionalStorage and instance
//! history for SQLite.
//!
//! Every write runs in a single `IMMEDIATE` transaction that updates the
//! current row, appends the history row and replaces the search index rows.
//! The request's cancellation token is checked just before commit.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::core::{
    ConditionalCreateResult, ConditionalDeleteResult, ConditionalStorage,
    ConditionalUpdateResult, HistoryEntry, HistoryPage, HistoryParams, InstanceHistoryProvider,
    ResourceStorage, VersionedStorage, check_version_match,
};
use crate::error::{
    BackendError, ResourceError, SearchError, StorageError, StorageResult, TransactionError,
    ValidationError,
};
use crate::search::parse_search_query;
use crate::types::{Page, PageCursor, PageInfo, ResourceKind, ResourceMethod, StoredResource};
use crate::versioning::FhirDialect;

use super::SqliteBackend;
use super::search::{SqlParam, SqliteSearchIndexWriter};

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

/// Formats a timestamp the way it is stored: RFC 3339, millisecond
/// precision, `Z` suffix. Stored values compare correctly as text.
pub(crate) fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| serialization_error(format!("Invalid stored timestamp '{}': {}", value, e)))
}

/// Columns selected from `resources` for [`RawResourceRow::from_row`].
pub(crate) const RESOURCE_COLUMNS: &str =
    "r.id, r.version_id, r.data, r.last_updated, r.deleted_at, r.fhir_version";

/// Columns selected from `resource_history`, including the method.
const HISTORY_COLUMNS: &str = "id, version_id, data, last_updated, \
     CASE WHEN is_deleted = 1 THEN last_updated END, fhir_version, method";

/// A resource row as read from SQLite, before decoding.
pub(crate) struct RawResourceRow {
    id: String,
    version_id: i64,
    data: Vec<u8>,
    last_updated: String,
    deleted_at: Option<String>,
    fhir_version: String,
    method: Option<String>,
}

impl RawResourceRow {
    /// Reads the columns of [`RESOURCE_COLUMNS`].
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version_id: row.get(1)?,
            data: row.get(2)?,
            last_updated: row.get(3)?,
            deleted_at: row.get(4)?,
            fhir_version: row.get(5)?,
            method: None,
        })
    }

    /// Reads the columns of [`HISTORY_COLUMNS`].
    fn from_history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut raw = Self::from_row(row)?;
        raw.method = row.get(6)?;
        Ok(raw)
    }

    pub(crate) fn into_stored(self, resource_type: &str) -> StorageResult<StoredResource> {
        let content: Value = serde_json::from_slice(&self.data).map_err(|e| {
            serialization_error(format!(
                "Failed to deserialize {}/{}: {}",
                resource_type, self.id, e
            ))
        })?;
        let fhir_version = FhirDialect::parse(&self.fhir_version).ok_or_else(|| {
            serialization_error(format!("Unknown stored dialect '{}'", self.fhir_version))
        })?;
        let deleted_at = self.deleted_at.as_deref().map(parse_timestamp).transpose()?;

        Ok(StoredResource::from_storage(
            resource_type,
            self.id,
            self.version_id.max(0) as u64,
            content,
            fhir_version,
            parse_timestamp(&self.last_updated)?,
            deleted_at,
            self.method.as_deref().and_then(ResourceMethod::parse),
        ))
    }
}

/// Version bookkeeping of an existing resource.
struct CurrentRow {
    version_id: u64,
    is_deleted: bool,
}

fn current_row(
    conn: &Connection,
    resource_type: &str,
    id: &str,
) -> StorageResult<Option<CurrentRow>> {
    let row = conn
        .query_row(
            "SELECT version_id, is_deleted FROM resources WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, id],
            |row| {
                Ok(CurrentRow {
                    version_id: row.get::<_, i64>(0)?.max(0) as u64,
                    is_deleted: row.get::<_, i64>(1)? != 0,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Loads the current row of a resource, deletion markers included.
pub(crate) fn load_current(
    conn: &Connection,
    resource_type: &str,
    id: &str,
) -> StorageResult<Option<StoredResource>> {
    let sql = format!(
        "SELECT {} FROM resources r WHERE r.resource_type = ?1 AND r.id = ?2",
        RESOURCE_COLUMNS
    );
    let raw = conn
        .query_row(&sql, params![resource_type, id], RawResourceRow::from_row)
        .optional()?;
    raw.map(|raw| raw.into_stored(resource_type)).transpose()
}

/// Logical ids: 1-64 characters from `[A-Za-z0-9.-]`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

impl SqliteBackend {
    /// Fails unless `resource_type` is a kind stored in this backend's dialect.
    pub(crate) fn ensure_supported(&self, resource_type: &str) -> StorageResult<()> {
        let kind = ResourceKind::parse(resource_type);
        if kind.is_supported() && kind.is_available_in(self.config().storage_dialect) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedResourceType {
                resource_type: resource_type.to_string(),
            }
            .into())
        }
    }

    /// Checks that a body is an object of the expected type, with an id
    /// matching `path_id` when both are present.
    fn validate_body(
        &self,
        resource_type: &str,
        body: &Value,
        path_id: Option<&str>,
    ) -> StorageResult<()> {
        self.ensure_supported(resource_type)?;

        let obj = body.as_object().ok_or_else(|| {
            ValidationError::invalid_at(resource_type, "resource body must be a JSON object")
        })?;

        match obj.get("resourceType") {
            None => {}
            Some(Value::String(rt)) if rt == resource_type => {}
            Some(other) => {
                return Err(ValidationError::invalid_at(
                    format!("{}.resourceType", resource_type),
                    format!("expected '{}', found {}", resource_type, other),
                )
                .into());
            }
        }

        match (obj.get("id"), path_id) {
            (None, _) => {}
            (Some(Value::String(body_id)), Some(path_id)) if body_id != path_id => {
                return Err(ValidationError::invalid_at(
                    format!("{}.id", resource_type),
                    format!("body id '{}' does not match '{}'", body_id, path_id),
                )
                .into());
            }
            (Some(Value::String(body_id)), _) if !is_valid_id(body_id) => {
                return Err(ValidationError::invalid_at(
                    format!("{}.id", resource_type),
                    format!("'{}' is not a valid id", body_id),
                )
                .into());
            }
            (Some(Value::String(_)), _) => {}
            (Some(_), _) => {
                return Err(ValidationError::invalid_at(
                    format!("{}.id", resource_type),
                    "id must be a string",
                )
                .into());
            }
        }

        if let Some(id) = path_id {
            if !is_valid_id(id) {
                return Err(ValidationError::invalid_at(
                    format!("{}.id", resource_type),
                    format!("'{}' is not a valid id", id),
                )
                .into());
            }
        }

        Ok(())
    }

    /// Stamps type, id and `meta.versionId` / `meta.lastUpdated` into a body.
    fn stamp_body(
        resource_type: &str,
        id: &str,
        version_id: u64,
        now: DateTime<Utc>,
        body: Value,
    ) -> Value {
        let mut obj = match body {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        obj.insert(
            "resourceType".to_string(),
            Value::String(resource_type.to_string()),
        );
        obj.insert("id".to_string(), Value::String(id.to_string()));

        let meta = obj
            .entry("meta")
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert(
                "versionId".to_string(),
                Value::String(version_id.to_string()),
            );
            meta.insert(
                "lastUpdated".to_string(),
                Value::String(format_timestamp(now)),
            );
        }

        Value::Object(obj)
    }

    /// Writes the next version of a resource and its index rows.
    fn write_version(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        body: Value,
        previous: Option<&CurrentRow>,
        method: ResourceMethod,
    ) -> StorageResult<StoredResource> {
        let version_id = previous.map_or(1, |p| p.version_id + 1);
        let now = Utc::now().trunc_subsecs(3);
        let body = Self::stamp_body(resource_type, id, version_id, now, body);

        // Extraction failures abort the write before anything is stored.
        let extracted = self.search_extractor().extract(&body, resource_type)?;

        let data = serde_json::to_vec(&body)
            .map_err(|e| serialization_error(format!("Failed to serialize resource: {}", e)))?;
        let last_updated = format_timestamp(now);
        let dialect = self.config().storage_dialect;
        let version = version_id as i64;

        if previous.is_some() {
            conn.execute(
                "UPDATE resources SET version_id = ?3, data = ?4, last_updated = ?5,
                 is_deleted = 0, deleted_at = NULL, fhir_version = ?6
                 WHERE resource_type = ?1 AND id = ?2",
                params![resource_type, id, version, data, last_updated, dialect.as_str()],
            )
            .map_err(|e| internal_error(format!("Failed to update resource: {}", e)))?;
        } else {
            conn.execute(
                "INSERT INTO resources (resource_type, id, version_id, data, last_updated, is_deleted, fhir_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![resource_type, id, version, data, last_updated, dialect.as_str()],
            )
            .map_err(|e| internal_error(format!("Failed to insert resource: {}", e)))?;
        }

        conn.execute(
            "INSERT INTO resource_history (resource_type, id, version_id, data, last_updated, is_deleted, fhir_version, method)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                resource_type,
                id,
                version,
                data,
                last_updated,
                dialect.as_str(),
                method.as_str()
            ],
        )
        .map_err(|e| internal_error(format!("Failed to insert history: {}", e)))?;

        SqliteSearchIndexWriter::clear(conn, resource_type, id)?;
        let rows = SqliteSearchIndexWriter::write(conn, resource_type, id, &extracted)?;

        tracing::debug!(
            resource_type = resource_type,
            id = id,
            version = version_id,
            index_rows = rows,
            "Wrote resource version"
        );

        Ok(StoredResource::from_storage(
            resource_type,
            id,
            version_id,
            body,
            dialect,
            now,
            None,
            Some(method),
        ))
    }

    /// Writes a deletion marker version. The last body is kept for audit.
    fn write_deletion(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        previous: &CurrentRow,
    ) -> StorageResult<u64> {
        let version_id = previous.version_id + 1;
        let now = format_timestamp(Utc::now().trunc_subsecs(3));
        let version = version_id as i64;

        let (data, fhir_version): (Vec<u8>, String) = conn.query_row(
            "SELECT data, fhir_version FROM resources WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        conn.execute(
            "UPDATE resources SET version_id = ?3, last_updated = ?4, is_deleted = 1, deleted_at = ?4
             WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, id, version, now],
        )
        .map_err(|e| internal_error(format!("Failed to delete resource: {}", e)))?;

        conn.execute(
            "INSERT INTO resource_history (resource_type, id, version_id, data, last_updated, is_deleted, fhir_version, method)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                resource_type,
                id,
                version,
                data,
                now,
                fhir_version,
                ResourceMethod::Delete.as_str()
            ],
        )
        .map_err(|e| internal_error(format!("Failed to insert history: {}", e)))?;

        SqliteSearchIndexWriter::clear(conn, resource_type, id)?;

        Ok(version_id)
    }

    /// Creates a resource using the body id or a generated one.
    fn insert_new(
        &self,
        conn: &Connection,
        resource_type: &str,
        resource: Value,
        method: ResourceMethod,
    ) -> StorageResult<StoredResource> {
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let previous = current_row(conn, resource_type, &id)?;
        if previous.as_ref().is_some_and(|p| !p.is_deleted) {
            return Err(ResourceError::AlreadyExists {
                resource_type: resource_type.to_string(),
                id,
            }
            .into());
        }

        self.write_version(conn, resource_type, &id, resource, previous.as_ref(), method)
    }

    /// Writes `resource` over the single resource matching `criteria`, or
    /// inserts it with `create_method` when nothing matches. Returns the
    /// stored version and whether it was newly created.
    fn write_by_criteria(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
        criteria: &str,
        operation: &str,
        create_method: ResourceMethod,
    ) -> StorageResult<(StoredResource, bool)> {
        self.validate_body(resource_type, &resource, None)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = match self.conditional_matches(&tx, resource_type, criteria, operation)? {
            Some(existing) => {
                self.validate_body(resource_type, &resource, Some(existing.id()))?;
                let previous = current_row(&tx, resource_type, existing.id())?.ok_or_else(|| {
                    internal_error(format!(
                        "Matched resource {} has no current row",
                        existing.url()
                    ))
                })?;
                let stored = self.write_version(
                    &tx,
                    resource_type,
                    existing.id(),
                    resource,
                    Some(&previous),
                    ResourceMethod::Put,
                )?;
                (stored, false)
            }
            None => (
                self.insert_new(&tx, resource_type, resource, create_method)?,
                true,
            ),
        };

        ctx.check_cancelled(operation)?;
        tx.commit()?;

        Ok(result)
    }

    /// Resolves conditional criteria to at most one live resource.
    fn conditional_matches(
        &self,
        conn: &Connection,
        resource_type: &str,
        criteria: &str,
        operation: &str,
    ) -> StorageResult<Option<StoredResource>> {
        let query = parse_search_query(resource_type, criteria, self.search_registry())?;

        if let Some(name) = query.ignored_parameters.first() {
            return Err(ValidationError::InvalidSearchParameter {
                parameter: name.clone(),
                message: "unknown parameter in conditional criteria".to_string(),
            }
            .into());
        }
        if query.parameters.is_empty() && query.reverse_chains.is_empty() {
            return Err(ValidationError::InvalidSearchParameter {
                parameter: criteria.to_string(),
                message: format!("conditional {} requires search criteria", operation),
            }
            .into());
        }

        let compiled = self.compile_query(&query)?;
        let count = self.count_compiled(conn, resource_type, &compiled, Some(2))?;
        if count > 1 {
            let count = self.count_compiled(conn, resource_type, &compiled, None)?;
            return Err(TransactionError::MultipleMatches {
                operation: operation.to_string(),
                count: count as usize,
            }
            .into());
        }

        Ok(self
            .fetch_compiled(conn, resource_type, &compiled, 1, 0)?
            .into_iter()
            .next())
    }
}

#[async_trait]
impl ResourceStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn storage_dialect(&self) -> FhirDialect {
        self.config().storage_dialect
    }

    async fn create(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
    ) -> StorageResult<StoredResource> {
        self.validate_body(resource_type, &resource, None)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = self.insert_new(&tx, resource_type, resource, ResourceMethod::Post)?;

        ctx.check_cancelled("create")?;
        tx.commit()?;

        tracing::info!(
            request_id = ctx.request_id(),
            resource_type = resource_type,
            id = stored.id(),
            "Created resource"
        );
        Ok(stored)
    }

    async fn create_or_update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        resource: Value,
    ) -> StorageResult<(StoredResource, bool)> {
        self.validate_body(resource_type, &resource, Some(id))?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous = current_row(&tx, resource_type, id)?;
        let created = previous.as_ref().is_none_or(|p| p.is_deleted);
        let stored = self.write_version(
            &tx,
            resource_type,
            id,
            resource,
            previous.as_ref(),
            ResourceMethod::Put,
        )?;

        ctx.check_cancelled("update")?;
        tx.commit()?;

        Ok((stored, created))
    }

    async fn read(
        &self,
        _ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<StoredResource>> {
        self.ensure_supported(resource_type)?;
        let conn = self.get_connection()?;
        Ok(load_current(&conn, resource_type, id)?.filter(|r| !r.is_deleted()))
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        resource: Value,
        expected_version: Option<u64>,
    ) -> StorageResult<StoredResource> {
        self.validate_body(resource_type, &resource, Some(id))?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = current_row(&tx, resource_type, id)?
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| ResourceError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;
        if let Some(expected) = expected_version {
            check_version_match(resource_type, id, expected, previous.version_id)?;
        }

        let stored = self.write_version(
            &tx,
            resource_type,
            id,
            resource,
            Some(&previous),
            ResourceMethod::Put,
        )?;

        ctx.check_cancelled("update")?;
        tx.commit()?;

        Ok(stored)
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<u64> {
        self.ensure_supported(resource_type)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous =
            current_row(&tx, resource_type, id)?.ok_or_else(|| ResourceError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;
        let version = self.write_deletion(&tx, resource_type, id, &previous)?;

        ctx.check_cancelled("delete")?;
        tx.commit()?;

        tracing::info!(
            request_id = ctx.request_id(),
            resource_type = resource_type,
            id = id,
            version = version,
            "Deleted resource"
        );
        Ok(version)
    }

    async fn count(
        &self,
        _ctx: &RequestContext,
        resource_type: Option<&str>,
    ) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let count: i64 = match resource_type {
            Some(rt) => conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE resource_type = ?1 AND is_deleted = 0",
                [rt],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE is_deleted = 0",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl VersionedStorage for SqliteBackend {
    async fn vread(
        &self,
        _ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<StoredResource> {
        self.ensure_supported(resource_type)?;
        let conn = self.get_connection()?;

        let sql = format!(
            "SELECT {} FROM resource_history WHERE resource_type = ?1 AND id = ?2 AND version_id = ?3",
            HISTORY_COLUMNS
        );
        let raw = conn
            .query_row(
                &sql,
                params![resource_type, id, version_id as i64],
                RawResourceRow::from_history_row,
            )
            .optional()?;

        match raw {
            Some(raw) => raw.into_stored(resource_type),
            None if current_row(&conn, resource_type, id)?.is_none() => {
                Err(ResourceError::NotFound {
                    resource_type: resource_type.to_string(),
                    id: id.to_string(),
                }
                .into())
            }
            None => Err(ResourceError::VersionNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                version_id,
            }
            .into()),
        }
    }
}

#[async_trait]
impl InstanceHistoryProvider for SqliteBackend {
    async fn history_instance(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        id: &str,
        params: &HistoryParams,
    ) -> StorageResult<HistoryPage> {
        self.ensure_supported(resource_type)?;
        ctx.check_cancelled("history")?;
        let conn = self.get_connection()?;

        if current_row(&conn, resource_type, id)?.is_none() {
            return Err(ResourceError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }
            .into());
        }

        let before = match &params.cursor {
            Some(cursor) => Some(
                PageCursor::decode(cursor)?
                    .before_version_value()
                    .ok_or_else(|| SearchError::InvalidCursor {
                        cursor: cursor.clone(),
                    })?,
            ),
            None => None,
        };

        let mut filter = String::from("resource_type = ? AND id = ?");
        let mut filter_params = vec![SqlParam::string(resource_type), SqlParam::string(id)];
        if let Some(since) = params.since {
            filter.push_str(" AND last_updated >= ?");
            filter_params.push(SqlParam::string(format_timestamp(since)));
        }

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM resource_history WHERE {}", filter),
            params_from_iter(filter_params.iter()),
            |row| row.get(0),
        )?;

        let page_size = self.search_limits().page_size(params.count);
        if page_size == 0 {
            return Ok(Page::new(
                Vec::new(),
                PageInfo::end().with_total(total.max(0) as u64),
            ));
        }

        let mut page_filter = filter;
        let mut page_params = filter_params;
        if let Some(before) = before {
            page_filter.push_str(" AND version_id < ?");
            page_params.push(SqlParam::integer(before as i64));
        }
        page_params.push(SqlParam::integer(i64::from(page_size) + 1));

        let sql = format!(
            "SELECT {} FROM resource_history WHERE {} ORDER BY version_id DESC LIMIT ?",
            HISTORY_COLUMNS, page_filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(page_params.iter()),
            RawResourceRow::from_history_row,
        )?;
        let mut versions = rows
            .map(|row| row?.into_stored(resource_type))
            .collect::<StorageResult<Vec<_>>>()?;

        let has_next = versions.len() > page_size as usize;
        versions.truncate(page_size as usize);

        let info = match versions.last() {
            Some(last) if has_next => {
                PageInfo::with_next(PageCursor::before_version(last.version_id()))
            }
            _ => PageInfo::end(),
        }
        .with_total(total.max(0) as u64);

        let entries = versions.into_iter().map(HistoryEntry::from_version).collect();
        Ok(Page::new(entries, info))
    }

    async fn history_instance_count(
        &self,
        _ctx: &RequestContext,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<u64> {
        self.ensure_supported(resource_type)?;
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM resource_history WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl ConditionalStorage for SqliteBackend {
    async fn conditional_create(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalCreateResult> {
        let (stored, created) = self.write_by_criteria(
            ctx,
            resource_type,
            resource,
            search_params,
            "create",
            ResourceMethod::Post,
        )?;
        Ok(if created {
            ConditionalCreateResult::Created(stored)
        } else {
            ConditionalCreateResult::Updated(stored)
        })
    }

    async fn conditional_update(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalUpdateResult> {
        let (stored, created) = self.write_by_criteria(
            ctx,
            resource_type,
            resource,
            search_params,
            "update",
            ResourceMethod::Put,
        )?;
        Ok(if created {
            ConditionalUpdateResult::Created(stored)
        } else {
            ConditionalUpdateResult::Updated(stored)
        })
    }

    async fn conditional_delete(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        search_params: &str,
    ) -> StorageResult<ConditionalDeleteResult> {
        self.ensure_supported(resource_type)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(existing) =
            self.conditional_matches(&tx, resource_type, search_params, "delete")?
        else {
            return Ok(ConditionalDeleteResult::NoMatch);
        };

        let previous = CurrentRow {
            version_id: existing.version_id(),
            is_deleted: false,
        };
        let version = self.write_deletion(&tx, resource_type, existing.id(), &previous)?;

        ctx.check_cancelled("delete")?;
        tx.commit()?;

        Ok(ConditionalDeleteResult::Deleted(version))
    }
}
