//! Search implementation for SQLite backend.
//!
//! Queries compile to a single statement over `resources r` with correlated
//! `EXISTS` subqueries against `search_index`. Paging is offset based; the
//! offset travels in an opaque cursor. Include expansion runs level by level
//! on the same connection after the page is fetched.

use std::collections::HashSet;

use async_trait::async_trait;
use rusqlite::{Connection, params, params_from_iter};

use crate::context::RequestContext;
use crate::core::{IncludeProvider, SearchProvider, SearchResult, SearchWarning, query_offset};
use crate::error::StorageResult;
use crate::types::{
    IncludeDirective, IncludeType, Page, PageCursor, PageInfo, SearchQuery, StoredResource,
    TotalMode,
};

use super::SqliteBackend;
use super::search::{CompiledQuery, QueryBuilder, SqlParam};
use super::storage::{RESOURCE_COLUMNS, RawResourceRow, load_current};

type ResourceKey = (String, String);

fn key(resource: &StoredResource) -> ResourceKey {
    (resource.resource_type().to_string(), resource.id().to_string())
}

impl SqliteBackend {
    pub(super) fn compile_query(&self, query: &SearchQuery) -> StorageResult<CompiledQuery> {
        let builder = QueryBuilder::new(self.search_registry(), self.search_limits().max_chain_depth);
        Ok(builder.compile(query)?)
    }

    /// Fetches one window of matches in sort order.
    pub(super) fn fetch_compiled(
        &self,
        conn: &Connection,
        resource_type: &str,
        compiled: &CompiledQuery,
        limit: u64,
        offset: u64,
    ) -> StorageResult<Vec<StoredResource>> {
        let mut sql = format!(
            "SELECT {}{} FROM resources r WHERE r.resource_type = ? AND r.is_deleted = 0",
            RESOURCE_COLUMNS, compiled.sort_columns.sql
        );
        let mut sql_params: Vec<SqlParam> = compiled.sort_columns.params.clone();
        sql_params.push(SqlParam::string(resource_type));

        if !compiled.filter.is_empty() {
            sql.push_str(&format!(" AND ({})", compiled.filter.sql));
            sql_params.extend(compiled.filter.params.iter().cloned());
        }

        sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", compiled.order_by));
        sql_params.push(SqlParam::integer(limit.min(i64::MAX as u64) as i64));
        sql_params.push(SqlParam::integer(offset.min(i64::MAX as u64) as i64));

        tracing::trace!(sql = %sql, params = sql_params.len(), "Executing search");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(sql_params.iter()), RawResourceRow::from_row)?;
        let resources = rows
            .map(|row| row?.into_stored(resource_type))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(resources)
    }

    /// Counts matches, stopping at `cap` when given.
    pub(super) fn count_compiled(
        &self,
        conn: &Connection,
        resource_type: &str,
        compiled: &CompiledQuery,
        cap: Option<u64>,
    ) -> StorageResult<u64> {
        let mut sql = String::from(
            "SELECT COUNT(*) FROM (SELECT 1 FROM resources r WHERE r.resource_type = ? AND r.is_deleted = 0",
        );
        let mut sql_params = vec![SqlParam::string(resource_type)];

        if !compiled.filter.is_empty() {
            sql.push_str(&format!(" AND ({})", compiled.filter.sql));
            sql_params.extend(compiled.filter.params.iter().cloned());
        }
        if let Some(cap) = cap {
            sql.push_str(" LIMIT ?");
            sql_params.push(SqlParam::integer(cap.min(i64::MAX as u64) as i64));
        }
        sql.push(')');

        let count: i64 =
            conn.query_row(&sql, params_from_iter(sql_params.iter()), |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Expands `_include` / `_revinclude` breadth first.
    ///
    /// Level 0 applies every directive to the matches; later levels apply
    /// only `:iterate` directives to what the previous level added.
    fn expand_includes(
        &self,
        ctx: &RequestContext,
        conn: &Connection,
        matches: &[StoredResource],
        includes: &[IncludeDirective],
    ) -> StorageResult<(Vec<StoredResource>, Vec<SearchWarning>)> {
        let limits = self.search_limits();
        let mut seen: HashSet<ResourceKey> = matches.iter().map(key).collect();
        let mut included: Vec<StoredResource> = Vec::new();
        let mut warnings = Vec::new();
        let mut frontier: Vec<StoredResource> = matches.to_vec();

        for level in 0..limits.max_include_depth {
            ctx.check_cancelled("include")?;

            let directives: Vec<&IncludeDirective> = includes
                .iter()
                .filter(|d| level == 0 || d.iterate)
                .collect();
            if directives.is_empty() || frontier.is_empty() {
                return Ok((included, warnings));
            }

            let mut next = Vec::new();
            for resource in &frontier {
                for directive in &directives {
                    for target in self.include_targets(conn, resource, directive)? {
                        if seen.contains(&key(&target)) {
                            continue;
                        }
                        if included.len() >= limits.max_included_resources {
                            tracing::warn!(
                                max_resources = limits.max_included_resources,
                                "Include expansion hit the resource limit"
                            );
                            warnings.push(SearchWarning::IncludeLimitReached {
                                max_resources: limits.max_included_resources,
                            });
                            return Ok((included, warnings));
                        }
                        seen.insert(key(&target));
                        included.push(target.clone());
                        next.push(target);
                    }
                }
            }
            frontier = next;
        }

        // One more level would have been applied if the bound allowed it.
        let iterating: Vec<&IncludeDirective> = includes.iter().filter(|d| d.iterate).collect();
        'probe: for resource in &frontier {
            for directive in &iterating {
                let targets = self.include_targets(conn, resource, directive)?;
                if targets.iter().any(|t| !seen.contains(&key(t))) {
                    tracing::warn!(
                        max_depth = limits.max_include_depth,
                        "Include iteration stopped at the depth limit"
                    );
                    warnings.push(SearchWarning::IncludeDepthExceeded {
                        max_depth: limits.max_include_depth,
                    });
                    break 'probe;
                }
            }
        }

        Ok((included, warnings))
    }

    /// Live resources one directive reaches from `resource`.
    fn include_targets(
        &self,
        conn: &Connection,
        resource: &StoredResource,
        directive: &IncludeDirective,
    ) -> StorageResult<Vec<StoredResource>> {
        match directive.include_type {
            IncludeType::Include => {
                if resource.resource_type() != directive.source_type {
                    return Ok(Vec::new());
                }

                let mut stmt = conn.prepare_cached(
                    "SELECT DISTINCT reference_type, reference_id FROM search_index
                     WHERE resource_type = ?1 AND resource_id = ?2 AND param_name = ?3
                       AND reference_type IS NOT NULL AND reference_id IS NOT NULL
                     ORDER BY reference_type, reference_id",
                )?;
                let rows = stmt.query_map(
                    params![resource.resource_type(), resource.id(), directive.search_param],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )?;
                let references = rows.collect::<Result<Vec<_>, _>>()?;

                let mut targets = Vec::new();
                for (target_type, target_id) in references {
                    if directive
                        .target_type
                        .as_deref()
                        .is_some_and(|wanted| wanted != target_type)
                    {
                        continue;
                    }
                    if let Some(target) = load_current(conn, &target_type, &target_id)? {
                        if !target.is_deleted() {
                            targets.push(target);
                        }
                    }
                }
                Ok(targets)
            }
            IncludeType::Revinclude => {
                if directive
                    .target_type
                    .as_deref()
                    .is_some_and(|wanted| wanted != resource.resource_type())
                {
                    return Ok(Vec::new());
                }

                let sql = format!(
                    "SELECT {} FROM resources r
                     WHERE r.resource_type = ?1 AND r.is_deleted = 0
                       AND EXISTS (SELECT 1 FROM search_index si
                                   WHERE si.resource_type = r.resource_type AND si.resource_id = r.id
                                     AND si.param_name = ?2 AND si.reference_type = ?3
                                     AND si.reference_id = ?4)
                     ORDER BY r.id",
                    RESOURCE_COLUMNS
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(
                    params![
                        directive.source_type,
                        directive.search_param,
                        resource.resource_type(),
                        resource.id()
                    ],
                    RawResourceRow::from_row,
                )?;
                let sources = rows
                    .map(|row| row?.into_stored(&directive.source_type))
                    .collect::<StorageResult<Vec<_>>>()?;
                Ok(sources)
            }
        }
    }
}

#[async_trait]
impl SearchProvider for SqliteBackend {
    async fn search(
        &self,
        ctx: &RequestContext,
        query: &SearchQuery,
    ) -> StorageResult<SearchResult> {
        let resource_type = query.resource_type.as_str();
        self.ensure_supported(resource_type)?;

        let limits = self.search_limits();
        let page_size = limits.page_size(query.count);
        let offset = query_offset(query)?;
        let compiled = self.compile_query(query)?;
        let conn = self.get_connection()?;

        let mut warnings: Vec<SearchWarning> = query
            .ignored_parameters
            .iter()
            .map(|name| SearchWarning::IgnoredParameter { name: name.clone() })
            .collect();
        warnings.extend(compiled.warnings.iter().cloned());

        let total = match query.total.unwrap_or(TotalMode::Accurate) {
            TotalMode::None => None,
            TotalMode::Estimate => {
                let cap = limits.total_estimate_cap;
                let counted =
                    self.count_compiled(&conn, resource_type, &compiled, Some(cap.saturating_add(1)))?;
                if counted > cap {
                    warnings.push(SearchWarning::TotalEstimated { cap });
                    Some(cap)
                } else {
                    Some(counted)
                }
            }
            TotalMode::Accurate => Some(self.count_compiled(&conn, resource_type, &compiled, None)?),
        };

        let mut items = if page_size == 0 {
            Vec::new()
        } else {
            self.fetch_compiled(&conn, resource_type, &compiled, u64::from(page_size) + 1, offset)?
        };
        let has_next = items.len() > page_size as usize;
        items.truncate(page_size as usize);

        let mut page_info = if has_next {
            PageInfo::with_next(PageCursor::offset(offset + u64::from(page_size)))
        } else {
            PageInfo::end()
        };
        if offset > 0 && page_size > 0 {
            page_info = page_info
                .with_previous(PageCursor::offset(offset.saturating_sub(u64::from(page_size))));
        }
        if let Some(total) = total {
            page_info = page_info.with_total(total);
        }

        let (included, include_warnings) = if query.includes.is_empty() || items.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            self.expand_includes(ctx, &conn, &items, &query.includes)?
        };

        tracing::debug!(
            request_id = ctx.request_id(),
            resource_type = resource_type,
            matches = items.len(),
            included = included.len(),
            total = ?total,
            "Search completed"
        );

        let mut result = SearchResult::new(Page::new(items, page_info)).with_included(included);
        if let Some(total) = total {
            result = result.with_total(total);
        }
        for warning in warnings.into_iter().chain(include_warnings) {
            result.push_warning(warning);
        }
        Ok(result)
    }

    async fn search_count(&self, _ctx: &RequestContext, query: &SearchQuery) -> StorageResult<u64> {
        self.ensure_supported(&query.resource_type)?;
        let compiled = self.compile_query(query)?;
        let conn = self.get_connection()?;
        self.count_compiled(&conn, &query.resource_type, &compiled, None)
    }
}

#[async_trait]
impl IncludeProvider for SqliteBackend {
    async fn resolve_includes(
        &self,
        ctx: &RequestContext,
        matches: &[StoredResource],
        includes: &[IncludeDirective],
    ) -> StorageResult<(Vec<StoredResource>, Vec<SearchWarning>)> {
        if matches.is_empty() || includes.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let conn = self.get_connection()?;
        self.expand_includes(ctx, &conn, matches, includes)
    }
}
