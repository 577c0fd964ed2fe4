//! SQL Query Builder for search.
//!
//! Translates a parsed [`SearchQuery`] into a filter over the `resources`
//! table. Every parameter becomes a correlated `EXISTS` over
//! `search_index`; values of one parameter are ORed inside it and distinct
//! parameters are ANDed. Placeholders are anonymous (`?`), so fragments bind
//! in the order their SQL text is concatenated.

use rusqlite::ToSql;
use rusqlite::types::{Null, ToSqlOutput};

use crate::core::SearchWarning;
use crate::error::SearchError;
use crate::types::{
    ResourceKind, SearchModifier, SearchParamType, SearchParameter, SearchQuery, SortDirection,
    SortDirective,
};

use super::parameter_handlers::{
    CompositeHandler, DateHandler, NumberHandler, QuantityHandler, ReferenceHandler, StringHandler,
    TokenHandler, UriHandler,
};
use crate::search::SearchParameterRegistry;

/// Alias of the outer `resources` row in generated queries.
pub const RESOURCE_ALIAS: &str = "r";

/// A predicate that matches nothing.
pub(crate) const UNSATISFIABLE: &str = "0 = 1";

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values, in placeholder order.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }

    /// Creates a float parameter.
    pub fn float(f: f64) -> Self {
        SqlParam::Float(f)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::from(s.as_str()),
            SqlParam::Integer(i) => ToSqlOutput::from(*i),
            SqlParam::Float(f) => ToSqlOutput::from(*f),
            SqlParam::Null => ToSqlOutput::from(Null),
        })
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Combines with another fragment using AND.
    pub fn and(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) AND ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Combines with another fragment using OR.
    pub fn or(mut self, other: SqlFragment) -> Self {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql = format!("({}) OR ({})", self.sql, other.sql);
        } else if !other.sql.is_empty() {
            self.sql = other.sql;
        }
        self.params.extend(other.params);
        self
    }

    /// Wraps the fragment in `NOT (...)`.
    pub fn negate(self) -> Self {
        if self.sql.is_empty() {
            return self;
        }
        Self {
            sql: format!("NOT ({})", self.sql),
            params: self.params,
        }
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Escapes `LIKE` wildcards so user input matches literally under
/// `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A search compiled to SQL pieces over the `r` alias.
#[derive(Debug, Clone, Default)]
pub struct CompiledQuery {
    /// Conditions on the resource row; empty when unconstrained.
    pub filter: SqlFragment,
    /// Extra select columns (each starting with `, `) used for sorting.
    pub sort_columns: SqlFragment,
    /// The ORDER BY clause body.
    pub order_by: String,
    /// Warnings raised while compiling (chain depth overflow).
    pub warnings: Vec<SearchWarning>,
}

/// Builds SQL from parsed search parameters.
pub struct QueryBuilder<'a> {
    pub(super) registry: &'a SearchParameterRegistry,
    pub(super) max_chain_depth: usize,
    pub(super) warnings: Vec<SearchWarning>,
    alias_seq: usize,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a new query builder.
    pub fn new(registry: &'a SearchParameterRegistry, max_chain_depth: usize) -> Self {
        Self {
            registry,
            max_chain_depth,
            warnings: Vec::new(),
            alias_seq: 0,
        }
    }

    /// Compiles the filter and ordering of a query.
    pub fn compile(mut self, query: &SearchQuery) -> Result<CompiledQuery, SearchError> {
        let kind = ResourceKind::parse(&query.resource_type);
        let kinds = [kind.clone()];

        let mut filter = SqlFragment::default();
        for param in &query.parameters {
            let condition = self.parameter_condition(RESOURCE_ALIAS, &kinds, param, 0)?;
            filter = filter.and(condition);
        }
        for reverse in &query.reverse_chains {
            let condition = self.reverse_chain_condition(RESOURCE_ALIAS, reverse)?;
            filter = filter.and(condition);
        }

        let (sort_columns, order_by) = self.sort_clause(&kind, &query.sort);

        Ok(CompiledQuery {
            filter,
            sort_columns,
            order_by,
            warnings: self.warnings,
        })
    }

    /// Returns a fresh table alias.
    pub(super) fn next_alias(&mut self, prefix: &str) -> String {
        self.alias_seq += 1;
        format!("{}{}", prefix, self.alias_seq)
    }

    /// Condition for a (possibly chained) parameter on the row `alias`,
    /// whose type is one of `kinds`. `depth` counts reference hops already
    /// taken by an enclosing `_has`.
    pub(super) fn parameter_condition(
        &mut self,
        alias: &str,
        kinds: &[ResourceKind],
        param: &SearchParameter,
        depth: usize,
    ) -> Result<SqlFragment, SearchError> {
        if param.chain.is_empty() {
            self.terminal_condition(alias, kinds, param)
        } else {
            self.chain_condition(alias, kinds, param, depth)
        }
    }

    /// Condition for an unchained parameter.
    pub(super) fn terminal_condition(
        &mut self,
        alias: &str,
        kinds: &[ResourceKind],
        param: &SearchParameter,
    ) -> Result<SqlFragment, SearchError> {
        match param.name.as_str() {
            "_id" => return Ok(Self::id_condition(alias, param)),
            "_lastUpdated" => return Self::last_updated_condition(alias, param),
            _ => {}
        }

        if let Some(missing) = param.missing_value() {
            let exists = self.index_exists(alias, &param.name, SqlFragment::default());
            return Ok(if missing { exists.negate() } else { exists });
        }
        if param.values.is_empty() {
            return Ok(SqlFragment::default());
        }

        let definition = kinds
            .iter()
            .find_map(|k| self.registry.get_param(k, &param.name));

        if param.param_type == SearchParamType::Composite {
            let def = definition.ok_or_else(|| SearchError::InvalidComposite {
                parameter: param.name.clone(),
                message: "no composite definition for this resource type".to_string(),
            })?;
            let mut fragment = SqlFragment::default();
            for value in &param.values {
                let prefix = self.next_alias("cp");
                fragment = fragment.or(CompositeHandler::build_sql(
                    &param.name,
                    &def.components,
                    &value.value,
                    alias,
                    &prefix,
                )?);
            }
            return Ok(fragment);
        }

        let modifier = param.modifier.as_ref();
        let default_type = definition
            .as_deref()
            .and_then(|d| d.single_target())
            .map(|k| k.as_str().to_string());

        let mut values = SqlFragment::default();
        for value in &param.values {
            let condition = match param.param_type {
                SearchParamType::String => StringHandler::build_sql(value, modifier),
                SearchParamType::Token => TokenHandler::build_sql(value, modifier),
                SearchParamType::Uri => UriHandler::build_sql(value, modifier),
                SearchParamType::Reference => {
                    ReferenceHandler::build_sql(value, modifier, default_type.as_deref())
                }
                SearchParamType::Date => {
                    DateHandler::build_sql(value, "value_date_start", "value_date_end")?
                }
                SearchParamType::Number => {
                    NumberHandler::build_sql(value, "number_low", "number_high")?
                }
                SearchParamType::Quantity => QuantityHandler::build_sql(value)?,
                SearchParamType::Composite => composite_value_error(&param.name)?,
            };
            values = values.or(condition);
        }

        let exists = self.index_exists(alias, &param.name, values);
        Ok(if matches!(modifier, Some(SearchModifier::Not)) {
            exists.negate()
        } else {
            exists
        })
    }

    /// `EXISTS` over the index rows of `param_name` belonging to `alias`.
    pub(super) fn index_exists(
        &mut self,
        alias: &str,
        param_name: &str,
        condition: SqlFragment,
    ) -> SqlFragment {
        let si = self.next_alias("si");
        let mut sql = format!(
            "EXISTS (SELECT 1 FROM search_index {si} WHERE {si}.resource_type = {alias}.resource_type \
             AND {si}.resource_id = {alias}.id AND {si}.param_name = ?"
        );
        let mut params = vec![SqlParam::string(param_name)];
        if !condition.is_empty() {
            sql.push_str(&format!(" AND ({})", condition.sql));
            params.extend(condition.params);
        }
        sql.push(')');
        SqlFragment::with_params(sql, params)
    }

    fn id_condition(alias: &str, param: &SearchParameter) -> SqlFragment {
        if let Some(missing) = param.missing_value() {
            return SqlFragment::new(if missing { UNSATISFIABLE } else { "1 = 1" });
        }
        if param.values.is_empty() {
            return SqlFragment::default();
        }
        let placeholders = vec!["?"; param.values.len()].join(", ");
        let params = param
            .values
            .iter()
            .map(|v| SqlParam::string(&v.value))
            .collect();
        let op = if matches!(param.modifier, Some(SearchModifier::Not)) {
            "NOT IN"
        } else {
            "IN"
        };
        SqlFragment::with_params(format!("{}.id {} ({})", alias, op, placeholders), params)
    }

    fn last_updated_condition(
        alias: &str,
        param: &SearchParameter,
    ) -> Result<SqlFragment, SearchError> {
        if let Some(missing) = param.missing_value() {
            return Ok(SqlFragment::new(if missing { UNSATISFIABLE } else { "1 = 1" }));
        }
        let instant = format!("strftime('%Y-%m-%dT%H:%M:%f', {}.last_updated)", alias);
        let mut fragment = SqlFragment::default();
        for value in &param.values {
            fragment = fragment.or(DateHandler::build_sql(value, &instant, &instant)?);
        }
        Ok(fragment)
    }

    /// Builds the sort columns and ORDER BY. Missing values sort last in
    /// either direction; ties fall back to the id.
    fn sort_clause(&mut self, kind: &ResourceKind, sort: &[SortDirective]) -> (SqlFragment, String) {
        if sort.is_empty() {
            return (
                SqlFragment::default(),
                format!("{a}.last_updated DESC, {a}.id ASC", a = RESOURCE_ALIAS),
            );
        }

        let mut columns = SqlFragment::default();
        let mut order = Vec::new();
        let mut sorted_by_id = false;

        for (i, directive) in sort.iter().enumerate() {
            let (dir, aggregate) = match directive.direction {
                SortDirection::Ascending => ("ASC", "MIN"),
                SortDirection::Descending => ("DESC", "MAX"),
            };
            match directive.parameter.as_str() {
                "_id" => {
                    sorted_by_id = true;
                    order.push(format!("{}.id {}", RESOURCE_ALIAS, dir));
                }
                "_lastUpdated" => order.push(format!("{}.last_updated {}", RESOURCE_ALIAS, dir)),
                code => {
                    let Some(column) = self
                        .registry
                        .param_type(kind, code)
                        .and_then(sort_column)
                    else {
                        continue;
                    };
                    let key = format!("sort_{}", i);
                    columns.sql.push_str(&format!(
                        ", (SELECT {agg}(srt.{col}) FROM search_index srt \
                         WHERE srt.resource_type = {a}.resource_type AND srt.resource_id = {a}.id \
                         AND srt.param_name = ? AND srt.composite_group IS NULL) AS {key}",
                        agg = aggregate,
                        col = column,
                        a = RESOURCE_ALIAS,
                    ));
                    columns.params.push(SqlParam::string(code));
                    order.push(format!("{key} IS NULL, {key} {dir}"));
                }
            }
        }

        if !sorted_by_id {
            order.push(format!("{}.id ASC", RESOURCE_ALIAS));
        }

        (columns, order.join(", "))
    }
}

/// The index column a parameter type sorts on.
fn sort_column(param_type: SearchParamType) -> Option<&'static str> {
    match param_type {
        SearchParamType::String => Some("value_string_norm"),
        SearchParamType::Token => Some("token_code"),
        SearchParamType::Date => Some("value_date_start"),
        SearchParamType::Number => Some("number_value"),
        SearchParamType::Quantity => Some("quantity_value"),
        SearchParamType::Reference => Some("reference_id"),
        SearchParamType::Uri => Some("value_uri"),
        SearchParamType::Composite => None,
    }
}

fn composite_value_error(name: &str) -> Result<SqlFragment, SearchError> {
    Err(SearchError::InvalidComposite {
        parameter: name.to_string(),
        message: "composite values must be handled as a whole".to_string(),
    })
}
