//! Chained and reverse-chained (`_has`) parameter SQL.
//!
//! A forward chain such as `subject:Patient.organization.name=Acme` nests one
//! correlated subquery per reference hop: the index row of the reference
//! parameter joins to the live target resource, which must satisfy the next
//! hop. `_has` runs the other way, from source resources whose reference
//! rows point back at the outer row.
//!
//! Both are bounded by `max_chain_depth` reference hops. A parameter beyond
//! the bound compiles to a predicate that matches nothing and records a
//! [`SearchWarning::ChainDepthExceeded`].

use crate::core::SearchWarning;
use crate::error::SearchError;
use crate::types::{
    ResourceKind, ReverseChainFilter, ReverseChainedParameter, SearchParameter,
};

use super::query_builder::{QueryBuilder, SqlFragment, SqlParam, UNSATISFIABLE};

impl QueryBuilder<'_> {
    /// Condition for a forward chain on the row `alias`.
    pub(super) fn chain_condition(
        &mut self,
        alias: &str,
        kinds: &[ResourceKind],
        param: &SearchParameter,
        depth: usize,
    ) -> Result<SqlFragment, SearchError> {
        if depth + param.chain.len() > self.max_chain_depth {
            return Ok(self.depth_exceeded(chain_label(param)));
        }
        self.chain_hop(alias, kinds, param, 0)
    }

    fn chain_hop(
        &mut self,
        alias: &str,
        kinds: &[ResourceKind],
        param: &SearchParameter,
        index: usize,
    ) -> Result<SqlFragment, SearchError> {
        let hop = &param.chain[index];
        let definition = kinds
            .iter()
            .find_map(|k| self.registry.get_param(k, &hop.reference_param));

        let next_kinds: Vec<ResourceKind> = match (&hop.target_type, definition.as_deref()) {
            (Some(t), _) => vec![ResourceKind::parse(t)],
            (None, Some(def)) if !def.targets.is_empty() => def.targets.clone(),
            _ => ResourceKind::SUPPORTED.to_vec(),
        };

        let si = self.next_alias("si");
        let target = self.next_alias("r");

        let inner = if index + 1 < param.chain.len() {
            self.chain_hop(&target, &next_kinds, param, index + 1)?
        } else {
            let terminal = SearchParameter {
                name: hop.target_param.clone(),
                chain: Vec::new(),
                ..param.clone()
            };
            self.terminal_condition(&target, &next_kinds, &terminal)?
        };

        let mut sql = format!(
            "EXISTS (SELECT 1 FROM search_index {si} WHERE {si}.resource_type = {alias}.resource_type \
             AND {si}.resource_id = {alias}.id AND {si}.param_name = ?"
        );
        let mut params = vec![SqlParam::string(&hop.reference_param)];

        if let Some(target_type) = &hop.target_type {
            sql.push_str(&format!(" AND {si}.reference_type = ?"));
            params.push(SqlParam::string(target_type));
        }

        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM resources {target} WHERE {target}.resource_type = {si}.reference_type \
             AND {target}.id = {si}.reference_id AND {target}.is_deleted = 0"
        ));
        if !inner.is_empty() {
            sql.push_str(&format!(" AND ({})", inner.sql));
            params.extend(inner.params);
        }
        sql.push_str("))");

        Ok(SqlFragment::with_params(sql, params))
    }

    /// Condition for a `_has` parameter on the row `alias`.
    pub(super) fn reverse_chain_condition(
        &mut self,
        alias: &str,
        reverse: &ReverseChainedParameter,
    ) -> Result<SqlFragment, SearchError> {
        if reverse.depth() > self.max_chain_depth {
            return Ok(self.depth_exceeded(has_label(reverse)));
        }
        self.has_level(alias, reverse, 1)
    }

    fn has_level(
        &mut self,
        alias: &str,
        reverse: &ReverseChainedParameter,
        depth: usize,
    ) -> Result<SqlFragment, SearchError> {
        let source = self.next_alias("h");
        let si = self.next_alias("si");
        let source_kinds = [ResourceKind::parse(&reverse.source_type)];

        let inner = match &reverse.filter {
            ReverseChainFilter::Parameter(param) => {
                self.parameter_condition(&source, &source_kinds, param, depth)?
            }
            ReverseChainFilter::Nested(nested) => self.has_level(&source, nested, depth + 1)?,
        };

        let mut sql = format!(
            "EXISTS (SELECT 1 FROM resources {source} JOIN search_index {si} \
             ON {si}.resource_type = {source}.resource_type AND {si}.resource_id = {source}.id \
             WHERE {source}.resource_type = ? AND {source}.is_deleted = 0 AND {si}.param_name = ? \
             AND {si}.reference_type = {alias}.resource_type AND {si}.reference_id = {alias}.id"
        );
        let mut params = vec![
            SqlParam::string(&reverse.source_type),
            SqlParam::string(&reverse.reference_param),
        ];
        if !inner.is_empty() {
            sql.push_str(&format!(" AND ({})", inner.sql));
            params.extend(inner.params);
        }
        sql.push(')');

        Ok(SqlFragment::with_params(sql, params))
    }

    fn depth_exceeded(&mut self, parameter: String) -> SqlFragment {
        tracing::warn!(
            parameter = %parameter,
            max_depth = self.max_chain_depth,
            "Chain exceeds maximum depth"
        );
        self.warnings.push(SearchWarning::ChainDepthExceeded {
            parameter,
            max_depth: self.max_chain_depth,
        });
        SqlFragment::new(UNSATISFIABLE)
    }
}

/// Renders a chained parameter the way it appeared in the query.
fn chain_label(param: &SearchParameter) -> String {
    let mut label = String::new();
    for hop in &param.chain {
        label.push_str(&hop.reference_param);
        if let Some(t) = &hop.target_type {
            label.push(':');
            label.push_str(t);
        }
        label.push('.');
    }
    if let Some(last) = param.chain.last() {
        label.push_str(&last.target_param);
    }
    label
}

fn has_label(reverse: &ReverseChainedParameter) -> String {
    let mut label = format!("_has:{}:{}", reverse.source_type, reverse.reference_param);
    match &reverse.filter {
        ReverseChainFilter::Parameter(param) => {
            label.push(':');
            if param.chain.is_empty() {
                label.push_str(&param.name);
            } else {
                label.push_str(&chain_label(param));
            }
        }
        ReverseChainFilter::Nested(nested) => {
            label.push(':');
            label.push_str(&has_label(nested));
        }
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchParameterRegistry, parse_search_query};

    fn compile_with_depth(
        resource_type: &str,
        q: &str,
        max_depth: usize,
    ) -> super::super::query_builder::CompiledQuery {
        let registry = SearchParameterRegistry::standard();
        let query = parse_search_query(resource_type, q, &registry).unwrap();
        QueryBuilder::new(&registry, max_depth).compile(&query).unwrap()
    }

    #[test]
    fn test_single_hop_chain() {
        let compiled = compile_with_depth("Observation", "subject:Patient.family=Smith", 4);
        let sql = &compiled.filter.sql;
        assert!(sql.contains("reference_type = ?"));
        assert!(sql.contains("FROM resources r"));
        assert!(sql.contains("is_deleted = 0"));
        assert!(compiled.warnings.is_empty());
        // subject, Patient, family, value
        assert_eq!(compiled.filter.params.len(), 4);
    }

    #[test]
    fn test_chain_over_depth_is_unsatisfiable() {
        let compiled =
            compile_with_depth("Observation", "subject:Patient.organization.name=Acme", 1);
        assert_eq!(compiled.filter.sql, UNSATISFIABLE);
        assert_eq!(
            compiled.warnings,
            vec![SearchWarning::ChainDepthExceeded {
                parameter: "subject:Patient.organization.name".to_string(),
                max_depth: 1,
            }]
        );
    }

    #[test]
    fn test_has_condition() {
        let compiled = compile_with_depth("Patient", "_has:Observation:patient:code=1234-5", 4);
        let sql = &compiled.filter.sql;
        assert!(sql.starts_with("EXISTS (SELECT 1 FROM resources h"));
        assert!(sql.contains("reference_id = r.id"));
    }

    #[test]
    fn test_nested_has_over_depth() {
        let compiled = compile_with_depth(
            "Patient",
            "_has:Encounter:subject:_has:Condition:encounter:code=x",
            1,
        );
        assert_eq!(compiled.filter.sql, UNSATISFIABLE);
        assert!(matches!(
            &compiled.warnings[0],
            SearchWarning::ChainDepthExceeded { parameter, .. }
                if parameter == "_has:Encounter:subject:_has:Condition:encounter:code"
        ));
    }
}
