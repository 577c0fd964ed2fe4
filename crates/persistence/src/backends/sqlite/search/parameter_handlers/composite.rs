//! Composite parameter SQL handler.

use crate::error::SearchError;
use crate::search::CompositeComponentDef;
use crate::types::{SearchParamType, SearchValue};

use super::super::query_builder::{SqlFragment, SqlParam};
use super::{
    DateHandler, NumberHandler, QuantityHandler, ReferenceHandler, StringHandler, TokenHandler,
    UriHandler,
};

/// Handles composite parameter SQL generation.
///
/// A value such as `http://loinc.org|8480-6$gt100` is split on `$` in the
/// definition's component order. Every component must match a row of the
/// same `composite_group`, so the parts are bound to one element instance.
pub struct CompositeHandler;

impl CompositeHandler {
    /// Builds a condition on the resource row `outer` for one composite value.
    ///
    /// `alias_prefix` must be unique within the enclosing query.
    pub fn build_sql(
        param_name: &str,
        components: &[CompositeComponentDef],
        raw: &str,
        outer: &str,
        alias_prefix: &str,
    ) -> Result<SqlFragment, SearchError> {
        let parts: Vec<&str> = raw.split('$').collect();
        if parts.len() != components.len() {
            return Err(SearchError::InvalidComposite {
                parameter: param_name.to_string(),
                message: format!(
                    "expected {} components separated by '$', got {}",
                    components.len(),
                    parts.len()
                ),
            });
        }

        let conditions = components
            .iter()
            .zip(&parts)
            .map(|(component, part)| Self::component_condition(param_name, component, part))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::nest(param_name, components, conditions, outer, alias_prefix))
    }

    fn component_condition(
        param_name: &str,
        component: &CompositeComponentDef,
        part: &str,
    ) -> Result<SqlFragment, SearchError> {
        let value = SearchValue::parse_for(component.param_type, part);
        match component.param_type {
            SearchParamType::Token => Ok(TokenHandler::build_sql(&value, None)),
            SearchParamType::String => Ok(StringHandler::build_sql(&value, None)),
            SearchParamType::Uri => Ok(UriHandler::build_sql(&value, None)),
            SearchParamType::Reference => Ok(ReferenceHandler::build_sql(&value, None, None)),
            SearchParamType::Date => {
                DateHandler::build_sql(&value, "value_date_start", "value_date_end")
            }
            SearchParamType::Number => {
                NumberHandler::build_sql(&value, "number_low", "number_high")
            }
            SearchParamType::Quantity => QuantityHandler::build_sql(&value),
            SearchParamType::Composite => Err(SearchError::InvalidComposite {
                parameter: param_name.to_string(),
                message: format!("component '{}' cannot itself be composite", component.code),
            }),
        }
    }

    /// Nests one correlated `EXISTS` per component, each pinned to the
    /// previous component's group.
    fn nest(
        param_name: &str,
        components: &[CompositeComponentDef],
        conditions: Vec<SqlFragment>,
        outer: &str,
        alias_prefix: &str,
    ) -> SqlFragment {
        let mut sql = String::new();
        let mut params = Vec::new();

        for (i, (component, condition)) in components.iter().zip(conditions).enumerate() {
            let alias = format!("{}_{}", alias_prefix, i);
            if i == 0 {
                sql.push_str(&format!(
                    "EXISTS (SELECT 1 FROM search_index {a} WHERE {a}.resource_type = {o}.resource_type \
                     AND {a}.resource_id = {o}.id AND {a}.param_name = ? AND {a}.component = ? AND ({c})",
                    a = alias,
                    o = outer,
                    c = condition.sql
                ));
                params.push(SqlParam::string(param_name));
            } else {
                let prev = format!("{}_{}", alias_prefix, i - 1);
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM search_index {a} WHERE {a}.resource_type = {p}.resource_type \
                     AND {a}.resource_id = {p}.resource_id AND {a}.param_name = {p}.param_name \
                     AND {a}.composite_group = {p}.composite_group AND {a}.component = ? AND ({c})",
                    a = alias,
                    p = prev,
                    c = condition.sql
                ));
            }
            params.push(SqlParam::string(&component.code));
            params.extend(condition.params);
        }
        sql.push_str(&")".repeat(components.len()));

        SqlFragment::with_params(sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components() -> Vec<CompositeComponentDef> {
        vec![
            CompositeComponentDef {
                code: "code".to_string(),
                param_type: SearchParamType::Token,
                path: "code".to_string(),
            },
            CompositeComponentDef {
                code: "value-quantity".to_string(),
                param_type: SearchParamType::Quantity,
                path: "valueQuantity".to_string(),
            },
        ]
    }

    #[test]
    fn test_composite_nests_by_group() {
        let frag = CompositeHandler::build_sql(
            "code-value-quantity",
            &components(),
            "http://loinc.org|8480-6$gt100",
            "r",
            "cv0",
        )
        .unwrap();
        assert!(frag.sql.contains("cv0_1.composite_group = cv0_0.composite_group"));
        assert!(frag.sql.ends_with("))"));
        // name, component, system, code, component, bound
        assert_eq!(frag.params.len(), 6);
        assert!(matches!(&frag.params[0], SqlParam::String(s) if s == "code-value-quantity"));
        assert!(matches!(&frag.params[4], SqlParam::String(s) if s == "value-quantity"));
    }

    #[test]
    fn test_composite_component_count_mismatch() {
        let err =
            CompositeHandler::build_sql("code-value-quantity", &components(), "8480-6", "r", "c")
                .unwrap_err();
        assert!(matches!(err, SearchError::InvalidComposite { .. }));
    }
}
