//! `sort`, `options`, `limit` and `offset` arguments.

use crate::cypher::{Clause, Expr, OrderItem, Projection};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{FieldDef, FieldSource, QueryLimit, SortDirection};
use crate::statement::TranslationNotice;
use crate::value::Value;

use super::context::TranslationContext;

/// Which side of a connection edge a sort key reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortSide {
    Node,
    Edge,
}

#[derive(Debug, Clone)]
pub(crate) struct SortKey<'a> {
    /// Type the field was resolved on.
    pub(crate) owner: &'a str,
    pub(crate) field: &'a FieldDef,
    pub(crate) direction: SortDirection,
    pub(crate) side: SortSide,
}

/// Ordering and slicing of one list scope.
#[derive(Debug, Default)]
pub(crate) struct Paging<'a> {
    pub(crate) keys: Vec<SortKey<'a>>,
    pub(crate) skip: Option<Expr>,
    pub(crate) limit: Option<Expr>,
    nulls_last: bool,
}

impl<'a> Paging<'a> {
    /// No ordering and no slicing.
    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.skip.is_none() && self.limit.is_none()
    }

    /// `ORDER BY` items; `expr_of` maps the n-th key to the sorted expression.
    pub(crate) fn order_items(
        &self,
        mut expr_of: impl FnMut(usize, &SortKey<'a>) -> Expr,
    ) -> Vec<OrderItem> {
        let mut items = Vec::with_capacity(self.keys.len());
        for (idx, key) in self.keys.iter().enumerate() {
            let expr = expr_of(idx, key);
            if self.nulls_last && key.direction == SortDirection::Desc {
                items.push(OrderItem {
                    expr: expr.clone().is_null(),
                    direction: SortDirection::Asc,
                });
            }
            items.push(OrderItem {
                expr,
                direction: key.direction,
            });
        }
        items
    }

    /// `WITH * ORDER BY .. SKIP .. LIMIT ..`, or nothing when unpaged.
    pub(crate) fn clause(&self, expr_of: impl FnMut(usize, &SortKey<'a>) -> Expr) -> Option<Clause> {
        if self.is_empty() {
            return None;
        }
        let mut projection = Projection::star();
        projection.order = self.order_items(expr_of);
        projection.skip = self.skip.clone();
        projection.limit = self.limit.clone();
        Some(Clause::With {
            projection,
            predicate: None,
        })
    }

    /// `WITH * ORDER BY ..` without slicing.
    pub(crate) fn order_clause(
        &self,
        expr_of: impl FnMut(usize, &SortKey<'a>) -> Expr,
    ) -> Option<Clause> {
        if self.keys.is_empty() {
            return None;
        }
        let mut projection = Projection::star();
        projection.order = self.order_items(expr_of);
        Some(Clause::With {
            projection,
            predicate: None,
        })
    }

    /// `WITH * SKIP .. LIMIT ..` of rows already in order.
    pub(crate) fn slice_clause(&self) -> Option<Clause> {
        if self.skip.is_none() && self.limit.is_none() {
            return None;
        }
        let mut projection = Projection::star();
        projection.skip = self.skip.clone();
        projection.limit = self.limit.clone();
        Some(Clause::With {
            projection,
            predicate: None,
        })
    }
}

fn sort_error(reason: impl Into<String>) -> TranslateError {
    TranslateError::invalid_argument("sort", reason)
}

fn direction(value: &Value) -> TranslateResult<SortDirection> {
    match value.as_str() {
        Some("ASC") => Ok(SortDirection::Asc),
        Some("DESC") => Ok(SortDirection::Desc),
        _ => Err(sort_error(format!(
            "direction must be ASC or DESC, found {}",
            value.kind()
        ))),
    }
}

fn sort_keys<'a>(
    owner: &'a dyn FieldSource,
    value: &Value,
    side: SortSide,
    out: &mut Vec<SortKey<'a>>,
) -> TranslateResult<()> {
    let map = value
        .as_map()
        .ok_or_else(|| sort_error(format!("expected an object, found {}", value.kind())))?;
    for (name, dir) in map {
        let field = owner
            .lookup_field(name)
            .filter(|f| f.as_scalar().is_some_and(|s| !s.list))
            .ok_or_else(|| {
                sort_error(format!("'{name}' is not a sortable field of {}", owner.type_name()))
            })?;
        out.push(SortKey {
            owner: owner.type_name(),
            field,
            direction: direction(dir)?,
            side,
        });
    }
    Ok(())
}

fn non_negative(argument: &str, value: &Value) -> TranslateResult<u64> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as u64),
        other => Err(TranslateError::invalid_argument(
            argument,
            format!("expected a non-negative integer, found {}", other.kind()),
        )),
    }
}

/// Reads an argument from `options` first, then from the field itself.
fn option<'f>(field: &'f SelectionField, name: &str) -> Option<&'f Value> {
    field
        .argument("options")
        .and_then(Value::as_map)
        .and_then(|options| options.get(name))
        .filter(|v| !v.is_null())
        .or_else(|| field.argument(name))
}

/// Effective limit: the explicit one clamped to the entity maximum, else
/// the entity default, then the configured default.
pub(crate) fn effective_limit(
    ctx: &TranslationContext<'_>,
    limits: Option<&QueryLimit>,
    explicit: Option<u64>,
) -> Option<u64> {
    let max = limits.and_then(|l| l.max);
    let chosen = explicit
        .or_else(|| limits.and_then(|l| l.default))
        .or(max)
        .or(ctx.config.default_limit);
    match (chosen, max) {
        (Some(chosen), Some(max)) => Some(chosen.min(max)),
        (chosen, _) => chosen,
    }
}

/// Paging of a plain list field or root read. Union results have no
/// sortable fields, so `owner` is `None` for them.
pub(crate) fn list_paging<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: Option<&'a dyn FieldSource>,
    limits: Option<&QueryLimit>,
    default_sort: &'a [(String, SortDirection)],
    field: &SelectionField,
) -> TranslateResult<Paging<'a>> {
    let mut keys = Vec::new();
    match (option(field, "sort"), owner) {
        (Some(_), None) => return Err(sort_error("union results cannot be sorted")),
        (Some(Value::List(items)), Some(owner)) => {
            for item in items {
                sort_keys(owner, item, SortSide::Node, &mut keys)?;
            }
        }
        (Some(single), Some(owner)) => sort_keys(owner, single, SortSide::Node, &mut keys)?,
        (None, Some(owner)) => default_keys(owner, default_sort, &mut keys)?,
        (None, None) => {}
    }
    let offset = option(field, "offset")
        .map(|v| non_negative("offset", v))
        .transpose()?;
    let explicit = option(field, "limit")
        .map(|v| non_negative("limit", v))
        .transpose()?;
    let limit = effective_limit(ctx, limits, explicit);
    finish(ctx, keys, offset.filter(|o| *o > 0), limit)
}

/// Paging of a connection: `sort: [{ node, edge }]` plus the page window.
pub(crate) fn connection_paging<'a>(
    ctx: &mut TranslationContext<'a>,
    node_owner: &'a dyn FieldSource,
    edge_owner: Option<&'a dyn FieldSource>,
    limits: Option<&QueryLimit>,
    default_sort: &'a [(String, SortDirection)],
    field: &SelectionField,
    start: u64,
    first: Option<u64>,
) -> TranslateResult<Paging<'a>> {
    let mut keys = Vec::new();
    match field.argument("sort") {
        Some(value) => {
            let items = match value {
                Value::List(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                let map = item
                    .as_map()
                    .ok_or_else(|| sort_error("connection sort entries must be objects"))?;
                for (side, inner) in map {
                    match side.as_str() {
                        "node" => sort_keys(node_owner, inner, SortSide::Node, &mut keys)?,
                        "edge" => {
                            let owner = edge_owner.ok_or_else(|| {
                                sort_error("relationship has no properties to sort by")
                            })?;
                            sort_keys(owner, inner, SortSide::Edge, &mut keys)?;
                        }
                        other => return Err(sort_error(format!("unknown sort side '{other}'"))),
                    }
                }
            }
        }
        None => default_keys(node_owner, default_sort, &mut keys)?,
    }
    let limit = effective_limit(ctx, limits, first);
    finish(ctx, keys, (start > 0).then_some(start), limit)
}

/// Paging of a root connection: bare node sort entries plus the page window.
pub(crate) fn root_connection_paging<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: Option<&'a dyn FieldSource>,
    limits: Option<&QueryLimit>,
    default_sort: &'a [(String, SortDirection)],
    field: &SelectionField,
    start: u64,
    first: Option<u64>,
) -> TranslateResult<Paging<'a>> {
    let mut keys = Vec::new();
    match (field.argument("sort"), owner) {
        (Some(_), None) => return Err(sort_error("union results cannot be sorted")),
        (Some(Value::List(items)), Some(owner)) => {
            for item in items {
                sort_keys(owner, item, SortSide::Node, &mut keys)?;
            }
        }
        (Some(single), Some(owner)) => sort_keys(owner, single, SortSide::Node, &mut keys)?,
        (None, Some(owner)) => default_keys(owner, default_sort, &mut keys)?,
        (None, None) => {}
    }
    let limit = effective_limit(ctx, limits, first);
    finish(ctx, keys, (start > 0).then_some(start), limit)
}

fn default_keys<'a>(
    owner: &'a dyn FieldSource,
    default_sort: &'a [(String, SortDirection)],
    out: &mut Vec<SortKey<'a>>,
) -> TranslateResult<()> {
    for (name, direction) in default_sort {
        let field = owner
            .lookup_field(name)
            .ok_or_else(|| TranslateError::unknown_field(owner.type_name(), name))?;
        out.push(SortKey {
            owner: owner.type_name(),
            field,
            direction: *direction,
            side: SortSide::Node,
        });
    }
    Ok(())
}

fn finish<'a>(
    ctx: &mut TranslationContext<'a>,
    keys: Vec<SortKey<'a>>,
    skip: Option<u64>,
    limit: Option<u64>,
) -> TranslateResult<Paging<'a>> {
    if let Some(key) = keys.first() {
        ctx.notice(TranslationNotice::UnstableTieBreak {
            entity: key.owner.to_owned(),
        });
    }
    let to_param = |ctx: &mut TranslationContext<'a>, n: u64| -> TranslateResult<Expr> {
        let n = i64::try_from(n).map_err(|_| TranslateError::IntegerOutOfRange {
            literal: n.to_string(),
        })?;
        Ok(ctx.param(Value::Int(n)))
    };
    let skip = skip.map(|s| to_param(ctx, s)).transpose()?;
    let limit = limit.map(|l| to_param(ctx, l)).transpose()?;
    Ok(Paging {
        keys,
        skip,
        limit,
        nulls_last: ctx.config.nulls_last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::{render, Var};
    use crate::operation::SelectionBuilder;
    use crate::schema::{EntityDef, FieldDef, ScalarType, Schema, SchemaBuilder};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::scalar("rating", ScalarType::Float))
                    .limit(Some(10), Some(50)),
            )
            .build()
            .expect("schema")
    }

    #[test]
    fn descending_keys_sort_nulls_last_and_limit_is_clamped() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("movies")
            .arg("options", json!({ "sort": [{ "rating": "DESC" }, { "title": "ASC" }], "limit": 500, "offset": 5 }))
            .build()
            .expect("field");
        let paging = list_paging(&mut ctx, Some(movie as &dyn FieldSource), movie.limit.as_ref(), &movie.default_sort, &field)
            .expect("paging");
        let this = Var::new("this");
        let clause = paging
            .clause(|_, key| this.prop(key.field.db_property()))
            .expect("clause");
        assert_eq!(
            render(&[clause]),
            "WITH *\nORDER BY this.rating IS NULL ASC, this.rating DESC, this.title ASC\nSKIP $param0\nLIMIT $param1"
        );
        let statement = ctx.finish(&[]).expect("finish");
        assert_eq!(statement.params["param1"], Value::Int(50));
        assert_eq!(statement.notices.len(), 1);
    }

    #[test]
    fn entity_default_limit_applies_without_arguments() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionField::new("movies");
        let paging = list_paging(&mut ctx, Some(movie as &dyn FieldSource), movie.limit.as_ref(), &movie.default_sort, &field)
            .expect("paging");
        assert!(paging.keys.is_empty());
        assert!(paging.skip.is_none());
        assert!(paging.limit.is_some());
    }

    #[test]
    fn unknown_sort_fields_are_rejected() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("movies")
            .arg("sort", json!([{ "budget": "ASC" }]))
            .build()
            .expect("field");
        let err = list_paging(&mut ctx, Some(movie as &dyn FieldSource), movie.limit.as_ref(), &movie.default_sort, &field)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }
}
