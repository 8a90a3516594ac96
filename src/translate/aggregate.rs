//! `<plural>Aggregate` root fields and `<rel>Aggregate` relationship fields.

use crate::cypher::{Clause, CompareOp, Expr, Imports, NodePattern, Pattern, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{
    upper_first, AuthOperation, EntityDef, FieldSource, RelationshipDef, ScalarType, TypeTarget,
};

use super::context::TranslationContext;
use super::hop_pattern;
use super::scope::{filter_clauses, ScopeFilter, Source};

const TYPENAME: &str = "__typename";

/// `reduce` over the collected values keeping the shortest or longest one.
fn extreme_length(ctx: &mut TranslationContext<'_>, value: Expr, op: CompareOp) -> Expr {
    let acc = ctx.fresh_var();
    let item = ctx.fresh_var();
    let size = |var: &Var| Expr::call("size", vec![var.expr()]);
    Expr::Reduce {
        acc: acc.clone(),
        init: Box::new(Expr::Null),
        var: item.clone(),
        list: Box::new(Expr::call("collect", vec![value])),
        body: Box::new(Expr::Case {
            branches: vec![(
                Expr::or([acc.expr().is_null(), Expr::compare(size(&item), op, size(&acc))]),
                item.expr(),
            )],
            otherwise: Some(Box::new(acc.expr())),
        }),
    }
}

fn aggregate_function(
    ctx: &mut TranslationContext<'_>,
    ty: &ScalarType,
    name: &str,
    value: Expr,
) -> Option<Expr> {
    let numeric = ty.is_numeric();
    let ordered = numeric || ty.is_temporal();
    match name {
        "min" | "max" if ordered => Some(Expr::call(name, vec![value])),
        "average" if numeric => Some(Expr::call("avg", vec![value])),
        "sum" if numeric => Some(Expr::call("sum", vec![value])),
        "shortest" if ty.is_textual() => Some(extreme_length(ctx, value, CompareOp::Lt)),
        "longest" if ty.is_textual() => Some(extreme_length(ctx, value, CompareOp::Gt)),
        _ => None,
    }
}

/// `{ title: { shortest: .., longest: .. }, runtime: { min: .. } }` entries
/// for the selected scalar fields.
fn field_aggregates(
    ctx: &mut TranslationContext<'_>,
    owner: &dyn FieldSource,
    var: &Var,
    children: &[SelectionField],
    typename: &str,
) -> TranslateResult<Vec<(String, Expr)>> {
    let mut entries = Vec::with_capacity(children.len());
    for child in children {
        let key = child.response_key().to_owned();
        if child.name == TYPENAME {
            entries.push((key, Expr::Str(typename.to_owned())));
            continue;
        }
        let def = owner
            .lookup_field(&child.name)
            .ok_or_else(|| TranslateError::unknown_field(typename, &child.name))?;
        let scalar = def
            .as_scalar()
            .filter(|s| !s.list)
            .ok_or_else(|| TranslateError::unknown_field(typename, &child.name))?;
        let aggregate_type = format!("{}AggregateSelection", scalar.ty.name());
        let mut parts = Vec::with_capacity(child.selection.len());
        for function in &child.selection {
            if function.name == TYPENAME {
                parts.push((
                    function.response_key().to_owned(),
                    Expr::Str(aggregate_type.clone()),
                ));
                continue;
            }
            let expr = aggregate_function(ctx, &scalar.ty, &function.name, var.prop(def.db_property()))
                .ok_or_else(|| TranslateError::unknown_field(&aggregate_type, &function.name))?;
            parts.push((function.response_key().to_owned(), expr));
        }
        entries.push((key, Expr::Map(parts)));
    }
    Ok(entries)
}

/// Root aggregate: filter the entity set, return one aggregate map.
pub(crate) fn root_aggregate<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let node = ctx.root_var();
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &node,
        Source::Match(Pattern::node(NodePattern::new(&node, &entity.labels))),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: field.argument("where"),
            selection: Some(field),
            ..ScopeFilter::default()
        },
    )?;
    let typename = format!("{}AggregateSelection", entity.name);
    let mut entries = Vec::with_capacity(field.selection.len());
    for child in &field.selection {
        let key = child.response_key().to_owned();
        match child.name.as_str() {
            "count" => entries.push((key, Expr::call("count", vec![node.expr()]))),
            TYPENAME => entries.push((key, Expr::Str(typename.clone()))),
            _ => entries.extend(field_aggregates(
                ctx,
                entity,
                &node,
                std::slice::from_ref(child),
                &typename,
            )?),
        }
    }
    clauses.push(Clause::return_single(Expr::Map(entries), &node));
    Ok(clauses)
}

/// `<rel>Aggregate { count node { .. } edge { .. } }` on a projected node.
pub(crate) fn nested_aggregate<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let schema = ctx.schema;
    let target = match &relationship.target {
        TypeTarget::Entity(name) => schema.entity(name),
        _ => None,
    }
    .ok_or_else(|| {
        TranslateError::unknown_field(&relationship.source, format!("{}Aggregate", relationship.field))
    })?;
    let edge = ctx.fresh_node();
    let node = ctx.fresh_node();
    let mut body = filter_clauses(
        ctx,
        target,
        &node,
        Source::Match(hop_pattern(parent, relationship, Some(&edge), &node, &target.labels)),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: field.argument("where"),
            edge: Some((&edge, relationship)),
            ..ScopeFilter::default()
        },
    )?;

    let prefix = format!(
        "{}{}{}",
        relationship.source,
        target.name,
        upper_first(&relationship.field)
    );
    let mut entries = Vec::with_capacity(field.selection.len());
    for child in &field.selection {
        let key = child.response_key().to_owned();
        match child.name.as_str() {
            "count" => entries.push((key, Expr::call("count", vec![node.expr()]))),
            TYPENAME => entries.push((
                key,
                Expr::Str(format!("{prefix}AggregationSelection")),
            )),
            "node" => {
                let typename = format!("{prefix}NodeAggregateSelection");
                let parts = field_aggregates(ctx, target, &node, &child.selection, &typename)?;
                entries.push((key, Expr::Map(parts)));
            }
            "edge" => {
                let typename = format!("{prefix}EdgeAggregateSelection");
                let properties = relationship
                    .properties
                    .as_deref()
                    .and_then(|name| schema.properties(name))
                    .ok_or_else(|| TranslateError::unknown_field(&typename, "edge"))?;
                let parts = field_aggregates(ctx, properties, &edge, &child.selection, &typename)?;
                entries.push((key, Expr::Map(parts)));
            }
            other => {
                return Err(TranslateError::unknown_field(
                    format!("{prefix}AggregationSelection"),
                    other,
                ))
            }
        }
    }
    let out = ctx.fresh_var();
    body.push(Clause::return_single(Expr::Map(entries), &out));
    Ok((Clause::call(Imports::var(parent), body), out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{Direction, FieldDef, PropertiesDef, Schema, SchemaBuilder};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::scalar("runtime", ScalarType::Int))
                    .field(FieldDef::scalar("released", ScalarType::DateTime))
                    .field(
                        FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming)
                            .properties("ActedIn"),
                    ),
            )
            .entity(EntityDef::new("Actor").field(FieldDef::scalar("name", ScalarType::String)))
            .properties(
                PropertiesDef::new("ActedIn").field(FieldDef::scalar("screenTime", ScalarType::Int)),
            )
            .build()
            .expect("schema")
    }

    #[test]
    fn root_aggregate_returns_one_map() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("moviesAggregate")
            .arg("where", json!({ "runtime_GT": 60 }))
            .field("count")
            .child(SelectionBuilder::new("runtime").fields(["min", "max", "average"]))
            .child(SelectionBuilder::new("title").field("shortest"))
            .build()
            .expect("field");
        let clauses = root_aggregate(&mut ctx, movie, &field).expect("clauses");
        assert_eq!(
            render(&clauses),
            "MATCH (this:Movie)\nWHERE this.runtime > $param0\nRETURN { count: count(this), runtime: { min: min(this.runtime), max: max(this.runtime), average: avg(this.runtime) }, title: { shortest: reduce(var0 = NULL, var1 IN collect(this.title) | CASE WHEN var0 IS NULL OR size(var1) < size(var0) THEN var1 ELSE var0 END) } } AS this"
        );
    }

    #[test]
    fn functions_follow_the_field_type() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("moviesAggregate")
            .child(SelectionBuilder::new("released").field("sum"))
            .build()
            .expect("field");
        let err = root_aggregate(&mut ctx, movie, &field).unwrap_err();
        assert_eq!(
            err,
            TranslateError::unknown_field("DateTimeAggregateSelection", "sum")
        );
    }

    #[test]
    fn nested_aggregate_reads_node_and_edge() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let actors = schema
            .entity("Movie")
            .and_then(|m| m.field_def("actors"))
            .and_then(|f| f.as_relationship())
            .expect("actors");
        let field = SelectionBuilder::new("actorsAggregate")
            .field("count")
            .child(SelectionBuilder::new("edge").child(SelectionBuilder::new("screenTime").field("sum")))
            .build()
            .expect("field");
        let (call, out) =
            nested_aggregate(&mut ctx, &Var::new("this"), actors, &field).expect("call");
        assert_eq!(out.name(), "var2");
        assert_eq!(
            render(&[call]),
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    RETURN { count: count(this1), edge: { screenTime: { sum: sum(this0.screenTime) } } } AS var2\n}"
        );
    }
}
