//! Computed fields backed by a user statement.
//!
//! The statement runs in its own `CALL {}` with the owning node bound as
//! `this`. Its `$name` references are rewritten to fresh parameters carrying
//! the field's arguments; `$jwt` keeps pointing at the claims map.

use rustc_hash::FxHashMap;

use crate::cypher::{Clause, Expr, Imports, Projection, ProjectionItem, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{
    AuthOperation, CypherField, CypherReturn, FieldDef, FieldSource, TypeTarget,
};
use crate::value::Value;

use super::context::TranslationContext;
use super::polymorphic::select_members;
use super::projection::project_entity;
use super::scope::{filter_clauses, ScopeFilter, Source};
use super::sort::{list_paging, Paging};

const STATEMENT_VAR: &str = "this";

/// Rewrites `$name` tokens outside string literals and quoted identifiers.
fn rewrite_parameters(
    ctx: &mut TranslationContext<'_>,
    statement: &str,
    field: &SelectionField,
) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut names: FxHashMap<String, String> = FxHashMap::default();
    let mut quote: Option<char> = None;
    let mut chars = statement.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == '\\' && q != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' || c == '`' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') => {
                let mut name = String::new();
                while let Some(n) = chars.peek().copied() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push('$');
                match name.as_str() {
                    "jwt" => {
                        ctx.jwt_param();
                        out.push_str(&name);
                    }
                    "isAuthenticated" => {
                        ctx.is_authenticated_param();
                        out.push_str(&name);
                    }
                    _ => {
                        let param = names.entry(name).or_insert_with_key(|name| {
                            let value = field.raw_argument(name).cloned().unwrap_or(Value::Null);
                            ctx.param_name(value)
                        });
                        out.push_str(param);
                    }
                }
            }
            None => out.push(c),
        }
    }
    out
}

/// `CALL { WITH node CALL { <statement> } WITH column AS result .. }`
pub(crate) fn project_cypher<'a>(
    ctx: &mut TranslationContext<'a>,
    node: &Var,
    def: &'a FieldDef,
    cypher: &'a CypherField,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let statement = rewrite_parameters(ctx, &cypher.statement, field);
    let mut inner = Vec::with_capacity(2);
    if node.name() != STATEMENT_VAR {
        inner.push(Clause::With {
            projection: Projection::items(vec![ProjectionItem::aliased(
                node.expr(),
                &Var::new(STATEMENT_VAR),
            )]),
            predicate: None,
        });
    }
    inner.push(Clause::Raw(statement));

    let result = ctx.fresh_node();
    let mut body = vec![
        Clause::call(Imports::var(node), inner),
        Clause::With {
            projection: Projection::single(Var::new(cypher.column.clone()).expr(), &result),
            predicate: None,
        },
    ];

    let single = !cypher.list;
    let projected = match &cypher.returns {
        CypherReturn::Scalar(_) => result.expr(),
        CypherReturn::Target(name) => {
            let target = ctx
                .schema
                .target_of(name)
                .ok_or_else(|| TranslateError::unknown_field(name, &def.name))?;
            match &target {
                TypeTarget::Entity(_) => entity_rows(ctx, &target, &result, field, single, &mut body)?,
                _ => member_rows(ctx, &target, &result, field, &mut body)?,
            }
        }
    };
    let out = ctx.fresh_var();
    body.push(Clause::return_single(Expr::collect(projected, single), &out));
    Ok((Clause::call(Imports::var(node), body), out))
}

/// Filters, pages and projects rows of a single entity type.
fn entity_rows<'a>(
    ctx: &mut TranslationContext<'a>,
    target: &TypeTarget,
    result: &Var,
    field: &SelectionField,
    single: bool,
    body: &mut Vec<Clause>,
) -> TranslateResult<Expr> {
    let schema = ctx.schema;
    let entity = schema
        .entity(target.name())
        .ok_or_else(|| TranslateError::unknown_field(target.name(), &field.name))?;
    body.extend(filter_clauses(
        ctx,
        entity,
        result,
        Source::Bound,
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: field.argument("where"),
            selection: Some(field),
            ..ScopeFilter::default()
        },
    )?);
    let paging = if single {
        Paging::none()
    } else {
        list_paging(
            ctx,
            Some(entity as &dyn FieldSource),
            entity.limit.as_ref(),
            &entity.default_sort,
            field,
        )?
    };
    body.extend(paging.clause(|_, key| result.prop(key.field.db_property())));
    let projected = project_entity(ctx, entity, result, field, false)?;
    body.extend(projected.calls);
    Ok(projected.expr)
}

/// One `UNION` branch per member, each keeping only rows carrying the
/// member's labels.
fn member_rows<'a>(
    ctx: &mut TranslationContext<'a>,
    target: &TypeTarget,
    result: &Var,
    field: &SelectionField,
    body: &mut Vec<Clause>,
) -> TranslateResult<Expr> {
    let out = ctx.fresh_var();
    let mut branches = Vec::new();
    for branch in select_members(ctx, target, field.argument("where"), false)? {
        let labels = Expr::HasLabels(result.clone(), branch.entity.labels.clone());
        let mut branch_body = filter_clauses(
            ctx,
            branch.entity,
            result,
            Source::Bound,
            &[AuthOperation::Read],
            ScopeFilter {
                where_value: branch.where_value,
                extra: Some(Expr::and([labels, branch.extra.unwrap_or(Expr::Bool(true))])),
                selection: Some(field),
                ..ScopeFilter::default()
            },
        )?;
        let projected = project_entity(ctx, branch.entity, result, field, true)?;
        branch_body.extend(projected.calls);
        branch_body.push(Clause::return_single(projected.expr, &out));
        branches.push(branch_body);
    }
    body.push(Clause::Union {
        imports: Imports::var(result),
        branches,
    });
    Ok(out.expr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{EntityDef, FieldKind, ScalarType, Schema, SchemaBuilder, UnionDef};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::cypher(
                        "similar",
                        "MATCH (this)-[:SIMILAR]->(m:Movie) WHERE m.title <> '$title' RETURN m LIMIT $first",
                        "m",
                        CypherReturn::Target("Movie".into()),
                    )
                    .list())
                    .field(FieldDef::cypher(
                        "score",
                        "RETURN size(this.title) * $factor + $factor AS score",
                        "score",
                        CypherReturn::Scalar(ScalarType::Int),
                    ))
                    .field(
                        FieldDef::cypher(
                            "related",
                            "MATCH (this)--(n) RETURN n",
                            "n",
                            CypherReturn::Target("Related".into()),
                        )
                        .list(),
                    ),
            )
            .entity(EntityDef::new("Person").field(FieldDef::scalar("name", ScalarType::String)))
            .union(UnionDef::new("Related", ["Movie", "Person"]))
            .build()
            .expect("schema")
    }

    fn cypher_field<'s>(schema: &'s Schema, name: &str) -> (&'s FieldDef, &'s CypherField) {
        let def = schema
            .entity("Movie")
            .and_then(|m| m.field_def(name))
            .expect("field");
        match &def.kind {
            FieldKind::Cypher(cypher) => (def, cypher),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn arguments_become_parameters_outside_literals() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let field = SelectionBuilder::new("score")
            .arg("factor", json!(3))
            .build()
            .expect("field");
        let text = rewrite_parameters(&mut ctx, "RETURN '$factor', $factor + $factor AS x, $missing", &field);
        assert_eq!(text, "RETURN '$factor', $param0 + $param0 AS x, $param1");
        let statement = ctx.finish(&[]).expect("finish");
        assert_eq!(statement.params["param0"], Value::Int(3));
        assert_eq!(statement.params["param1"], Value::Null);
    }

    #[test]
    fn scalar_field_takes_the_head_of_its_column() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let (def, cypher) = cypher_field(&schema, "score");
        let field = SelectionBuilder::new("score").arg("factor", json!(2)).build().expect("field");
        let (call, out) =
            project_cypher(&mut ctx, &Var::new("this"), def, cypher, &field).expect("call");
        assert_eq!(out.name(), "var1");
        assert_eq!(
            render(&[call]),
            "CALL {\n    WITH this\n    CALL {\n        WITH this\n        RETURN size(this.title) * $param0 + $param0 AS score\n    }\n    WITH score AS this0\n    RETURN head(collect(this0)) AS var1\n}"
        );
    }

    #[test]
    fn entity_results_are_projected_with_their_selection() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let (def, cypher) = cypher_field(&schema, "similar");
        let field = SelectionBuilder::new("similar")
            .arg("first", json!(5))
            .field("title")
            .build()
            .expect("field");
        let (call, _) =
            project_cypher(&mut ctx, &Var::new("this3"), def, cypher, &field).expect("call");
        let text = render(&[call]);
        assert!(text.contains("        WITH this3 AS this\n        MATCH (this)-[:SIMILAR]->(m:Movie) WHERE m.title <> '$title' RETURN m LIMIT $param0\n"), "{text}");
        assert!(text.contains("    WITH m AS this0\n    RETURN collect(this0 { .title }) AS var1"), "{text}");
    }

    #[test]
    fn union_results_branch_on_labels() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let (def, cypher) = cypher_field(&schema, "related");
        let field = SelectionBuilder::new("related")
            .child(SelectionBuilder::new("title").on("Movie"))
            .child(SelectionBuilder::new("name").on("Person"))
            .build()
            .expect("field");
        let (call, _) =
            project_cypher(&mut ctx, &Var::new("this"), def, cypher, &field).expect("call");
        let text = render(&[call]);
        assert!(text.contains("        WITH this0\n        WITH *\n        WHERE this0:Movie\n        RETURN this0 { __typename: \"Movie\", .title } AS var1\n        UNION\n"), "{text}");
        assert!(text.ends_with("    RETURN collect(var1) AS var2\n}"), "{text}");
    }
}
