//! Relationship fields projected through correlated `CALL {}` subqueries.

use crate::cypher::{Clause, Expr, Imports, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, FieldSource, RelationshipDef, TypeTarget};

use super::context::TranslationContext;
use super::hop_pattern;
use super::polymorphic;
use super::projection::project_entity;
use super::scope::{filter_clauses, ScopeFilter, Source};
use super::sort::{list_paging, Paging};

/// `CALL { WITH parent MATCH .. RETURN collect(..) AS out }` plus `out`.
pub(crate) fn project_relationship<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let target = match &relationship.target {
        TypeTarget::Entity(name) => ctx
            .schema
            .entity(name)
            .ok_or_else(|| TranslateError::unknown_field(&relationship.source, &relationship.field))?,
        _ => return polymorphic::project_relationship(ctx, parent, relationship, field),
    };

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
            selection: Some(field),
            ..ScopeFilter::default()
        },
    )?;
    let paging = if relationship.is_one() {
        Paging::none()
    } else {
        list_paging(
            ctx,
            Some(target as &dyn FieldSource),
            target.limit.as_ref(),
            &target.default_sort,
            field,
        )?
    };
    body.extend(paging.clause(|_, key| node.prop(key.field.db_property())));

    let projected = project_entity(ctx, target, &node, field, false)?;
    body.extend(projected.calls);
    let out = ctx.fresh_var();
    body.push(Clause::return_single(
        Expr::collect(projected.expr, relationship.is_one()),
        &out,
    ));
    Ok((Clause::call(Imports::var(parent), body), out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{Direction, EntityDef, FieldDef, ScalarType, Schema, SchemaBuilder};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming))
                    .field(
                        FieldDef::relationship("director", "Person", "DIRECTED", Direction::Incoming)
                            .one(),
                    ),
            )
            .entity(EntityDef::new("Actor").field(FieldDef::scalar("name", ScalarType::String)))
            .entity(EntityDef::new("Person").field(FieldDef::scalar("name", ScalarType::String)))
            .build()
            .expect("schema")
    }

    #[test]
    fn many_relationship_collects_filtered_nodes() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let actors = movie
            .field_def("actors")
            .and_then(|f| f.as_relationship())
            .expect("actors");
        let field = SelectionBuilder::new("actors")
            .arg("where", json!({ "name_CONTAINS": "an" }))
            .field("name")
            .build()
            .expect("field");
        let (call, out) =
            project_relationship(&mut ctx, &Var::new("this"), actors, &field).expect("call");
        assert_eq!(out.name(), "var2");
        assert_eq!(
            render(&[call]),
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    WHERE this1.name CONTAINS $param0\n    RETURN collect(this1 { .name }) AS var2\n}"
        );
    }

    #[test]
    fn one_relationship_takes_the_head() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let director = movie
            .field_def("director")
            .and_then(|f| f.as_relationship())
            .expect("director");
        let field = SelectionBuilder::new("director").field("name").build().expect("field");
        let (call, _) =
            project_relationship(&mut ctx, &Var::new("this"), director, &field).expect("call");
        assert!(render(&[call]).contains("RETURN head(collect(this1 { .name })) AS var2"));
    }
}
