//! `create<Plural>` and nested `create` operations.

use tracing::debug;

use crate::cypher::{Clause, Expr, Imports, NodePattern, Pattern, Projection, ProjectionItem, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef};

use super::input::{items, InputParser, NodeInput, ScalarWrite};
use super::stage::{Stage, StageTracker};
use super::{
    after_validation, after_write, cardinality_guards, edge_pattern, generated_items,
    relation_calls, relationship_properties, response_selection, scope_guard, supplied,
    write_items, WriteEvent,
};
use crate::translate::auth::authenticate;
use crate::translate::context::TranslationContext;
use crate::translate::projection::project_entity;

/// The parent end of a nested create.
struct Link<'r, 'a> {
    parent: &'r Var,
    relationship: &'a RelationshipDef,
    edge: &'r [ScalarWrite<'a>],
}

/// `CREATE`, `SET`, the parent edge, nested operations and the closing guard
/// for one node bound to `node`.
fn create_node_clauses<'a>(
    ctx: &mut TranslationContext<'a>,
    node: &Var,
    input: &NodeInput<'a, '_>,
    link: Option<Link<'_, 'a>>,
    tracker: &mut StageTracker<'_>,
) -> TranslateResult<Vec<Clause>> {
    let entity = input.entity;
    authenticate(ctx, entity, AuthOperation::Create)?;
    let mut clauses = vec![Clause::Create {
        patterns: vec![Pattern::node(NodePattern::new(node, &entity.labels))],
    }];
    let mut items = write_items(ctx, node, &input.writes);
    items.extend(generated_items(
        ctx,
        node,
        &entity.fields,
        &supplied(&input.writes),
        WriteEvent::Create,
    ));
    if !items.is_empty() {
        clauses.push(Clause::Set(items));
    }
    let mut validations = vec![after_validation(
        ctx,
        entity,
        &entity.authorization,
        node,
        &[AuthOperation::Create],
        &input.writes,
    )?];

    if let Some(link) = link {
        let edge = ctx.fresh_node();
        clauses.push(Clause::Create {
            patterns: vec![edge_pattern(link.parent, link.relationship, &edge, node)],
        });
        if let Some(properties) = relationship_properties(ctx, link.relationship) {
            let mut items = write_items(ctx, &edge, link.edge);
            items.extend(generated_items(
                ctx,
                &edge,
                &properties.fields,
                &supplied(link.edge),
                WriteEvent::Create,
            ));
            if !items.is_empty() {
                clauses.push(Clause::Set(items));
            }
            validations.push(after_validation(
                ctx,
                properties,
                &properties.authorization,
                &edge,
                &[AuthOperation::CreateRelationship],
                link.edge,
            )?);
        }
    }
    tracker.advance(Stage::NodeMaterialized);

    if !input.relations.is_empty() {
        after_write(&mut clauses);
        clauses.extend(relation_calls(ctx, node, &input.relations)?);
    }
    tracker.advance(Stage::RelationshipsConnected);

    let checks = cardinality_guards(ctx, entity, node, &input.relations, true);
    clauses.extend(scope_guard(ctx, checks, Expr::and(validations)));
    tracker.advance(Stage::Validated);
    Ok(clauses)
}

/// Body of a nested `create` under `parent`.
pub(super) fn nested_create<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    input: &NodeInput<'a, '_>,
    edge: &[ScalarWrite<'a>],
) -> TranslateResult<Vec<Clause>> {
    let node = ctx.fresh_node();
    let mut tracker = StageTracker::new(&input.entity.name);
    create_node_clauses(
        ctx,
        &node,
        input,
        Some(Link {
            parent,
            relationship,
            edge,
        }),
        &mut tracker,
    )
}

/// One uncorrelated `CALL {}` per input element, then the projections and
/// `RETURN [..] AS data`.
pub(crate) fn translate_create<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let raw = field
        .argument("input")
        .ok_or_else(|| TranslateError::invalid_argument("input", "missing"))?;
    let inputs = {
        let parser = InputParser::new(ctx);
        items(raw)
            .iter()
            .map(|value| parser.create_node(entity, value, 1, None))
            .collect::<TranslateResult<Vec<_>>>()?
    };
    debug!(entity = %entity.name, nodes = inputs.len(), "translate.mutation.create");

    let mut clauses = Vec::with_capacity(inputs.len() + 1);
    let mut created = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let node = ctx.fresh_node();
        let mut tracker = StageTracker::new(&entity.name);
        let mut body = create_node_clauses(ctx, &node, input, None, &mut tracker)?;
        body.push(Clause::Return(Projection::items(vec![ProjectionItem::var(&node)])));
        clauses.push(Clause::call(Imports::None, body));
        created.push((node, tracker));
    }

    let empty = SelectionField::new(&field.name);
    let response = response_selection(field, &empty);
    let mut projections = Vec::with_capacity(created.len());
    for (node, mut tracker) in created {
        let projected = project_entity(ctx, entity, &node, response, false)?;
        clauses.extend(projected.calls);
        projections.push(projected.expr);
        tracker.advance(Stage::Projected);
    }
    clauses.push(Clause::return_single(Expr::List(projections), &Var::new("data")));
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{
        Direction, FieldDef, PropertiesDef, ScalarType, Schema, SchemaBuilder,
    };
    use crate::value::Value;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("id", ScalarType::Id).autogenerate_id())
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(
                        FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming)
                            .properties("ActedIn"),
                    )
                    .field(
                        FieldDef::relationship("director", "Actor", "DIRECTED", Direction::Incoming)
                            .one()
                            .required(),
                    ),
            )
            .entity(EntityDef::new("Actor").field(FieldDef::scalar("name", ScalarType::String)))
            .properties(PropertiesDef::new("ActedIn").field(FieldDef::scalar("role", ScalarType::String)))
            .build()
            .expect("schema")
    }

    #[test]
    fn create_with_nested_create_and_connect() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("createMovies")
            .arg(
                "input",
                json!([{
                    "title": "The Matrix",
                    "actors": { "create": [{ "node": { "name": "Keanu" }, "edge": { "role": "Neo" } }] },
                    "director": { "connect": [{ "where": { "node": { "name": "Lana" } } }] }
                }]),
            )
            .child(SelectionBuilder::new("movies").field("title"))
            .child(SelectionBuilder::new("info").field("nodesCreated"))
            .build()
            .expect("field");
        let clauses = translate_create(&mut ctx, movie, &field).expect("clauses");
        assert_eq!(
            render(&clauses),
            [
                "CALL {",
                "    CREATE (this0:Movie)",
                "    SET this0.title = $param0, this0.id = randomUUID()",
                "    WITH *",
                "    CALL {",
                "        WITH this0",
                "        CREATE (this1:Actor)",
                "        SET this1.name = $param1",
                "        CREATE (this0)<-[this2:ACTED_IN]-(this1)",
                "        SET this2.role = $param2",
                "        RETURN count(*) AS var3",
                "    }",
                "    CALL {",
                "        WITH this0",
                "        MATCH (this4:Actor)",
                "        WHERE this4.name = $param3",
                "        MERGE (this0)<-[this5:DIRECTED]-(this4)",
                "        RETURN count(*) AS var6",
                "    }",
                "    WITH *",
                "    WHERE apoc.util.validatePredicate(NOT (COUNT { MATCH (this0)<-[:DIRECTED]-(:Actor) } = 1), \"ConstraintViolation: Movie.director must be connected exactly once\", [0])",
                "    RETURN this0",
                "}",
                "RETURN [this0 { .title }] AS data",
            ]
            .join("\n")
        );
        let statement = ctx.finish(&clauses).expect("finish");
        assert_eq!(statement.params["param2"], Value::String("Neo".into()));
    }

    #[test]
    fn created_node_must_reach_required_relationships() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("createMovies")
            .arg("input", json!({ "title": "Heat" }))
            .build()
            .expect("field");
        let err = translate_create(&mut ctx, movie, &field).unwrap_err();
        assert_eq!(err.code(), "ConstraintViolation");
    }
}
