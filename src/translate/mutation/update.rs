//! `update<Plural>` and nested `update` operations.

use tracing::debug;

use crate::cypher::{Clause, Expr, NodePattern, Pattern, Var};
use crate::error::TranslateResult;
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef, ValidationPhase};
use crate::value::Value;

use super::input::{InputParser, NodeInput, ScalarWrite};
use super::stage::{Stage, StageTracker};
use super::{
    after_validation, after_write, cardinality_guards, field_validation, generated_items,
    relation_calls, relationship_properties, response_selection, scope_guard, supplied,
    write_items, WriteEvent,
};
use crate::translate::auth::guard;
use crate::translate::context::TranslationContext;
use crate::translate::hop_pattern;
use crate::translate::projection::project_entity;
use crate::translate::scope::{filter_clauses, ScopeFilter, Source};

/// Top-level relationship arguments, applied after the `update` input.
const RELATION_ARGS: [&str; 5] = ["connect", "disconnect", "create", "delete", "connectOrCreate"];

/// `MATCH`, `SET`, nested operations in input order, the relationship
/// arguments, guards, then `RETURN collect(DISTINCT this {..}) AS data`.
pub(crate) fn translate_update<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let update = field.argument("update");
    let input = {
        let parser = InputParser::new(ctx);
        let mut input = match update {
            Some(value) => parser.update_node(entity, value, 1)?,
            None => NodeInput::empty(entity),
        };
        for arg in RELATION_ARGS {
            if let Some(value) = field.argument(arg) {
                input.relations.extend(parser.relation_arg(entity, arg, value, 1)?);
            }
        }
        input
    };
    debug!(
        entity = %entity.name,
        writes = input.writes.len(),
        relations = input.relations.len(),
        "translate.mutation.update"
    );

    let this = ctx.root_var();
    let mut tracker = StageTracker::new(&entity.name);
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &this,
        Source::Match(Pattern::node(NodePattern::new(&this, &entity.labels))),
        &[AuthOperation::Update],
        ScopeFilter {
            where_value: field.argument("where"),
            ..ScopeFilter::default()
        },
    )?;
    let before = field_validation(
        ctx,
        entity,
        &this,
        &[AuthOperation::Update],
        &input.writes,
        ValidationPhase::Before,
    )?;
    clauses.extend(guard(ctx, before).map(Clause::filter));

    let mut items = write_items(ctx, &this, &input.writes);
    if update.is_some() {
        items.extend(generated_items(
            ctx,
            &this,
            &entity.fields,
            &supplied(&input.writes),
            WriteEvent::Update,
        ));
    }
    if !items.is_empty() {
        clauses.push(Clause::Set(items));
    }
    tracker.advance(Stage::NodeMaterialized);

    if !input.relations.is_empty() {
        after_write(&mut clauses);
        clauses.extend(relation_calls(ctx, &this, &input.relations)?);
    }
    tracker.advance(Stage::RelationshipsConnected);

    let checks = cardinality_guards(ctx, entity, &this, &input.relations, false);
    let validation = after_validation(
        ctx,
        entity,
        &entity.authorization,
        &this,
        &[AuthOperation::Update],
        &input.writes,
    )?;
    clauses.extend(scope_guard(ctx, checks, validation));
    tracker.advance(Stage::Validated);

    let empty = SelectionField::new(&field.name);
    let projected = project_entity(ctx, entity, &this, response_selection(field, &empty), false)?;
    if !projected.calls.is_empty() {
        after_write(&mut clauses);
        clauses.extend(projected.calls);
    }
    clauses.push(Clause::return_single(
        Expr::call_distinct("collect", projected.expr),
        &Var::new("data"),
    ));
    tracker.advance(Stage::Projected);
    Ok(clauses)
}

/// Body of a nested `update`: match through the relationship, write the node
/// and edge, recurse.
pub(super) fn nested_update<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    member: &'a EntityDef,
    filter: Option<&Value>,
    input: Option<&NodeInput<'a, '_>>,
    edge_writes: &[ScalarWrite<'a>],
) -> TranslateResult<Vec<Clause>> {
    let mut tracker = StageTracker::new(&member.name);
    let edge = ctx.fresh_node();
    let node = ctx.fresh_node();
    let mut body = filter_clauses(
        ctx,
        member,
        &node,
        Source::Match(hop_pattern(parent, relationship, Some(&edge), &node, &member.labels)),
        &[AuthOperation::Update],
        ScopeFilter {
            where_value: filter,
            connection: true,
            edge: Some((&edge, relationship)),
            ..ScopeFilter::default()
        },
    )?;

    let writes = input.map_or(&[][..], |input| &input.writes[..]);
    let relations = input.map_or(&[][..], |input| &input.relations[..]);
    let mut items = write_items(ctx, &node, writes);
    if input.is_some() {
        items.extend(generated_items(
            ctx,
            &node,
            &member.fields,
            &supplied(writes),
            WriteEvent::Update,
        ));
    }
    let properties = relationship_properties(ctx, relationship);
    items.extend(write_items(ctx, &edge, edge_writes));
    if let Some(properties) = properties.filter(|_| !edge_writes.is_empty()) {
        items.extend(generated_items(
            ctx,
            &edge,
            &properties.fields,
            &supplied(edge_writes),
            WriteEvent::Update,
        ));
    }
    if !items.is_empty() {
        body.push(Clause::Set(items));
    }
    tracker.advance(Stage::NodeMaterialized);

    if !relations.is_empty() {
        after_write(&mut body);
        body.extend(relation_calls(ctx, &node, relations)?);
    }
    tracker.advance(Stage::RelationshipsConnected);

    let checks = if input.is_some() {
        cardinality_guards(ctx, member, &node, relations, false)
    } else {
        Vec::new()
    };
    let mut validations = vec![after_validation(
        ctx,
        member,
        &member.authorization,
        &node,
        &[AuthOperation::Update],
        writes,
    )?];
    if let Some(properties) = properties {
        validations.push(after_validation(
            ctx,
            properties,
            &properties.authorization,
            &edge,
            &[AuthOperation::Update],
            edge_writes,
        )?);
    }
    body.extend(scope_guard(ctx, checks, Expr::and(validations)));
    tracker.advance(Stage::Validated);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{
        AuthorizationRule, Direction, FieldDef, PropertiesDef, ScalarType, Schema, SchemaBuilder,
    };
    use crate::value::ValueMap;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::scalar("views", ScalarType::Int))
                    .field(FieldDef::scalar("updatedAt", ScalarType::DateTime).timestamp(true, true))
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
    fn update_writes_scalars_and_nested_updates() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("updateMovies")
            .arg("where", json!({ "title": "Heat" }))
            .arg(
                "update",
                json!({
                    "views_INCREMENT": 1,
                    "actors": [{
                        "where": { "node": { "name": "Al" } },
                        "update": { "node": { "name": "Al Pacino" }, "edge": { "role": "Hanna" } }
                    }]
                }),
            )
            .child(SelectionBuilder::new("movies").field("title"))
            .build()
            .expect("field");
        let clauses = translate_update(&mut ctx, movie, &field).expect("clauses");
        assert_eq!(
            render(&clauses),
            [
                "MATCH (this:Movie)",
                "WHERE this.title = $param0",
                "SET this.views = this.views + $param1, this.updatedAt = datetime()",
                "WITH *",
                "CALL {",
                "    WITH this",
                "    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)",
                "    WHERE this1.name = $param2",
                "    SET this1.name = $param3, this0.role = $param4",
                "    RETURN count(*) AS var2",
                "}",
                "RETURN collect(DISTINCT this { .title }) AS data",
            ]
            .join("\n")
        );
    }

    #[test]
    fn disconnecting_a_required_relationship_is_guarded() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("updateMovies")
            .arg("disconnect", json!({ "director": { "where": { "node": { "name": "Ann" } } } }))
            .build()
            .expect("field");
        let clauses = translate_update(&mut ctx, movie, &field).expect("clauses");
        let text = render(&clauses);
        assert!(
            text.ends_with("}\nWITH *\nWHERE apoc.util.validatePredicate(NOT (COUNT { MATCH (this)<-[:DIRECTED]-(:Actor) } = 1), \"ConstraintViolation: Movie.director must be connected exactly once\", [0])\nRETURN collect(DISTINCT this { }) AS data"),
            "{text}"
        );
    }

    #[test]
    fn field_rules_guard_the_written_fields() {
        let schema = SchemaBuilder::new()
            .entity(
                EntityDef::new("Post").field(FieldDef::scalar("author", ScalarType::String)).field(
                    FieldDef::scalar("body", ScalarType::String).rule(
                        AuthorizationRule::validate([AuthOperation::Update])
                            .matching(json!({ "node": { "author": "$jwt.sub" } })),
                    ),
                ),
            )
            .build()
            .expect("schema");
        let config = TranslatorConfig::default();
        let mut jwt = ValueMap::new();
        jwt.insert("sub".into(), Value::from("alice"));
        let claims = Claims::authenticated(jwt);
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let post = schema.entity("Post").expect("post");
        let field = SelectionBuilder::new("updatePosts")
            .arg("update", json!({ "body": "edited" }))
            .build()
            .expect("field");
        let clauses = translate_update(&mut ctx, post, &field).expect("clauses");
        let text = render(&clauses);
        assert!(text.starts_with("MATCH (this:Post)\nWITH *\nWHERE apoc.util.validatePredicate(NOT ("), "{text}");
        assert!(text.contains("\nSET this.body = "), "{text}");
        assert_eq!(text.matches("apoc.util.validatePredicate").count(), 2, "{text}");
    }
}
