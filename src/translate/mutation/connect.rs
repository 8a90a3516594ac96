//! Nested `connect` and `connectOrCreate`.

use crate::cypher::{Clause, Expr, NodePattern, Pattern, Var};
use crate::error::TranslateResult;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef};
use crate::value::Value;

use super::input::{NodeInput, RelationOp, ScalarWrite};
use super::stage::{Stage, StageTracker};
use super::{
    after_validation, after_write, cardinality_guards, edge_pattern, generated_items,
    relation_calls, relationship_properties, scope_guard, supplied, write_items, write_value,
    WriteEvent,
};
use crate::translate::auth::authenticate;
use crate::translate::context::TranslationContext;
use crate::translate::scope::{filter_clauses, ScopeFilter, Source};

/// `MATCH` the target by `filter`, `MERGE` the edge, then nested connects.
pub(super) fn connect<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    member: &'a EntityDef,
    filter: Option<&Value>,
    edge_writes: &[ScalarWrite<'a>],
    nested: &[RelationOp<'a, '_>],
) -> TranslateResult<Vec<Clause>> {
    let mut tracker = StageTracker::new(&member.name);
    let node = ctx.fresh_node();
    let mut body = filter_clauses(
        ctx,
        member,
        &node,
        Source::Match(Pattern::node(NodePattern::new(&node, &member.labels))),
        &[AuthOperation::Connect],
        ScopeFilter {
            where_value: filter,
            ..ScopeFilter::default()
        },
    )?;

    let edge = ctx.fresh_node();
    let properties = relationship_properties(ctx, relationship);
    let on_create = match properties {
        Some(properties) => generated_items(
            ctx,
            &edge,
            &properties.fields,
            &supplied(edge_writes),
            WriteEvent::Create,
        ),
        None => Vec::new(),
    };
    body.push(Clause::Merge {
        pattern: edge_pattern(parent, relationship, &edge, &node),
        on_create,
        on_match: Vec::new(),
    });
    let items = write_items(ctx, &edge, edge_writes);
    if !items.is_empty() {
        body.push(Clause::Set(items));
    }
    tracker.advance(Stage::NodeMaterialized);

    if !nested.is_empty() {
        after_write(&mut body);
        body.extend(relation_calls(ctx, &node, nested)?);
    }
    tracker.advance(Stage::RelationshipsConnected);

    let checks = cardinality_guards(ctx, member, &node, nested, false);
    let mut validations = vec![after_validation(
        ctx,
        member,
        &member.authorization,
        &node,
        &[AuthOperation::Connect, AuthOperation::CreateRelationship],
        &[],
    )?];
    if let Some(properties) = properties {
        validations.push(after_validation(
            ctx,
            properties,
            &properties.authorization,
            &edge,
            &[AuthOperation::CreateRelationship],
            edge_writes,
        )?);
    }
    body.extend(scope_guard(ctx, checks, Expr::and(validations)));
    tracker.advance(Stage::Validated);
    Ok(body)
}

/// `MERGE` the target on its unique key, creating it with `input` when
/// missing, then `MERGE` the edge.
pub(super) fn connect_or_create<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    key: &[ScalarWrite<'a>],
    input: &NodeInput<'a, '_>,
    edge_writes: &[ScalarWrite<'a>],
) -> TranslateResult<Vec<Clause>> {
    let member = input.entity;
    authenticate(ctx, member, AuthOperation::Connect)?;
    authenticate(ctx, member, AuthOperation::Create)?;
    let mut tracker = StageTracker::new(&member.name);

    let node = ctx.fresh_node();
    let mut pattern = NodePattern::new(&node, &member.labels);
    for write in key {
        let value = write_value(ctx, &node, write);
        pattern
            .properties
            .push((write.field.db_property().to_owned(), value));
    }
    let mut on_create = write_items(ctx, &node, &input.writes);
    let mut written = supplied(&input.writes);
    written.extend(supplied(key));
    on_create.extend(generated_items(
        ctx,
        &node,
        &member.fields,
        &written,
        WriteEvent::Create,
    ));
    let mut body = vec![Clause::Merge {
        pattern: Pattern::node(pattern),
        on_create,
        on_match: Vec::new(),
    }];
    tracker.advance(Stage::NodeMaterialized);

    let edge = ctx.fresh_node();
    let properties = relationship_properties(ctx, relationship);
    let mut edge_items = write_items(ctx, &edge, edge_writes);
    if let Some(properties) = properties {
        edge_items.extend(generated_items(
            ctx,
            &edge,
            &properties.fields,
            &supplied(edge_writes),
            WriteEvent::Create,
        ));
    }
    body.push(Clause::Merge {
        pattern: edge_pattern(parent, relationship, &edge, &node),
        on_create: edge_items,
        on_match: Vec::new(),
    });
    tracker.advance(Stage::RelationshipsConnected);

    let mut validations = vec![after_validation(
        ctx,
        member,
        &member.authorization,
        &node,
        &[AuthOperation::Connect, AuthOperation::Create],
        &input.writes,
    )?];
    if let Some(properties) = properties {
        validations.push(after_validation(
            ctx,
            properties,
            &properties.authorization,
            &edge,
            &[AuthOperation::CreateRelationship],
            edge_writes,
        )?);
    }
    body.extend(scope_guard(ctx, Vec::new(), Expr::and(validations)));
    tracker.advance(Stage::Validated);
    Ok(body)
}
