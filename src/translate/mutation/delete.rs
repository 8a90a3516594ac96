//! `delete<Plural>` and nested `delete`.

use tracing::debug;

use crate::cypher::{Clause, NodePattern, Pattern, Projection, ProjectionItem, Var};
use crate::error::TranslateResult;
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef};
use crate::value::Value;

use super::input::{InputParser, RelationOp};
use super::stage::{Stage, StageTracker};
use super::{after_write, relation_calls};
use crate::translate::context::TranslationContext;
use crate::translate::hop_pattern;
use crate::translate::scope::{filter_clauses, ScopeFilter, Source};

/// `WITH DISTINCT node` then `DETACH DELETE node`; duplicates from the match
/// would otherwise delete the same node twice.
fn detach_delete(node: &Var) -> [Clause; 2] {
    [
        Clause::With {
            projection: Projection {
                distinct: true,
                ..Projection::items(vec![ProjectionItem::var(node)])
            },
            predicate: None,
        },
        Clause::Delete {
            detach: true,
            targets: vec![node.expr()],
        },
    ]
}

/// Body of a nested `delete`: nested deletes run before the node goes.
pub(super) fn nested_delete<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    member: &'a EntityDef,
    filter: Option<&Value>,
    nested: &[RelationOp<'a, '_>],
) -> TranslateResult<Vec<Clause>> {
    let mut tracker = StageTracker::new(&member.name);
    let edge = ctx.fresh_node();
    let node = ctx.fresh_node();
    let mut body = filter_clauses(
        ctx,
        member,
        &node,
        Source::Match(hop_pattern(parent, relationship, Some(&edge), &node, &member.labels)),
        &[AuthOperation::Delete],
        ScopeFilter {
            where_value: filter,
            connection: true,
            edge: Some((&edge, relationship)),
            ..ScopeFilter::default()
        },
    )?;
    tracker.advance(Stage::NodeMaterialized);
    body.extend(relation_calls(ctx, &node, nested)?);
    tracker.advance(Stage::RelationshipsConnected);
    body.extend(detach_delete(&node));
    tracker.advance(Stage::Validated);
    Ok(body)
}

/// `MATCH`, nested deletes from the `delete` argument, then
/// `DETACH DELETE this`. Nothing is returned; the response comes from the
/// driver's counters.
pub(crate) fn translate_delete<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let nested = match field.argument("delete") {
        Some(value) => InputParser::new(ctx).relation_arg(entity, "delete", value, 1)?,
        None => Vec::new(),
    };
    debug!(entity = %entity.name, nested = nested.len(), "translate.mutation.delete");

    let this = ctx.root_var();
    let mut tracker = StageTracker::new(&entity.name);
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &this,
        Source::Match(Pattern::node(NodePattern::new(&this, &entity.labels))),
        &[AuthOperation::Delete],
        ScopeFilter {
            where_value: field.argument("where"),
            ..ScopeFilter::default()
        },
    )?;
    tracker.advance(Stage::NodeMaterialized);
    if !nested.is_empty() {
        after_write(&mut clauses);
        clauses.extend(relation_calls(ctx, &this, &nested)?);
    }
    tracker.advance(Stage::RelationshipsConnected);
    clauses.extend(detach_delete(&this));
    tracker.advance(Stage::Validated);
    Ok(clauses)
}
