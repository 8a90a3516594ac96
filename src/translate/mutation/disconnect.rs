//! Nested `disconnect`.

use crate::cypher::{Clause, Var};
use crate::error::TranslateResult;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef};
use crate::value::Value;

use super::input::RelationOp;
use super::stage::{Stage, StageTracker};
use super::{after_validation, cardinality_guards, relation_calls, scope_guard};
use crate::translate::context::TranslationContext;
use crate::translate::hop_pattern;
use crate::translate::scope::{filter_clauses, ScopeFilter, Source};

/// Match the connected node through the edge, run nested disconnects, then
/// `DELETE` the edge alone.
pub(super) fn disconnect<'a>(
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
        &[AuthOperation::Disconnect],
        ScopeFilter {
            where_value: filter,
            connection: true,
            edge: Some((&edge, relationship)),
            ..ScopeFilter::default()
        },
    )?;
    tracker.advance(Stage::NodeMaterialized);

    body.extend(relation_calls(ctx, &node, nested)?);
    body.push(Clause::Delete {
        detach: false,
        targets: vec![edge.expr()],
    });
    tracker.advance(Stage::RelationshipsConnected);

    let checks = cardinality_guards(ctx, member, &node, nested, false);
    let validation = after_validation(
        ctx,
        member,
        &member.authorization,
        &node,
        &[AuthOperation::Disconnect],
        &[],
    )?;
    body.extend(scope_guard(ctx, checks, validation));
    tracker.advance(Stage::Validated);
    Ok(body)
}
