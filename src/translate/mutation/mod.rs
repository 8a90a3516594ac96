//! Create, update and delete translation.
//!
//! Inputs are parsed into a write tree first (see [`input`]), so malformed
//! input fails before any clause is emitted. Emission then walks the tree:
//! every nested relationship operation runs in its own `CALL {}` that ends in
//! `RETURN count(*)`, which keeps the outer row alive when a nested match
//! finds nothing.

mod connect;
mod create;
mod delete;
mod disconnect;
mod input;
mod stage;
mod update;

pub(crate) use create::translate_create;
pub(crate) use delete::translate_delete;
pub(crate) use update::translate_update;

use crate::coerce::{constructor, wrap_list, wrap_scalar};
use crate::cypher::{
    ArithOp, Clause, CompareOp, Expr, Imports, NodePattern, Pattern, RelPattern, SetItem, Var,
};
use crate::error::{CardinalityExpectation, RuntimeGuard, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{
    AutoGenerate, AuthOperation, AuthorizationRule, Direction, EntityDef, FieldDef, FieldSource,
    PropertiesDef, RelationshipDef, ScalarField, ScalarType, ValidationPhase,
};
use crate::value::Value;

use super::auth::{guard, validate_predicate, validate_rules};
use super::context::TranslationContext;
use super::membership;

use input::{OpKind, RelationOp, ScalarWrite, WriteOp};

const INFO: &str = "info";

/// Which write generated values are produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteEvent {
    Create,
    Update,
}

/// Parameter reference for `value`, wrapped in the scalar's constructor.
fn param_expr(ctx: &mut TranslationContext<'_>, scalar: &ScalarField, value: Value) -> Expr {
    let param = ctx.param(value);
    if scalar.list && constructor(&scalar.ty).is_some() {
        let element = ctx.fresh_var();
        wrap_list(&scalar.ty, param, element)
    } else if scalar.list {
        param
    } else {
        wrap_scalar(&scalar.ty, param)
    }
}

/// Right-hand side of one property write.
fn write_value(ctx: &mut TranslationContext<'_>, var: &Var, write: &ScalarWrite<'_>) -> Expr {
    let current = var.prop(write.field.db_property());
    match &write.op {
        WriteOp::Set(value) => param_expr(ctx, write.scalar, value.clone()),
        WriteOp::Arith(op, value) => {
            let operand = wrap_scalar(&write.scalar.ty, ctx.param(value.clone()));
            Expr::Arith(Box::new(current), *op, Box::new(operand))
        }
        WriteOp::Push(value) => {
            let pushed = param_expr(ctx, write.scalar, value.clone());
            Expr::Arith(Box::new(current), ArithOp::Add, Box::new(pushed))
        }
        WriteOp::Pop(count) => {
            let index = ctx.fresh_var();
            let count = ctx.param(Value::Int(*count));
            let last = Expr::Arith(
                Box::new(Expr::Arith(
                    Box::new(Expr::call("size", vec![current.clone()])),
                    ArithOp::Sub,
                    Box::new(count),
                )),
                ArithOp::Sub,
                Box::new(Expr::Int(1)),
            );
            Expr::Comprehension {
                list: Box::new(Expr::call("range", vec![Expr::Int(0), last])),
                predicate: None,
                map: Some(Box::new(Expr::Index(Box::new(current), Box::new(index.expr())))),
                var: index,
            }
        }
    }
}

fn write_items(ctx: &mut TranslationContext<'_>, var: &Var, writes: &[ScalarWrite<'_>]) -> Vec<SetItem> {
    writes
        .iter()
        .map(|write| {
            let value = write_value(ctx, var, write);
            SetItem::property(var, write.field.db_property(), value)
        })
        .collect()
}

/// `datetime()`, `date()` ... for the field's temporal type.
fn now(ty: &ScalarType) -> Expr {
    let name = if ty.is_temporal() {
        constructor(ty).unwrap_or("datetime")
    } else {
        "datetime"
    };
    Expr::call(name, Vec::new())
}

/// Store-generated ids, timestamps and defaults for fields the input left out.
fn generated_items(
    ctx: &mut TranslationContext<'_>,
    var: &Var,
    fields: &[FieldDef],
    supplied: &[&str],
    event: WriteEvent,
) -> Vec<SetItem> {
    let mut items = Vec::new();
    for field in fields {
        let Some(scalar) = field.as_scalar() else {
            continue;
        };
        if supplied.contains(&field.name.as_str()) {
            continue;
        }
        let value = match (scalar.autogenerate, event) {
            (Some(AutoGenerate::Id), WriteEvent::Create) => Some(Expr::call("randomUUID", Vec::new())),
            (Some(AutoGenerate::Timestamp { on_create: true, .. }), WriteEvent::Create)
            | (Some(AutoGenerate::Timestamp { on_update: true, .. }), WriteEvent::Update) => {
                Some(now(&scalar.ty))
            }
            (None, WriteEvent::Create) => scalar
                .default
                .clone()
                .map(|default| param_expr(ctx, scalar, default)),
            _ => None,
        };
        if let Some(value) = value {
            items.push(SetItem::property(var, field.db_property(), value));
        }
    }
    items
}

fn supplied<'w>(writes: &'w [ScalarWrite<'_>]) -> Vec<&'w str> {
    writes.iter().map(|w| w.field.name.as_str()).collect()
}

fn relationship_properties<'a>(
    ctx: &TranslationContext<'a>,
    relationship: &RelationshipDef,
) -> Option<&'a PropertiesDef> {
    let schema = ctx.schema;
    relationship
        .properties
        .as_deref()
        .and_then(|name| schema.properties(name))
}

/// Pattern used to write an edge; undirected relationships are written outgoing.
fn edge_pattern(parent: &Var, relationship: &RelationshipDef, edge: &Var, node: &Var) -> Pattern {
    let direction = match relationship.direction {
        Direction::Undirected => Direction::Outgoing,
        direction => direction,
    };
    Pattern::hop(
        NodePattern::bound(parent),
        RelPattern::new(Some(edge), &relationship.rel_type, direction),
        NodePattern::bound(node),
    )
}

/// Node-dependent rules checked once the writes are done, including the
/// field-level rules of every written field.
fn after_validation<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    rules: &'a [AuthorizationRule],
    var: &Var,
    operations: &[AuthOperation],
    writes: &[ScalarWrite<'a>],
) -> TranslateResult<Expr> {
    let mut parts = vec![validate_rules(
        ctx,
        owner,
        rules,
        var,
        operations,
        ValidationPhase::After,
        None,
    )?];
    parts.push(field_validation(ctx, owner, var, operations, writes, ValidationPhase::After)?);
    Ok(Expr::and(parts))
}

fn field_validation<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    var: &Var,
    operations: &[AuthOperation],
    writes: &[ScalarWrite<'a>],
    phase: ValidationPhase,
) -> TranslateResult<Expr> {
    let mut parts = Vec::new();
    for write in writes {
        if write.field.authorization.is_empty() {
            continue;
        }
        parts.push(validate_rules(
            ctx,
            owner,
            &write.field.authorization,
            var,
            operations,
            phase,
            Some(&write.field.name),
        )?);
    }
    Ok(Expr::and(parts))
}

/// Runtime checks that the entity's one-relationships still hold after the
/// nested operations ran. Creates check every required relationship; other
/// writes only the ones they touched.
fn cardinality_guards(
    ctx: &mut TranslationContext<'_>,
    entity: &EntityDef,
    var: &Var,
    ops: &[RelationOp<'_, '_>],
    creating: bool,
) -> Vec<Expr> {
    if !ctx.config.runtime_guards {
        return Vec::new();
    }
    let schema = ctx.schema;
    let mut guards = Vec::new();
    for rel in entity.relationships().filter(|r| r.is_one()) {
        let touched = ops.iter().any(|op| op.relationship.field == rel.field);
        if !touched && !(creating && rel.required) {
            continue;
        }
        let (expected, op) = if rel.required {
            (CardinalityExpectation::ExactlyOne, CompareOp::Eq)
        } else {
            (CardinalityExpectation::AtMostOne, CompareOp::Lte)
        };
        let (end, predicate) = if rel.is_polymorphic() {
            let other = ctx.fresh_var();
            let (labels, predicate) = membership(schema, &rel.target, &other);
            (NodePattern::new(&other, &labels), predicate)
        } else {
            let (labels, _) = membership(schema, &rel.target, var);
            (NodePattern::anonymous(&labels), Expr::Bool(true))
        };
        let pattern = Pattern::hop(
            NodePattern::bound(var),
            RelPattern::new(None, &rel.rel_type, rel.direction),
            end,
        );
        let holds = Expr::compare(Expr::count(pattern, predicate), op, Expr::Int(1));
        guards.push(validate_predicate(
            Expr::not(holds),
            &RuntimeGuard::constraint_message(&entity.name, &rel.field, expected),
        ));
    }
    guards
}

/// Single `WITH * WHERE` closing a write scope, if anything needs checking.
fn scope_guard(ctx: &TranslationContext<'_>, mut checks: Vec<Expr>, validation: Expr) -> Option<Clause> {
    checks.extend(guard(ctx, validation));
    (!checks.is_empty()).then(|| Clause::filter(Expr::and(checks)))
}

/// Writes must be followed by `WITH` before a subquery reads the row.
fn after_write(clauses: &mut Vec<Clause>) {
    if matches!(
        clauses.last(),
        Some(Clause::Create { .. } | Clause::Merge { .. } | Clause::Set(_) | Clause::Delete { .. })
    ) {
        clauses.push(Clause::with_star());
    }
}

/// One `CALL { WITH parent .. RETURN count(*) }` per nested operation, in
/// input order.
fn relation_calls<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    ops: &[RelationOp<'a, '_>],
) -> TranslateResult<Vec<Clause>> {
    let mut calls = Vec::with_capacity(ops.len());
    for op in ops {
        let rel = op.relationship;
        let mut body = match &op.kind {
            OpKind::Create { node, edge } => create::nested_create(ctx, parent, rel, node, edge)?,
            OpKind::Connect {
                filter,
                edge,
                nested,
            } => connect::connect(ctx, parent, rel, op.member, *filter, edge, nested)?,
            OpKind::ConnectOrCreate { key, node, edge } => {
                connect::connect_or_create(ctx, parent, rel, key, node, edge)?
            }
            OpKind::Update { filter, node, edge } => {
                update::nested_update(ctx, parent, rel, op.member, *filter, node.as_ref(), edge)?
            }
            OpKind::Disconnect { filter, nested } => {
                disconnect::disconnect(ctx, parent, rel, op.member, *filter, nested)?
            }
            OpKind::Delete { filter, nested } => {
                delete::nested_delete(ctx, parent, rel, op.member, *filter, nested)?
            }
        };
        let count = ctx.fresh_var();
        body.push(Clause::return_single(Expr::CountStar, &count));
        calls.push(Clause::call(Imports::var(parent), body));
    }
    Ok(calls)
}

/// The selection projected from the mutated nodes; `info` is answered from
/// the driver's counters.
fn response_selection<'f>(field: &'f SelectionField, empty: &'f SelectionField) -> &'f SelectionField {
    field
        .selection
        .iter()
        .find(|child| child.name != INFO)
        .unwrap_or(empty)
}
