//! Interface and union targets: one `UNION` branch per concrete member.
//!
//! Branches share one output column. Sort keys are carried out of each
//! branch as extra columns, so ordering and slicing happen once over the
//! unioned rows.

use crate::cypher::{Clause, Expr, Imports, NodePattern, Pattern, Projection, ProjectionItem, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef, TypeTarget};
use crate::value::Value;

use super::context::TranslationContext;
use super::hop_pattern;
use super::predicate::{target_source, top_level_typenames, union_where};
use super::projection::project_entity;
use super::scope::{filter_clauses, ScopeFilter, Source};
use super::sort::{list_paging, Paging, SortKey};

/// One concrete member selected for emission.
pub(crate) struct Branch<'a, 'v> {
    pub(crate) entity: &'a EntityDef,
    pub(crate) where_value: Option<&'v Value>,
    /// Set when every member was pruned; keeps the statement well formed.
    pub(crate) extra: Option<Expr>,
}

/// Members of `target` worth emitting for `where_value`.
///
/// Unions take member-keyed filters and emit only the named members.
/// Interfaces prune by a top-level `typename_IN`; for connections that key
/// sits under `node`.
pub(crate) fn select_members<'a, 'v>(
    ctx: &TranslationContext<'a>,
    target: &TypeTarget,
    where_value: Option<&'v Value>,
    connection: bool,
) -> TranslateResult<Vec<Branch<'a, 'v>>> {
    let schema = ctx.schema;
    let members = schema.members(target);
    let mut branches = Vec::new();
    match target {
        TypeTarget::Union(name) => {
            let keyed = union_where(ctx, name, where_value)?;
            if keyed.is_empty() {
                branches.extend(members.into_iter().map(|entity| Branch {
                    entity,
                    where_value: None,
                    extra: None,
                }));
            } else {
                for entity in members {
                    if let Some((_, inner)) = keyed.iter().find(|(member, _)| *member == entity.name) {
                        branches.push(Branch {
                            entity,
                            where_value: Some(*inner),
                            extra: None,
                        });
                    }
                }
            }
        }
        TypeTarget::Interface(name) => {
            let implementers: Vec<String> = members.iter().map(|e| e.name.clone()).collect();
            let typename_source = if connection {
                where_value
                    .and_then(Value::as_map)
                    .and_then(|m| m.get("node"))
            } else {
                where_value
            };
            let allowed = top_level_typenames(name, &implementers, typename_source)?;
            for entity in &members {
                if allowed.as_ref().map_or(true, |names| names.contains(&entity.name)) {
                    branches.push(Branch {
                        entity,
                        where_value,
                        extra: None,
                    });
                }
            }
            if branches.is_empty() {
                if let Some(first) = members.first() {
                    branches.push(Branch {
                        entity: first,
                        where_value: None,
                        extra: Some(Expr::Bool(false)),
                    });
                }
            }
        }
        TypeTarget::Entity(_) => branches.extend(members.into_iter().map(|entity| Branch {
            entity,
            where_value,
            extra: None,
        })),
    }
    if branches.is_empty() {
        return Err(TranslateError::UnknownConcreteType {
            abstract_type: target.name().to_owned(),
            name: String::new(),
        });
    }
    Ok(branches)
}

/// Sort column of `key` on a member, honoring the member's own alias.
pub(crate) fn member_property(entity: &EntityDef, key: &SortKey<'_>) -> String {
    entity
        .field_def(&key.field.name)
        .map(|f| f.db_property().to_owned())
        .unwrap_or_else(|| key.field.db_property().to_owned())
}

/// Paging over a polymorphic list, sorted on fields of the interface.
fn paging<'a>(
    ctx: &mut TranslationContext<'a>,
    target: &TypeTarget,
    field: &SelectionField,
) -> TranslateResult<Paging<'a>> {
    let owner = target_source(ctx.schema, target);
    list_paging(ctx, owner, None, &[], field)
}

/// Body of one read branch: bind, filter, project, and return the
/// projection as `out` with the sort columns beside it.
fn read_branch<'a>(
    ctx: &mut TranslationContext<'a>,
    branch: Branch<'a, '_>,
    bind: impl FnOnce(&mut TranslationContext<'a>, &Var) -> (Pattern, Option<(Var, &'a RelationshipDef)>),
    field: &SelectionField,
    paging: &Paging<'a>,
    out: &Var,
    sort_vars: &[Var],
) -> TranslateResult<Vec<Clause>> {
    let node_slot = ctx.fresh_node();
    let (pattern, edge) = bind(ctx, &node_slot);
    let mut body = filter_clauses(
        ctx,
        branch.entity,
        &node_slot,
        Source::Match(pattern),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: branch.where_value,
            edge: edge.as_ref().map(|(var, rel)| (var, *rel)),
            extra: branch.extra,
            selection: Some(field),
            ..ScopeFilter::default()
        },
    )?;
    let projected = project_entity(ctx, branch.entity, &node_slot, field, true)?;
    body.extend(projected.calls);
    let mut items = vec![ProjectionItem::aliased(projected.expr, out)];
    for (key, var) in paging.keys.iter().zip(sort_vars) {
        items.push(ProjectionItem::aliased(
            node_slot.prop(member_property(branch.entity, key)),
            var,
        ));
    }
    body.push(Clause::Return(Projection::items(items)));
    Ok(body)
}

/// Root read of an interface or union (`productions`, `searchResults`).
pub(crate) fn root_read<'a>(
    ctx: &mut TranslationContext<'a>,
    target: &TypeTarget,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let paging = paging(ctx, target, field)?;
    let out = ctx.root_var();
    let sort_vars: Vec<Var> = paging.keys.iter().map(|_| ctx.fresh_var()).collect();
    let mut branches = Vec::new();
    for branch in select_members(ctx, target, field.argument("where"), false)? {
        let labels = branch.entity.labels.clone();
        branches.push(read_branch(
            ctx,
            branch,
            |_, node| (Pattern::node(NodePattern::new(node, &labels)), None),
            field,
            &paging,
            &out,
            &sort_vars,
        )?);
    }
    let mut clauses = vec![Clause::Union {
        imports: Imports::None,
        branches,
    }];
    clauses.extend(paging.clause(|idx, _| sort_vars[idx].expr()));
    clauses.push(Clause::return_single(out.expr(), &out));
    Ok(clauses)
}

/// Relationship field whose target is an interface or union.
pub(crate) fn project_relationship<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let paging = if relationship.is_one() {
        Paging::none()
    } else {
        paging(ctx, &relationship.target, field)?
    };
    let out = ctx.fresh_var();
    let sort_vars: Vec<Var> = paging.keys.iter().map(|_| ctx.fresh_var()).collect();
    let mut branches = Vec::new();
    for branch in select_members(ctx, &relationship.target, field.argument("where"), false)? {
        let labels = branch.entity.labels.clone();
        branches.push(read_branch(
            ctx,
            branch,
            |ctx, node| {
                let edge = ctx.fresh_node();
                let pattern = hop_pattern(parent, relationship, Some(&edge), node, &labels);
                (pattern, Some((edge, relationship)))
            },
            field,
            &paging,
            &out,
            &sort_vars,
        )?);
    }
    let mut body = vec![Clause::Union {
        imports: Imports::var(parent),
        branches,
    }];
    body.extend(paging.clause(|idx, _| sort_vars[idx].expr()));
    body.push(Clause::return_single(
        Expr::collect(out.expr(), relationship.is_one()),
        &out,
    ));
    Ok((Clause::call(Imports::var(parent), body), out))
}
