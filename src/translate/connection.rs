//! Connection fields.
//!
//! Matches are collected into an `edges` list first so `totalCount` is taken
//! before slicing; the page is cut from that list in a nested `CALL {}`.
//! Cursors and `pageInfo` are attached afterwards by
//! [`crate::cursor::shape_connection`] from the same window.

use crate::cursor::PageWindow;
use crate::cypher::{
    Clause, Expr, Imports, NodePattern, Pattern, Projection, ProjectionItem, Var,
};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{
    AuthOperation, EntityDef, FieldSource, PropertiesDef, RelationshipDef, Schema, TypeTarget,
};

use super::context::TranslationContext;
use super::hop_pattern;
use super::polymorphic::{member_property, select_members};
use super::predicate::target_source;
use super::projection::{project_entity, project_properties};
use super::scope::{filter_clauses, ScopeFilter, Source};
use super::sort::{connection_paging, root_connection_paging, Paging, SortSide};

/// The parts of a connection selection the statement has to produce.
#[derive(Default)]
struct EdgeSelection<'f> {
    edges: bool,
    node: Option<&'f SelectionField>,
    properties: Option<&'f SelectionField>,
}

impl<'f> EdgeSelection<'f> {
    fn of(field: &'f SelectionField) -> Self {
        match field.child("edges") {
            Some(edges) => Self {
                edges: true,
                node: edges.child("node"),
                properties: edges.child("properties"),
            },
            None => Self::default(),
        }
    }
}

fn window(field: &SelectionField) -> TranslateResult<PageWindow> {
    PageWindow::from_arguments(field.raw_argument("first"), field.raw_argument("after"))
}

fn edge_properties<'a>(schema: &'a Schema, relationship: &RelationshipDef) -> Option<&'a PropertiesDef> {
    relationship
        .properties
        .as_deref()
        .and_then(|name| schema.properties(name))
}

fn properties_entry(
    relationship: Option<&RelationshipDef>,
    properties: Option<&PropertiesDef>,
    edge: Option<&Var>,
    selection: &SelectionField,
) -> TranslateResult<(String, Expr)> {
    match (properties, edge) {
        (Some(properties), Some(edge)) => Ok((
            "properties".to_owned(),
            project_properties(properties, edge, selection)?,
        )),
        _ => {
            let owner = relationship
                .map(|r| format!("{}Relationship", r.field))
                .unwrap_or_else(|| "Edge".to_owned());
            Err(TranslateError::unknown_field(owner, "properties"))
        }
    }
}

/// `WITH collect({ node: n, relationship: r }) AS edges`
fn collect_edges(node: &Var, edge: Option<&Var>, edges: &Var) -> Clause {
    let mut entries = vec![("node".to_owned(), node.expr())];
    if let Some(edge) = edge {
        entries.push(("relationship".to_owned(), edge.expr()));
    }
    Clause::With {
        projection: Projection::single(Expr::collect(Expr::Map(entries), false), edges),
        predicate: None,
    }
}

/// `WITH edges, size(edges) AS total`
fn count_edges(edges: &Var, total: &Var) -> Clause {
    Clause::With {
        projection: Projection::items(vec![
            ProjectionItem::var(edges),
            ProjectionItem::aliased(Expr::call("size", vec![edges.expr()]), total),
        ]),
        predicate: None,
    }
}

fn connection_result(page: Option<Var>, total: &Var) -> Expr {
    let mut entries = Vec::with_capacity(2);
    if let Some(page) = page {
        entries.push(("edges".to_owned(), page.expr()));
    }
    entries.push(("totalCount".to_owned(), total.expr()));
    Expr::Map(entries)
}

/// Unwinds `edges`, rebinds node and relationship, orders, slices and
/// projects the page.
#[allow(clippy::too_many_arguments)]
fn page_call<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    node: &Var,
    relationship: Option<(&Var, &'a RelationshipDef)>,
    selection: &EdgeSelection<'_>,
    paging: &Paging<'a>,
    edges: &Var,
) -> TranslateResult<Option<(Clause, Var)>> {
    if !selection.edges {
        return Ok(None);
    }
    let edge_var = ctx.fresh_var();
    let mut body = vec![Clause::Unwind {
        list: edges.expr(),
        var: edge_var.clone(),
    }];
    let mut rebound = vec![ProjectionItem::aliased(edge_var.expr().property("node"), node)];
    if let Some((rel_var, _)) = relationship {
        rebound.push(ProjectionItem::aliased(
            edge_var.expr().property("relationship"),
            rel_var,
        ));
    }
    body.push(Clause::With {
        projection: Projection::items(rebound),
        predicate: None,
    });
    body.extend(paging.clause(|_, key| match (key.side, relationship) {
        (SortSide::Edge, Some((rel_var, _))) => rel_var.prop(key.field.db_property()),
        _ => node.prop(key.field.db_property()),
    }));

    let mut entries = Vec::new();
    if let Some(node_selection) = selection.node {
        let projected = project_entity(ctx, entity, node, node_selection, false)?;
        body.extend(projected.calls);
        entries.push(("node".to_owned(), projected.expr));
    }
    if let Some(properties_selection) = selection.properties {
        let properties = relationship.and_then(|(_, rel)| edge_properties(ctx.schema, rel));
        entries.push(properties_entry(
            relationship.map(|(_, rel)| rel),
            properties,
            relationship.map(|(var, _)| var),
            properties_selection,
        )?);
    }
    let page = ctx.fresh_var();
    body.push(Clause::return_single(
        Expr::collect(Expr::Map(entries), false),
        &page,
    ));
    Ok(Some((Clause::call(Imports::var(edges), body), page)))
}

/// Root `<plural>Connection` field.
pub(crate) fn root_connection<'a>(
    ctx: &mut TranslationContext<'a>,
    target: &TypeTarget,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let schema = ctx.schema;
    let entity = match target {
        TypeTarget::Entity(name) => {
            schema
                .entity(name)
                .ok_or_else(|| TranslateError::UnknownRootField {
                    name: field.name.clone(),
                })?
        }
        other => {
            return Err(TranslateError::malformed(format!(
                "root connections over '{}' are not supported",
                other.name()
            )))
        }
    };
    let window = window(field)?;
    let selection = EdgeSelection::of(field);
    let node = ctx.root_var();
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &node,
        Source::Match(Pattern::node(NodePattern::new(&node, &entity.labels))),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: field.argument("where"),
            selection: selection.node,
            ..ScopeFilter::default()
        },
    )?;
    let paging = root_connection_paging(
        ctx,
        Some(entity as &dyn FieldSource),
        entity.limit.as_ref(),
        &entity.default_sort,
        field,
        window.start,
        window.first,
    )?;
    let edges = ctx.fresh_var();
    let total = ctx.fresh_var();
    clauses.push(collect_edges(&node, None, &edges));
    clauses.push(count_edges(&edges, &total));
    let page = match page_call(ctx, entity, &node, None, &selection, &paging, &edges)? {
        Some((call, page)) => {
            clauses.push(call);
            Some(page)
        }
        None => None,
    };
    clauses.push(Clause::return_single(connection_result(page, &total), &node));
    Ok(clauses)
}

/// `<rel>Connection` field on a projected node.
pub(crate) fn nested_connection<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let schema = ctx.schema;
    let target = match &relationship.target {
        TypeTarget::Entity(name) => schema
            .entity(name)
            .ok_or_else(|| TranslateError::unknown_field(&relationship.source, &relationship.field))?,
        _ => return polymorphic_connection(ctx, parent, relationship, field),
    };
    let window = window(field)?;
    let selection = EdgeSelection::of(field);
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
            connection: true,
            edge: Some((&edge, relationship)),
            selection: selection.node,
            ..ScopeFilter::default()
        },
    )?;
    let properties = edge_properties(schema, relationship);
    let paging = connection_paging(
        ctx,
        target,
        properties.map(|p| p as &dyn FieldSource),
        target.limit.as_ref(),
        &target.default_sort,
        field,
        window.start,
        window.first,
    )?;
    let edges = ctx.fresh_var();
    let total = ctx.fresh_var();
    body.push(collect_edges(&node, Some(&edge), &edges));
    body.push(count_edges(&edges, &total));
    let page = match page_call(
        ctx,
        target,
        &node,
        Some((&edge, relationship)),
        &selection,
        &paging,
        &edges,
    )? {
        Some((call, page)) => {
            body.push(call);
            Some(page)
        }
        None => None,
    };
    let out = ctx.fresh_var();
    body.push(Clause::return_single(connection_result(page, &total), &out));
    Ok((Clause::call(Imports::var(parent), body), out))
}

/// Connection over an interface or union target. Each member branch returns
/// its finished edge map plus the sort columns; ordering happens once over
/// the union before the edges are collected.
fn polymorphic_connection<'a>(
    ctx: &mut TranslationContext<'a>,
    parent: &Var,
    relationship: &'a RelationshipDef,
    field: &SelectionField,
) -> TranslateResult<(Clause, Var)> {
    let schema = ctx.schema;
    let window = window(field)?;
    let selection = EdgeSelection::of(field);
    let properties = edge_properties(schema, relationship);
    let paging = match target_source(schema, &relationship.target) {
        Some(owner) => connection_paging(
            ctx,
            owner,
            properties.map(|p| p as &dyn FieldSource),
            None,
            &[],
            field,
            window.start,
            window.first,
        )?,
        None => root_connection_paging(ctx, None, None, &[], field, window.start, window.first)?,
    };
    let sort_vars: Vec<Var> = paging.keys.iter().map(|_| ctx.fresh_var()).collect();
    let edge_out = ctx.fresh_var();

    let mut branches = Vec::new();
    for branch in select_members(ctx, &relationship.target, field.argument("where"), true)? {
        let edge = ctx.fresh_node();
        let node = ctx.fresh_node();
        let entity = branch.entity;
        let mut body = filter_clauses(
            ctx,
            entity,
            &node,
            Source::Match(hop_pattern(parent, relationship, Some(&edge), &node, &entity.labels)),
            &[AuthOperation::Read],
            ScopeFilter {
                where_value: branch.where_value,
                connection: true,
                edge: Some((&edge, relationship)),
                extra: branch.extra,
                selection: selection.node,
            },
        )?;
        let mut entries = Vec::new();
        if let Some(node_selection) = selection.node {
            let projected = project_entity(ctx, entity, &node, node_selection, true)?;
            body.extend(projected.calls);
            entries.push(("node".to_owned(), projected.expr));
        }
        if let Some(properties_selection) = selection.properties {
            entries.push(properties_entry(
                Some(relationship),
                properties,
                Some(&edge),
                properties_selection,
            )?);
        }
        let mut items = vec![ProjectionItem::aliased(Expr::Map(entries), &edge_out)];
        for (key, var) in paging.keys.iter().zip(&sort_vars) {
            let column = match key.side {
                SortSide::Node => node.prop(member_property(entity, key)),
                SortSide::Edge => edge.prop(key.field.db_property()),
            };
            items.push(ProjectionItem::aliased(column, var));
        }
        body.push(Clause::Return(Projection::items(items)));
        branches.push(body);
    }

    let mut body = vec![Clause::Union {
        imports: Imports::var(parent),
        branches,
    }];
    body.extend(paging.order_clause(|idx, _| sort_vars[idx].expr()));
    let edges = ctx.fresh_var();
    let total = ctx.fresh_var();
    body.push(Clause::With {
        projection: Projection::single(Expr::collect(edge_out.expr(), false), &edges),
        predicate: None,
    });
    body.push(count_edges(&edges, &total));
    let page = if selection.edges {
        let edge_var = ctx.fresh_var();
        let page = ctx.fresh_var();
        let mut slice = vec![Clause::Unwind {
            list: edges.expr(),
            var: edge_var.clone(),
        }];
        slice.extend(paging.slice_clause());
        slice.push(Clause::return_single(
            Expr::collect(edge_var.expr(), false),
            &page,
        ));
        body.push(Clause::call(Imports::var(&edges), slice));
        Some(page)
    } else {
        None
    };
    let out = ctx.fresh_var();
    body.push(Clause::return_single(connection_result(page, &total), &out));
    Ok((Clause::call(Imports::var(parent), body), out))
}
