//! Filtering of one bound node scope: user filter, FILTER rules and
//! before-validation guards combined into a single `WHERE`.

use crate::cypher::{Clause, Expr, Pattern, Var};
use crate::error::TranslateResult;
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, RelationshipDef, ValidationPhase};
use crate::value::Value;

use super::auth::{authenticate, field_read_rules, filter_rules, guard, validate_rules};
use super::context::TranslationContext;
use super::predicate::{build_filter, connection_filter, FilterMode};

/// How the scope's node gets bound.
pub(crate) enum Source {
    /// Bound by a fresh `MATCH`.
    Match(Pattern),
    /// Already bound by an earlier clause.
    Bound,
}

/// Inputs of one scope filter.
#[derive(Default)]
pub(crate) struct ScopeFilter<'a, 'f> {
    /// `where` argument.
    pub(crate) where_value: Option<&'f Value>,
    /// Whether `where_value` is connection shaped (`{ node, edge }`).
    pub(crate) connection: bool,
    /// Relationship variable of the traversal that bound the node.
    pub(crate) edge: Option<(&'f Var, &'a RelationshipDef)>,
    /// Extra conjunct, such as a label test.
    pub(crate) extra: Option<Expr>,
    /// Selection read from the node, for field-level READ rules.
    pub(crate) selection: Option<&'f SelectionField>,
}

/// Clauses that bind and filter `node` for `operations`.
pub(crate) fn filter_clauses<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    node: &Var,
    source: Source,
    operations: &[AuthOperation],
    scope: ScopeFilter<'a, '_>,
) -> TranslateResult<Vec<Clause>> {
    for operation in operations {
        authenticate(ctx, entity, *operation)?;
    }

    let filter = match (scope.connection, scope.edge) {
        (true, Some((edge, relationship))) => {
            connection_filter(ctx, relationship, entity, node, edge, scope.where_value)?
        }
        _ => build_filter(ctx, entity, node, scope.where_value, FilterMode::User)?,
    };

    let mut conjuncts = vec![filter.predicate];
    if let Some(extra) = scope.extra {
        conjuncts.push(extra);
    }
    conjuncts.push(filter_rules(ctx, entity, &entity.authorization, node, operations)?);

    let mut validations = Vec::new();
    if let Some((edge, relationship)) = scope.edge {
        let properties = relationship
            .properties
            .as_deref()
            .and_then(|name| ctx.schema.properties(name));
        if let Some(properties) = properties {
            conjuncts.push(filter_rules(
                ctx,
                properties,
                &properties.authorization,
                edge,
                operations,
            )?);
            validations.push(validate_rules(
                ctx,
                properties,
                &properties.authorization,
                edge,
                operations,
                ValidationPhase::Before,
                None,
            )?);
        }
    }

    if let Some(selection) = scope.selection {
        if operations.contains(&AuthOperation::Read) {
            let selected: Vec<&str> = selection
                .children_for(&entity.name, &entity.implements)
                .map(|child| child.name.as_str())
                .collect();
            let (field_filter, field_validation) = field_read_rules(ctx, entity, node, &selected)?;
            conjuncts.push(field_filter);
            validations.push(field_validation);
        }
    }
    validations.push(validate_rules(
        ctx,
        entity,
        &entity.authorization,
        node,
        operations,
        ValidationPhase::Before,
        None,
    )?);
    if let Some(check) = guard(ctx, Expr::and(validations)) {
        conjuncts.push(check);
    }

    let predicate = Expr::and(conjuncts);
    let mut clauses = Vec::new();
    match source {
        Source::Match(pattern) if filter.preludes.is_empty() => {
            clauses.push(Clause::matching(pattern, predicate));
            return Ok(clauses);
        }
        Source::Match(pattern) => clauses.push(Clause::matching(pattern, Expr::Bool(true))),
        Source::Bound => {}
    }
    clauses.extend(filter.preludes);
    if !predicate.is_true() {
        clauses.push(Clause::filter(predicate));
    }
    Ok(clauses)
}
