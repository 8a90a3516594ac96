//! Authorization rules woven into compiled statements.
//!
//! FILTER rules become extra predicate conjuncts. VALIDATE rules become
//! `apoc.util.validatePredicate` guards, except that rules reading only the
//! claims are decided here and never reach the database.

use tracing::debug;

use crate::cypher::{CompareOp, Expr, Var};
use crate::error::{AuthViolation, TranslateError, TranslateResult};
use crate::schema::{
    AuthOperation, AuthorizationRule, EntityDef, FieldSource, JwtComparator, JwtPredicate,
    RuleMode, RulePredicate, ValidationPhase,
};

use super::context::TranslationContext;
use super::predicate::template_predicate;

/// Fails with `Unauthenticated` when `entity` requires a token for `operation`.
pub(crate) fn authenticate(
    ctx: &TranslationContext<'_>,
    entity: &EntityDef,
    operation: AuthOperation,
) -> TranslateResult<()> {
    let covered = entity
        .authentication
        .as_ref()
        .is_some_and(|rule| rule.covers(operation));
    if covered && !ctx.claims.is_authenticated() {
        debug!(entity = %entity.name, %operation, "translate.auth.unauthenticated");
        return Err(TranslateError::Unauthenticated);
    }
    Ok(())
}

fn applies(rule: &AuthorizationRule, operations: &[AuthOperation]) -> bool {
    operations.iter().any(|op| rule.applies_to(*op))
}

/// Conjunction of the FILTER rules covering any of `operations`.
pub(crate) fn filter_rules<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    rules: &'a [AuthorizationRule],
    var: &Var,
    operations: &[AuthOperation],
) -> TranslateResult<Expr> {
    let mut parts = Vec::new();
    for rule in rules {
        if rule.mode == RuleMode::Filter && applies(rule, operations) {
            parts.push(rule_expr(ctx, owner, var, rule)?);
        }
    }
    Ok(Expr::and(parts))
}

/// Conjunction of the node-dependent VALIDATE rules for `phase`.
///
/// Claims-only rules are decided immediately; failures are recorded on the
/// context and surface together as one `Forbidden` when the statement is
/// assembled.
pub(crate) fn validate_rules<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    rules: &'a [AuthorizationRule],
    var: &Var,
    operations: &[AuthOperation],
    phase: ValidationPhase,
    field: Option<&str>,
) -> TranslateResult<Expr> {
    let mut parts = Vec::new();
    for rule in rules {
        if !rule.validates_in(phase) {
            continue;
        }
        let Some(operation) = operations.iter().copied().find(|op| rule.applies_to(*op)) else {
            continue;
        };
        let authenticated = ctx.claims.is_authenticated();
        let static_outcome = match rule.predicate() {
            None => Some(authenticated || !rule.require_authentication),
            Some(predicate) => predicate.evaluate_claims(ctx.claims).map(|satisfied| {
                satisfied && (authenticated || !rule.require_authentication)
            }),
        };
        match static_outcome {
            Some(satisfied) => {
                debug!(
                    entity = owner.type_name(),
                    field,
                    %operation,
                    satisfied,
                    "translate.auth.static_decision"
                );
                if !satisfied {
                    ctx.violation(AuthViolation {
                        entity: owner.type_name().to_owned(),
                        field: field.map(str::to_owned),
                        operation,
                    });
                }
            }
            None => {
                if rule.require_authentication && !authenticated {
                    ctx.violation(AuthViolation {
                        entity: owner.type_name().to_owned(),
                        field: field.map(str::to_owned),
                        operation,
                    });
                    continue;
                }
                if let Some(predicate) = rule.predicate() {
                    parts.push(compile_predicate(ctx, owner, var, predicate)?);
                }
            }
        }
    }
    Ok(Expr::and(parts))
}

/// Runtime guard aborting with the configured message unless `predicate` holds.
pub(crate) fn guard(ctx: &TranslationContext<'_>, predicate: Expr) -> Option<Expr> {
    if predicate.is_true() || !ctx.config.runtime_guards {
        return None;
    }
    Some(validate_predicate(Expr::not(predicate), &ctx.config.forbidden_message))
}

/// `apoc.util.validatePredicate(failure, message, [0])`
pub(crate) fn validate_predicate(failure: Expr, message: &str) -> Expr {
    Expr::call(
        "apoc.util.validatePredicate",
        vec![failure, Expr::Str(message.to_owned()), Expr::List(vec![Expr::Int(0)])],
    )
}

fn rule_expr<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    var: &Var,
    rule: &'a AuthorizationRule,
) -> TranslateResult<Expr> {
    let mut parts = Vec::new();
    if rule.require_authentication {
        parts.push(Expr::eq(ctx.is_authenticated_param(), Expr::Bool(true)));
    }
    if let Some(predicate) = rule.predicate() {
        parts.push(compile_predicate(ctx, owner, var, predicate)?);
    }
    Ok(Expr::and(parts))
}

fn compile_predicate<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    var: &Var,
    predicate: &'a RulePredicate,
) -> TranslateResult<Expr> {
    Ok(match predicate {
        RulePredicate::And(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(compile_predicate(ctx, owner, var, item)?);
            }
            Expr::and(parts)
        }
        RulePredicate::Or(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(compile_predicate(ctx, owner, var, item)?);
            }
            Expr::or(parts)
        }
        RulePredicate::Not(inner) => Expr::not(compile_predicate(ctx, owner, var, inner)?),
        RulePredicate::Node(template) => template_predicate(ctx, owner, var, template)?,
        RulePredicate::Jwt(jwt) => compile_jwt(ctx, jwt),
    })
}

fn compile_jwt(ctx: &mut TranslationContext<'_>, predicate: &JwtPredicate) -> Expr {
    match predicate {
        JwtPredicate::And(items) => Expr::and(items.iter().map(|p| compile_jwt(ctx, p)).collect::<Vec<_>>()),
        JwtPredicate::Or(items) => Expr::or(items.iter().map(|p| compile_jwt(ctx, p)).collect::<Vec<_>>()),
        JwtPredicate::Not(inner) => Expr::not(compile_jwt(ctx, inner)),
        JwtPredicate::Condition {
            path,
            comparator,
            value,
        } => {
            let claim = path
                .iter()
                .fold(ctx.jwt_param(), |expr, segment| expr.property(segment.as_str()));
            let expected = match value.as_str().and_then(crate::claims::Placeholder::parse) {
                Some(placeholder) => ctx.claims.resolve(&placeholder),
                None => value.clone(),
            };
            let param = ctx.param(expected);
            let comparison = match comparator {
                JwtComparator::Eq => Expr::eq(claim.clone(), param),
                JwtComparator::Not => Expr::compare(claim.clone(), CompareOp::Neq, param),
                JwtComparator::In => Expr::compare(claim.clone(), CompareOp::In, param),
                JwtComparator::Includes => Expr::compare(param, CompareOp::In, claim.clone()),
                JwtComparator::Lt => Expr::compare(claim.clone(), CompareOp::Lt, param),
                JwtComparator::Lte => Expr::compare(claim.clone(), CompareOp::Lte, param),
                JwtComparator::Gt => Expr::compare(claim.clone(), CompareOp::Gt, param),
                JwtComparator::Gte => Expr::compare(claim.clone(), CompareOp::Gte, param),
                JwtComparator::Contains => Expr::compare(claim.clone(), CompareOp::Contains, param),
                JwtComparator::StartsWith => {
                    Expr::compare(claim.clone(), CompareOp::StartsWith, param)
                }
                JwtComparator::EndsWith => Expr::compare(claim.clone(), CompareOp::EndsWith, param),
            };
            // Missing claims never satisfy, even under NOT.
            Expr::and([claim.is_not_null(), comparison])
        }
    }
}

/// Field-level READ rules of the selected fields, as (filter, validation).
pub(crate) fn field_read_rules<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    var: &Var,
    selected: &[&str],
) -> TranslateResult<(Expr, Expr)> {
    let mut filters = Vec::new();
    let mut validations = Vec::new();
    for name in selected {
        let Some(field) = entity.field_def(name) else {
            continue;
        };
        if field.authorization.is_empty() {
            continue;
        }
        filters.push(filter_rules(ctx, entity, &field.authorization, var, &[AuthOperation::Read])?);
        validations.push(validate_rules(
            ctx,
            entity,
            &field.authorization,
            var,
            &[AuthOperation::Read],
            ValidationPhase::Before,
            Some(&field.name),
        )?);
    }
    Ok((Expr::and(filters), Expr::and(validations)))
}
