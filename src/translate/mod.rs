//! Operation-to-Cypher translation.
//!
//! [`Translator`] owns the compiled schema and configuration and turns one
//! resolved root field at a time into a [`CompiledStatement`]. All mutable
//! state of a translation lives in a private context that is created per
//! call, so a single translator can be shared across threads.

#![forbid(unsafe_code)]

mod aggregate;
mod auth;
mod connection;
mod context;
mod cypher_field;
mod entities;
mod mutation;
mod polymorphic;
mod predicate;
mod projection;
mod read;
mod relationship;
mod scope;
mod sort;

use std::sync::Arc;

use tracing::debug;

use crate::claims::Claims;
use crate::config::TranslatorConfig;
use crate::cypher::{Clause, Expr, NodePattern, Pattern, RelPattern, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{EntityDef, RelationshipDef, RootField, Schema, TypeTarget};
use crate::statement::CompiledStatement;
use crate::value::Value;

use context::TranslationContext;

/// Translates resolved GraphQL root fields into Cypher statements.
///
/// Cheap to clone; the schema is shared.
#[derive(Debug, Clone)]
pub struct Translator {
    schema: Arc<Schema>,
    config: TranslatorConfig,
}

impl Translator {
    /// Creates a translator over `schema`.
    pub fn new(schema: impl Into<Arc<Schema>>, config: TranslatorConfig) -> Self {
        Self {
            schema: schema.into(),
            config,
        }
    }

    /// Translator with the default configuration.
    pub fn with_defaults(schema: impl Into<Arc<Schema>>) -> Self {
        Self::new(schema, TranslatorConfig::default())
    }

    /// Compiled schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Active configuration.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translates one root field (`movies`, `createMovies`, ...).
    pub fn translate(
        &self,
        field: &SelectionField,
        claims: &Claims,
    ) -> TranslateResult<CompiledStatement> {
        let root = self
            .schema
            .root_field(&field.name)
            .ok_or_else(|| TranslateError::UnknownRootField {
                name: field.name.clone(),
            })?;
        let kind = root_kind(root);
        debug!(root = %field.name, kind, "translate.begin");

        let mut ctx = TranslationContext::new(&self.schema, &self.config, claims);
        ctx.check_selection_depth(field.depth())?;
        let clauses = match root {
            RootField::Read(TypeTarget::Entity(name)) => {
                read::translate_read(&mut ctx, entity(&self.schema, name)?, field)?
            }
            RootField::Read(target) => polymorphic::root_read(&mut ctx, target, field)?,
            RootField::Connection(target) => connection::root_connection(&mut ctx, target, field)?,
            RootField::Aggregate(name) => {
                aggregate::root_aggregate(&mut ctx, entity(&self.schema, name)?, field)?
            }
            RootField::Create(name) => {
                mutation::translate_create(&mut ctx, entity(&self.schema, name)?, field)?
            }
            RootField::Update(name) => {
                mutation::translate_update(&mut ctx, entity(&self.schema, name)?, field)?
            }
            RootField::Delete(name) => {
                mutation::translate_delete(&mut ctx, entity(&self.schema, name)?, field)?
            }
        };
        finish(ctx, &field.name, kind, &clauses)
    }

    /// Resolves federation entity representations, one statement each.
    ///
    /// `selection` is the selection applied to every resolved entity.
    pub fn translate_entities(
        &self,
        representations: &[Value],
        selection: &SelectionField,
        claims: &Claims,
    ) -> TranslateResult<Vec<CompiledStatement>> {
        let mut statements = Vec::with_capacity(representations.len());
        for representation in representations {
            debug!(kind = "entities", "translate.begin");
            let mut ctx = TranslationContext::new(&self.schema, &self.config, claims);
            ctx.check_selection_depth(selection.depth())?;
            let clauses = entities::translate_representation(&mut ctx, representation, selection)?;
            statements.push(finish(ctx, "_entities", "entities", &clauses)?);
        }
        Ok(statements)
    }
}

fn finish(
    ctx: TranslationContext<'_>,
    root: &str,
    kind: &'static str,
    clauses: &[Clause],
) -> TranslateResult<CompiledStatement> {
    let statement = ctx.finish(clauses)?;
    for notice in &statement.notices {
        debug!(root, ?notice, "translate.notice");
    }
    debug!(
        root,
        kind,
        params = statement.params.len(),
        text_len = statement.text.len(),
        "translate.complete"
    );
    Ok(statement)
}

fn root_kind(root: &RootField) -> &'static str {
    match root {
        RootField::Read(_) => "read",
        RootField::Connection(_) => "connection",
        RootField::Aggregate(_) => "aggregate",
        RootField::Create(_) => "create",
        RootField::Update(_) => "update",
        RootField::Delete(_) => "delete",
    }
}

fn entity<'s>(schema: &'s Schema, name: &str) -> TranslateResult<&'s EntityDef> {
    schema
        .entity(name)
        .ok_or_else(|| TranslateError::UnknownRootField {
            name: name.to_owned(),
        })
}

/// `(parent)-[rel]->(node:Labels)` in the relationship's declared direction.
pub(crate) fn hop_pattern(
    parent: &Var,
    relationship: &RelationshipDef,
    rel_var: Option<&Var>,
    node: &Var,
    labels: &[String],
) -> Pattern {
    Pattern::hop(
        NodePattern::bound(parent),
        RelPattern::new(rel_var, &relationship.rel_type, relationship.direction),
        NodePattern::new(node, labels),
    )
}

/// Labels to put on a target node pattern plus the extra membership test
/// needed when the target spans several entities.
pub(crate) fn membership(schema: &Schema, target: &TypeTarget, var: &Var) -> (Vec<String>, Expr) {
    match target {
        TypeTarget::Entity(name) => {
            let labels = schema
                .entity(name)
                .map(|e| e.labels.clone())
                .unwrap_or_else(|| vec![name.clone()]);
            (labels, Expr::Bool(true))
        }
        target => {
            let tests = schema
                .members(target)
                .into_iter()
                .map(|member| Expr::HasLabels(var.clone(), member.labels.clone()));
            (Vec::new(), Expr::or(tests))
        }
    }
}
