//! Root reads of a single entity type.

use crate::cypher::{Clause, NodePattern, Pattern};
use crate::error::TranslateResult;
use crate::operation::SelectionField;
use crate::schema::{AuthOperation, EntityDef, FieldSource};

use super::context::TranslationContext;
use super::projection::project_entity;
use super::scope::{filter_clauses, ScopeFilter, Source};
use super::sort::list_paging;

/// `MATCH .. WHERE ..`, paging, relationship subqueries, `RETURN this {..}`.
pub(crate) fn translate_read<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    field: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let this = ctx.root_var();
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &this,
        Source::Match(Pattern::node(NodePattern::new(&this, &entity.labels))),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: field.argument("where"),
            selection: Some(field),
            ..ScopeFilter::default()
        },
    )?;
    let paging = list_paging(
        ctx,
        Some(entity as &dyn FieldSource),
        entity.limit.as_ref(),
        &entity.default_sort,
        field,
    )?;
    clauses.extend(paging.clause(|_, key| this.prop(key.field.db_property())));
    let projected = project_entity(ctx, entity, &this, field, false)?;
    clauses.extend(projected.calls);
    clauses.push(Clause::return_single(projected.expr, &this));
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render;
    use crate::operation::SelectionBuilder;
    use crate::schema::{Direction, FieldDef, ScalarType, Schema, SchemaBuilder};
    use crate::value::Value;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Movie")
                    .field(FieldDef::scalar("title", ScalarType::String))
                    .field(FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming)),
            )
            .entity(EntityDef::new("Actor").field(FieldDef::scalar("name", ScalarType::String)))
            .build()
            .expect("schema")
    }

    #[test]
    fn read_with_filter_sort_and_nested_relationship() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let movie = schema.entity("Movie").expect("movie");
        let field = SelectionBuilder::new("movies")
            .arg("where", json!({ "title_STARTS_WITH": "The" }))
            .arg("sort", json!([{ "title": "ASC" }]))
            .arg("limit", json!(10))
            .field("title")
            .child(SelectionBuilder::new("actors").field("name"))
            .build()
            .expect("field");
        let clauses = translate_read(&mut ctx, movie, &field).expect("clauses");
        assert_eq!(
            render(&clauses),
            "MATCH (this:Movie)\nWHERE this.title STARTS WITH $param0\nWITH *\nORDER BY this.title ASC\nLIMIT $param1\nCALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    RETURN collect(this1 { .name }) AS var2\n}\nRETURN this { .title, actors: var2 } AS this"
        );
        let statement = ctx.finish(&clauses).expect("finish");
        assert_eq!(statement.params["param1"], Value::Int(10));
        assert_eq!(statement.notices.len(), 1);
    }
}
