//! Federation `_entities` resolution by `@key` fields.

use crate::cypher::{Clause, NodePattern, Pattern};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::AuthOperation;
use crate::value::{Value, ValueMap};

use super::context::TranslationContext;
use super::projection::project_entity;
use super::scope::{filter_clauses, ScopeFilter, Source};

const ENTITY_UNION: &str = "_Entity";

fn invalid(reason: impl Into<String>) -> TranslateError {
    TranslateError::invalid_argument("representations", reason)
}

/// Resolves one representation: the first declared key whose fields are all
/// present becomes an equality filter.
pub(crate) fn translate_representation<'a>(
    ctx: &mut TranslationContext<'a>,
    representation: &Value,
    selection: &SelectionField,
) -> TranslateResult<Vec<Clause>> {
    let schema = ctx.schema;
    let map = representation
        .as_map()
        .ok_or_else(|| invalid(format!("expected an object, found {}", representation.kind())))?;
    let typename = map
        .get("__typename")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("representation is missing __typename"))?;
    let entity = schema
        .entity(typename)
        .ok_or_else(|| TranslateError::UnknownConcreteType {
            abstract_type: ENTITY_UNION.to_owned(),
            name: typename.to_owned(),
        })?;
    let key = entity
        .keys
        .iter()
        .find(|key| key.iter().all(|f| map.get(f).is_some_and(|v| !v.is_null())))
        .ok_or_else(|| invalid(format!("representation of '{typename}' carries no complete key")))?;
    let mut filter = ValueMap::new();
    for name in key {
        if let Some(value) = map.get(name) {
            filter.insert(name.clone(), value.clone());
        }
    }
    let where_value = Value::Map(filter);

    let this = ctx.root_var();
    let mut clauses = filter_clauses(
        ctx,
        entity,
        &this,
        Source::Match(Pattern::node(NodePattern::new(&this, &entity.labels))),
        &[AuthOperation::Read],
        ScopeFilter {
            where_value: Some(&where_value),
            selection: Some(selection),
            ..ScopeFilter::default()
        },
    )?;
    let projected = project_entity(ctx, entity, &this, selection, false)?;
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
    use crate::schema::{EntityDef, FieldDef, ScalarType, Schema, SchemaBuilder};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Product")
                    .field(FieldDef::scalar("upc", ScalarType::String))
                    .field(FieldDef::scalar("sku", ScalarType::String))
                    .field(FieldDef::scalar("name", ScalarType::String))
                    .key(["upc"])
                    .key(["sku"]),
            )
            .build()
            .expect("schema")
    }

    fn translate(value: serde_json::Value) -> TranslateResult<String> {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let selection = SelectionBuilder::new("_entities").field("name").build().expect("field");
        let representation = Value::from_json(value).expect("representation");
        translate_representation(&mut ctx, &representation, &selection).map(|c| render(&c))
    }

    #[test]
    fn first_complete_key_is_used() {
        let text = translate(json!({ "__typename": "Product", "upc": null, "sku": "A-1" }))
            .expect("translate");
        assert_eq!(
            text,
            "MATCH (this:Product)\nWHERE this.sku = $param0\nRETURN this { .name } AS this"
        );
    }

    #[test]
    fn representations_need_a_known_type_and_a_key() {
        let err = translate(json!({ "__typename": "Review", "id": "1" })).unwrap_err();
        assert_eq!(err.code(), "UnknownConcreteType");
        let err = translate(json!({ "__typename": "Product", "name": "Lamp" })).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        let err = translate(json!({ "upc": "1" })).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
    }
}
