//! Map projections of selected fields.
//!
//! Scalars become `.name` / `key: var.property` entries. Every other field
//! kind needs a correlated subquery; those are returned as `calls` that the
//! caller emits ahead of the projection.

use crate::cypher::{Clause, Expr, MapEntry, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::operation::SelectionField;
use crate::schema::{
    EntityDef, FieldDef, FieldKind, FieldSource, PropertiesDef, RelationshipDef, ScalarField,
};

use super::context::TranslationContext;
use super::{aggregate, connection, cypher_field, relationship};

const TYPENAME: &str = "__typename";

const POINT_COMPONENTS: [&str; 8] = ["longitude", "latitude", "height", "x", "y", "z", "crs", "srid"];

/// A projection plus the subqueries it reads from.
#[derive(Debug)]
pub(crate) struct Projected {
    pub(crate) calls: Vec<Clause>,
    pub(crate) expr: Expr,
}

/// Projects `field`'s selection on `node`. Polymorphic branches pass
/// `typename` so the result can be told apart.
pub(crate) fn project_entity<'a>(
    ctx: &mut TranslationContext<'a>,
    entity: &'a EntityDef,
    node: &Var,
    field: &SelectionField,
    typename: bool,
) -> TranslateResult<Projected> {
    let mut calls = Vec::new();
    let mut entries = Vec::new();
    if typename && field.children_for(&entity.name, &entity.implements).all(|c| c.name != TYPENAME) {
        entries.push(MapEntry::Entry(TYPENAME.to_owned(), Expr::Str(entity.name.clone())));
    }
    for child in field.children_for(&entity.name, &entity.implements) {
        let key = child.response_key().to_owned();
        if child.name == TYPENAME {
            entries.push(MapEntry::Entry(key, Expr::Str(entity.name.clone())));
            continue;
        }
        let def = entity
            .field_def(&child.name)
            .ok_or_else(|| TranslateError::unknown_field(&entity.name, &child.name))?;
        match &def.kind {
            FieldKind::Scalar(scalar) => entries.push(scalar_entry(node, def, scalar, child)?),
            FieldKind::Relationship(rel) => {
                let (call, out) = relationship::project_relationship(ctx, node, rel, child)?;
                calls.push(call);
                entries.push(MapEntry::Entry(key, out.expr()));
            }
            FieldKind::Connection { relationship } => {
                let rel = related(entity, relationship)?;
                let (call, out) = connection::nested_connection(ctx, node, rel, child)?;
                calls.push(call);
                entries.push(MapEntry::Entry(key, out.expr()));
            }
            FieldKind::Aggregation { relationship } => {
                let rel = related(entity, relationship)?;
                let (call, out) = aggregate::nested_aggregate(ctx, node, rel, child)?;
                calls.push(call);
                entries.push(MapEntry::Entry(key, out.expr()));
            }
            FieldKind::Cypher(cypher) => {
                let (call, out) = cypher_field::project_cypher(ctx, node, def, cypher, child)?;
                calls.push(call);
                entries.push(MapEntry::Entry(key, out.expr()));
            }
        }
    }
    Ok(Projected {
        calls,
        expr: Expr::Projection(node.clone(), entries),
    })
}

/// Projects relationship properties bound to `edge`.
pub(crate) fn project_properties(
    properties: &PropertiesDef,
    edge: &Var,
    field: &SelectionField,
) -> TranslateResult<Expr> {
    let mut entries = Vec::new();
    for child in &field.selection {
        if child.name == TYPENAME {
            entries.push(MapEntry::Entry(
                child.response_key().to_owned(),
                Expr::Str(properties.name.clone()),
            ));
            continue;
        }
        let def = properties
            .lookup_field(&child.name)
            .ok_or_else(|| TranslateError::unknown_field(&properties.name, &child.name))?;
        let scalar = def
            .as_scalar()
            .ok_or_else(|| TranslateError::unknown_field(&properties.name, &child.name))?;
        entries.push(scalar_entry(edge, def, scalar, child)?);
    }
    Ok(Expr::Projection(edge.clone(), entries))
}

fn related<'a>(
    entity: &'a EntityDef,
    name: &str,
) -> TranslateResult<&'a RelationshipDef> {
    entity
        .field_def(name)
        .and_then(FieldDef::as_relationship)
        .ok_or_else(|| TranslateError::unknown_field(&entity.name, name))
}

fn scalar_entry(
    var: &Var,
    def: &FieldDef,
    scalar: &ScalarField,
    child: &SelectionField,
) -> TranslateResult<MapEntry> {
    let key = child.response_key();
    let property = def.db_property();
    if scalar.ty.is_spatial() && !child.selection.is_empty() {
        return Ok(MapEntry::Entry(
            key.to_owned(),
            point_projection(var.prop(property), child)?,
        ));
    }
    if key == property {
        Ok(MapEntry::Property(property.to_owned()))
    } else {
        Ok(MapEntry::Entry(key.to_owned(), var.prop(property)))
    }
}

/// `CASE WHEN p IS NOT NULL THEN { longitude: p.longitude, .. } ELSE NULL END`
fn point_projection(value: Expr, child: &SelectionField) -> TranslateResult<Expr> {
    let mut entries = Vec::with_capacity(child.selection.len());
    for component in &child.selection {
        if !POINT_COMPONENTS.contains(&component.name.as_str()) {
            return Err(TranslateError::unknown_field("Point", &component.name));
        }
        entries.push((
            component.response_key().to_owned(),
            value.clone().property(component.name.clone()),
        ));
    }
    Ok(Expr::Case {
        branches: vec![(value.is_not_null(), Expr::Map(entries))],
        otherwise: Some(Box::new(Expr::Null)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::config::TranslatorConfig;
    use crate::cypher::render_expr;
    use crate::operation::SelectionBuilder;
    use crate::schema::{ScalarType, Schema, SchemaBuilder};

    fn schema() -> Schema {
        SchemaBuilder::new()
            .entity(
                EntityDef::new("Venue")
                    .field(FieldDef::scalar("name", ScalarType::String))
                    .field(FieldDef::scalar("displayName", ScalarType::String).alias("display_name"))
                    .field(FieldDef::scalar("location", ScalarType::Point)),
            )
            .build()
            .expect("schema")
    }

    #[test]
    fn scalars_aliases_and_points() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let venue = schema.entity("Venue").expect("venue");
        let field = SelectionBuilder::new("venues")
            .field("name")
            .field("displayName")
            .child(SelectionBuilder::new("location").fields(["latitude", "longitude"]))
            .build()
            .expect("field");
        let projected =
            project_entity(&mut ctx, venue, &Var::new("this"), &field, true).expect("projection");
        assert!(projected.calls.is_empty());
        assert_eq!(
            render_expr(&projected.expr),
            "this { __typename: \"Venue\", .name, displayName: this.display_name, location: CASE WHEN this.location IS NOT NULL THEN { latitude: this.location.latitude, longitude: this.location.longitude } ELSE NULL END }"
        );
    }

    #[test]
    fn unknown_fields_are_reported_with_their_owner() {
        let schema = schema();
        let config = TranslatorConfig::default();
        let claims = Claims::anonymous();
        let mut ctx = TranslationContext::new(&schema, &config, &claims);
        let venue = schema.entity("Venue").expect("venue");
        let field = SelectionBuilder::new("venues").field("capacity").build().expect("field");
        let err = project_entity(&mut ctx, venue, &Var::new("this"), &field, false).unwrap_err();
        assert_eq!(err, TranslateError::unknown_field("Venue", "capacity"));
    }
}
