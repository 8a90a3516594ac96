//! Fluent construction and validation of [`Schema`] metadata.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use super::entity::{CypherReturn, EntityDef, FieldDef, FieldKind, InterfaceDef, PropertiesDef, UnionDef};
use super::filter::validate_template;
use super::relationship::{Direction, RelationshipDef};
use super::{pluralize, upper_first, FieldSource, RootField, Schema, TypeTarget};
use crate::error::{SchemaError, SchemaResult};

/// Collects type declarations and validates them into a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    entities: IndexMap<String, EntityDef>,
    interfaces: IndexMap<String, InterfaceDef>,
    unions: IndexMap<String, UnionDef>,
    properties: IndexMap<String, PropertiesDef>,
    error: Option<SchemaError>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_name(&mut self, name: &str) -> bool {
        if self.error.is_some() {
            return false;
        }
        let taken = self.entities.contains_key(name)
            || self.interfaces.contains_key(name)
            || self.unions.contains_key(name)
            || self.properties.contains_key(name);
        if taken {
            self.error = Some(SchemaError::DuplicateType {
                name: name.to_owned(),
            });
            return false;
        }
        true
    }

    /// Declares an entity.
    pub fn entity(mut self, entity: EntityDef) -> Self {
        if self.claim_name(&entity.name) {
            self.entities.insert(entity.name.clone(), entity);
        }
        self
    }

    /// Declares an interface.
    pub fn interface(mut self, interface: InterfaceDef) -> Self {
        if self.claim_name(&interface.name) {
            self.interfaces.insert(interface.name.clone(), interface);
        }
        self
    }

    /// Declares a union.
    pub fn union(mut self, union: UnionDef) -> Self {
        if self.claim_name(&union.name) {
            self.unions.insert(union.name.clone(), union);
        }
        self
    }

    /// Declares a relationship-properties type.
    pub fn properties(mut self, properties: PropertiesDef) -> Self {
        if self.claim_name(&properties.name) {
            self.properties.insert(properties.name.clone(), properties);
        }
        self
    }

    /// Validates every declaration and derives connection, aggregate and root fields.
    pub fn build(self) -> SchemaResult<Schema> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let SchemaBuilder {
            mut entities,
            mut interfaces,
            unions,
            mut properties,
            ..
        } = self;

        for entity in entities.values() {
            check_duplicate_fields(&entity.name, &entity.fields)?;
        }
        for interface in interfaces.values() {
            check_duplicate_fields(&interface.name, &interface.fields)?;
        }
        for props in properties.values() {
            check_duplicate_fields(&props.name, &props.fields)?;
            if let Some(field) = props.fields.iter().find(|f| f.as_scalar().is_none()) {
                return Err(SchemaError::RelationshipPropertiesMismatch {
                    rel_type: props.name.clone(),
                    reason: format!("field '{}' must be a scalar", field.name),
                });
            }
        }

        resolve_interfaces(&mut entities, &mut interfaces)?;
        check_unions(&entities, &unions)?;

        let kinds = TypeKinds {
            entities: entities.keys().cloned().collect(),
            interfaces: interfaces
                .iter()
                .map(|(name, i)| (name.clone(), i.implementers.clone()))
                .collect(),
            unions: unions
                .iter()
                .map(|(name, u)| (name.clone(), u.members.clone()))
                .collect(),
            properties: properties.keys().cloned().collect(),
        };
        for entity in entities.values_mut() {
            resolve_fields(&kinds, &entity.name, &mut entity.fields)?;
        }
        for interface in interfaces.values_mut() {
            resolve_fields(&kinds, &interface.name, &mut interface.fields)?;
        }
        check_relationship_consistency(&entities)?;

        for entity in entities.values() {
            check_keys_and_sort(entity)?;
        }

        for entity in entities.values_mut() {
            derive_fields(&entity.name, &mut entity.fields)?;
            entity.reindex();
        }
        for interface in interfaces.values_mut() {
            derive_fields(&interface.name, &mut interface.fields)?;
            interface.reindex();
        }

        resolve_rules(&mut entities, &mut interfaces, &mut properties)?;

        let root_fields = derive_root_fields(&entities, &interfaces, &unions)?;
        let schema = Schema {
            entities,
            interfaces,
            unions,
            properties,
            root_fields,
        };
        validate_rule_templates(&schema)?;

        info!(
            entities = schema.entities.len(),
            interfaces = schema.interfaces.len(),
            unions = schema.unions.len(),
            relationships = schema
                .entities
                .values()
                .map(|e| e.relationships().count())
                .sum::<usize>(),
            root_fields = schema.root_fields.len(),
            "schema.build.complete"
        );
        Ok(schema)
    }
}

struct TypeKinds {
    entities: FxHashSet<String>,
    interfaces: FxHashMap<String, Vec<String>>,
    unions: FxHashMap<String, Vec<String>>,
    properties: FxHashSet<String>,
}

impl TypeKinds {
    fn resolve(&self, name: &str) -> Option<(TypeTarget, Vec<String>)> {
        if self.entities.contains(name) {
            Some((TypeTarget::Entity(name.to_owned()), vec![name.to_owned()]))
        } else if let Some(members) = self.interfaces.get(name) {
            Some((TypeTarget::Interface(name.to_owned()), members.clone()))
        } else {
            self.unions
                .get(name)
                .map(|members| (TypeTarget::Union(name.to_owned()), members.clone()))
        }
    }

    fn is_known(&self, name: &str) -> bool {
        self.entities.contains(name)
            || self.interfaces.contains_key(name)
            || self.unions.contains_key(name)
    }
}

fn check_duplicate_fields(owner: &str, fields: &[FieldDef]) -> SchemaResult<()> {
    let mut seen = FxHashSet::default();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                owner: owner.to_owned(),
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_interfaces(
    entities: &mut IndexMap<String, EntityDef>,
    interfaces: &mut IndexMap<String, InterfaceDef>,
) -> SchemaResult<()> {
    for entity in entities.values() {
        for name in &entity.implements {
            let interface =
                interfaces
                    .get_mut(name)
                    .ok_or_else(|| SchemaError::UnresolvableInterface {
                        entity: entity.name.clone(),
                        interface: name.clone(),
                    })?;
            for field in &interface.fields {
                if entity.field_def(&field.name).is_none() {
                    return Err(SchemaError::MissingInterfaceField {
                        entity: entity.name.clone(),
                        interface: name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            interface.implementers.push(entity.name.clone());
        }
    }
    Ok(())
}

fn check_unions(
    entities: &IndexMap<String, EntityDef>,
    unions: &IndexMap<String, UnionDef>,
) -> SchemaResult<()> {
    for union in unions.values() {
        if union.members.is_empty() {
            return Err(SchemaError::UnknownEntity {
                name: union.name.clone(),
            });
        }
        for member in &union.members {
            if !entities.contains_key(member) {
                return Err(SchemaError::UnknownEntity {
                    name: member.clone(),
                });
            }
        }
    }
    Ok(())
}

fn resolve_fields(kinds: &TypeKinds, owner: &str, fields: &mut [FieldDef]) -> SchemaResult<()> {
    for field in fields.iter_mut() {
        match &mut field.kind {
            FieldKind::Relationship(rel) => {
                rel.source = owner.to_owned();
                let (target, members) = kinds.resolve(rel.target.name()).ok_or_else(|| {
                    SchemaError::UnknownRelationshipTarget {
                        owner: owner.to_owned(),
                        field: field.name.clone(),
                        target: rel.target.name().to_owned(),
                    }
                })?;
                rel.target = target;
                rel.members = members;
                if let Some(props) = &rel.properties {
                    if !kinds.properties.contains(props) {
                        return Err(SchemaError::RelationshipPropertiesMismatch {
                            rel_type: rel.rel_type.clone(),
                            reason: format!("unknown properties type '{props}'"),
                        });
                    }
                }
            }
            FieldKind::Cypher(cypher) => {
                let invalid = |reason: &str| SchemaError::InvalidCypherField {
                    owner: owner.to_owned(),
                    field: field.name.clone(),
                    reason: reason.to_owned(),
                };
                if cypher.statement.trim().is_empty() {
                    return Err(invalid("statement is empty"));
                }
                if cypher.column.trim().is_empty() {
                    return Err(invalid("column name is empty"));
                }
                if let CypherReturn::Target(target) = &cypher.returns {
                    if !kinds.is_known(target) {
                        return Err(invalid("returns an unknown type"));
                    }
                }
            }
            FieldKind::Connection { .. } | FieldKind::Aggregation { .. } => {
                return Err(SchemaError::DuplicateField {
                    owner: owner.to_owned(),
                    field: field.name.clone(),
                });
            }
            FieldKind::Scalar(_) => {}
        }
    }
    Ok(())
}

fn check_relationship_consistency(entities: &IndexMap<String, EntityDef>) -> SchemaResult<()> {
    let endpoints: Vec<&RelationshipDef> = entities
        .values()
        .flat_map(|entity| entity.relationships())
        .collect();
    for (idx, a) in endpoints.iter().enumerate() {
        for b in &endpoints[idx + 1..] {
            if a.rel_type != b.rel_type || a.source == b.source {
                continue;
            }
            let paired = a.members.contains(&b.source) && b.members.contains(&a.source);
            if !paired {
                continue;
            }
            let undirected =
                a.direction == Direction::Undirected || b.direction == Direction::Undirected;
            if !undirected && a.direction != b.direction.reversed() {
                return Err(SchemaError::ConflictingRelationship {
                    rel_type: a.rel_type.clone(),
                    first: format!("{}.{}", a.source, a.field),
                    second: format!("{}.{}", b.source, b.field),
                });
            }
            if let (Some(pa), Some(pb)) = (&a.properties, &b.properties) {
                if pa != pb {
                    return Err(SchemaError::RelationshipPropertiesMismatch {
                        rel_type: a.rel_type.clone(),
                        reason: format!(
                            "'{}.{}' uses '{pa}' but '{}.{}' uses '{pb}'",
                            a.source, a.field, b.source, b.field
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_keys_and_sort(entity: &EntityDef) -> SchemaResult<()> {
    for key in &entity.keys {
        if key.is_empty() {
            return Err(SchemaError::InvalidKey {
                entity: entity.name.clone(),
                field: String::new(),
            });
        }
        for field in key {
            let scalar = entity.field_def(field).and_then(FieldDef::as_scalar);
            if scalar.map(|s| s.list).unwrap_or(true) {
                return Err(SchemaError::InvalidKey {
                    entity: entity.name.clone(),
                    field: field.clone(),
                });
            }
        }
    }
    for (field, _) in &entity.default_sort {
        if entity.field_def(field).and_then(FieldDef::as_scalar).is_none() {
            return Err(SchemaError::UnknownField {
                owner: entity.name.clone(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn derive_fields(owner: &str, fields: &mut Vec<FieldDef>) -> SchemaResult<()> {
    let mut derived = Vec::new();
    for field in fields.iter() {
        if let FieldKind::Relationship(rel) = &field.kind {
            derived.push(FieldDef::with_kind(
                format!("{}Connection", field.name),
                FieldKind::Connection {
                    relationship: field.name.clone(),
                },
            ));
            if matches!(rel.target, TypeTarget::Entity(_)) {
                derived.push(FieldDef::with_kind(
                    format!("{}Aggregate", field.name),
                    FieldKind::Aggregation {
                        relationship: field.name.clone(),
                    },
                ));
            }
        }
    }
    fields.extend(derived);
    check_duplicate_fields(owner, fields)
}

fn resolve_rules(
    entities: &mut IndexMap<String, EntityDef>,
    interfaces: &mut IndexMap<String, InterfaceDef>,
    properties: &mut IndexMap<String, PropertiesDef>,
) -> SchemaResult<()> {
    for interface in interfaces.values_mut() {
        for rule in &mut interface.authorization {
            rule.resolve(&interface.name)?;
        }
        for field in &mut interface.fields {
            for rule in &mut field.authorization {
                rule.resolve(&interface.name)?;
            }
        }
    }
    for props in properties.values_mut() {
        for rule in &mut props.authorization {
            rule.resolve(&props.name)?;
        }
    }
    for entity in entities.values_mut() {
        for rule in &mut entity.authorization {
            rule.resolve(&entity.name)?;
        }
        for field in &mut entity.fields {
            for rule in &mut field.authorization {
                rule.resolve(&entity.name)?;
            }
        }
        for name in &entity.implements {
            if let Some(interface) = interfaces.get(name) {
                entity
                    .authorization
                    .extend(interface.authorization.iter().cloned());
                for inherited in &interface.fields {
                    if inherited.authorization.is_empty() {
                        continue;
                    }
                    if let Some(idx) = entity.field_index.get(&inherited.name).copied() {
                        entity.fields[idx]
                            .authorization
                            .extend(inherited.authorization.iter().cloned());
                    }
                }
            }
        }
        if let Some(auth) = &entity.authentication {
            if auth.operations.is_empty() {
                return Err(SchemaError::InvalidAuthorizationRule {
                    owner: entity.name.clone(),
                    reason: "authentication rule lists no operations".into(),
                });
            }
        }
    }
    Ok(())
}

fn validate_rule_templates(schema: &Schema) -> SchemaResult<()> {
    let check = |owner: &dyn FieldSource, rules: &[super::AuthorizationRule]| -> SchemaResult<()> {
        for rule in rules {
            if let Some(predicate) = rule.predicate() {
                for template in predicate.node_templates() {
                    validate_template(schema, owner, template)?;
                }
            }
        }
        Ok(())
    };
    for entity in schema.entities.values() {
        check(entity, &entity.authorization)?;
        for field in &entity.fields {
            check(entity, &field.authorization)?;
        }
    }
    for interface in schema.interfaces.values() {
        check(interface, &interface.authorization)?;
    }
    for props in schema.properties.values() {
        check(props, &props.authorization)?;
    }
    Ok(())
}

fn derive_root_fields(
    entities: &IndexMap<String, EntityDef>,
    interfaces: &IndexMap<String, InterfaceDef>,
    unions: &IndexMap<String, UnionDef>,
) -> SchemaResult<FxHashMap<String, RootField>> {
    let mut roots = FxHashMap::default();
    let mut insert = |name: String, field: RootField| -> SchemaResult<()> {
        if roots.contains_key(&name) {
            return Err(SchemaError::DuplicateField {
                owner: "Query".into(),
                field: name,
            });
        }
        roots.insert(name, field);
        Ok(())
    };
    for entity in entities.values() {
        let plural = entity.plural.clone().unwrap_or_else(|| pluralize(&entity.name));
        let target = TypeTarget::Entity(entity.name.clone());
        let upper = upper_first(&plural);
        insert(format!("{plural}Connection"), RootField::Connection(target.clone()))?;
        insert(format!("{plural}Aggregate"), RootField::Aggregate(entity.name.clone()))?;
        insert(format!("create{upper}"), RootField::Create(entity.name.clone()))?;
        insert(format!("update{upper}"), RootField::Update(entity.name.clone()))?;
        insert(format!("delete{upper}"), RootField::Delete(entity.name.clone()))?;
        insert(plural, RootField::Read(target))?;
    }
    for interface in interfaces.values() {
        if interface.implementers.is_empty() {
            continue;
        }
        let plural = interface
            .plural
            .clone()
            .unwrap_or_else(|| pluralize(&interface.name));
        let target = TypeTarget::Interface(interface.name.clone());
        insert(format!("{plural}Connection"), RootField::Connection(target.clone()))?;
        insert(plural, RootField::Read(target))?;
    }
    for union in unions.values() {
        let plural = union.plural.clone().unwrap_or_else(|| pluralize(&union.name));
        insert(plural, RootField::Read(TypeTarget::Union(union.name.clone())))?;
    }
    Ok(roots)
}
