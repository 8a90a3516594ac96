//! Mutation input parsing.
//!
//! Input objects are checked against the schema and turned into a tree of
//! writes before any Cypher is emitted, so shape errors and statically
//! detectable cardinality violations surface without partial output.

use rustc_hash::FxHashMap;

use crate::coerce::{coerce_field, coerce_literal};
use crate::cypher::ArithOp;
use crate::error::{CardinalityExpectation, TranslateError, TranslateResult};
use crate::schema::{
    EntityDef, FieldDef, FieldKind, FieldSource, RelationshipDef, ScalarField, ScalarType,
    TypeTarget,
};
use crate::translate::context::TranslationContext;
use crate::translate::polymorphic::select_members;
use crate::value::{Value, ValueMap};

/// Assignment applied to one property.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WriteOp {
    Set(Value),
    Arith(ArithOp, Value),
    Push(Value),
    Pop(i64),
}

/// One scalar property write.
#[derive(Debug)]
pub(crate) struct ScalarWrite<'a> {
    pub(crate) field: &'a FieldDef,
    pub(crate) scalar: &'a ScalarField,
    pub(crate) op: WriteOp,
}

/// Writes to one node plus the relationship operations hanging off it.
#[derive(Debug)]
pub(crate) struct NodeInput<'a, 'v> {
    pub(crate) entity: &'a EntityDef,
    pub(crate) writes: Vec<ScalarWrite<'a>>,
    pub(crate) relations: Vec<RelationOp<'a, 'v>>,
}

impl<'a> NodeInput<'a, '_> {
    pub(super) fn empty(entity: &'a EntityDef) -> Self {
        Self {
            entity,
            writes: Vec::new(),
            relations: Vec::new(),
        }
    }
}

/// One nested operation on a relationship field, already narrowed to a
/// concrete target entity.
#[derive(Debug)]
pub(crate) struct RelationOp<'a, 'v> {
    pub(crate) relationship: &'a RelationshipDef,
    pub(crate) member: &'a EntityDef,
    pub(crate) kind: OpKind<'a, 'v>,
}

#[derive(Debug)]
pub(crate) enum OpKind<'a, 'v> {
    Create {
        node: NodeInput<'a, 'v>,
        edge: Vec<ScalarWrite<'a>>,
    },
    /// `filter` is the node filter (`where.node`).
    Connect {
        filter: Option<&'v Value>,
        edge: Vec<ScalarWrite<'a>>,
        nested: Vec<RelationOp<'a, 'v>>,
    },
    ConnectOrCreate {
        key: Vec<ScalarWrite<'a>>,
        node: NodeInput<'a, 'v>,
        edge: Vec<ScalarWrite<'a>>,
    },
    /// `filter` is connection shaped (`{ node, edge }`).
    Update {
        filter: Option<&'v Value>,
        node: Option<NodeInput<'a, 'v>>,
        edge: Vec<ScalarWrite<'a>>,
    },
    Disconnect {
        filter: Option<&'v Value>,
        nested: Vec<RelationOp<'a, 'v>>,
    },
    Delete {
        filter: Option<&'v Value>,
        nested: Vec<RelationOp<'a, 'v>>,
    },
}

impl OpKind<'_, '_> {
    /// Whether the operation adds an edge.
    pub(crate) fn attaches(&self) -> bool {
        matches!(
            self,
            OpKind::Create { .. } | OpKind::Connect { .. } | OpKind::ConnectOrCreate { .. }
        )
    }

    /// Whether the operation removes an edge.
    pub(crate) fn detaches(&self) -> bool {
        matches!(self, OpKind::Disconnect { .. } | OpKind::Delete { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy)]
enum Modifier {
    Increment,
    Decrement,
    Add,
    Subtract,
    Multiply,
    Divide,
    Push,
    Pop,
}

const MODIFIERS: [(&str, Modifier); 8] = [
    ("_INCREMENT", Modifier::Increment),
    ("_DECREMENT", Modifier::Decrement),
    ("_ADD", Modifier::Add),
    ("_SUBTRACT", Modifier::Subtract),
    ("_MULTIPLY", Modifier::Multiply),
    ("_DIVIDE", Modifier::Divide),
    ("_PUSH", Modifier::Push),
    ("_POP", Modifier::Pop),
];

fn split_modifier<'a>(owner: &'a dyn FieldSource, key: &str) -> Option<(&'a FieldDef, Modifier)> {
    MODIFIERS.iter().find_map(|(suffix, modifier)| {
        let base = key.strip_suffix(suffix)?;
        owner.lookup_field(base).map(|def| (def, *modifier))
    })
}

fn object<'v>(owner: &str, value: &'v Value) -> TranslateResult<&'v ValueMap> {
    value.as_map().ok_or_else(|| {
        TranslateError::invalid_input(owner, format!("expected an object, found {}", value.kind()))
    })
}

pub(super) fn items(value: &Value) -> &[Value] {
    match value {
        Value::List(items) => items,
        Value::Null => &[],
        other => std::slice::from_ref(other),
    }
}

fn unknown_input(owner: &str, key: &str) -> TranslateError {
    TranslateError::invalid_input(owner, format!("unknown input field '{key}'"))
}

/// Counts edge-adding elements per one-relationship.
#[derive(Default)]
struct Attached<'a> {
    counts: FxHashMap<&'a str, usize>,
}

impl<'a> Attached<'a> {
    fn add(&mut self, relationship: &'a RelationshipDef) {
        if relationship.is_one() {
            *self.counts.entry(relationship.field.as_str()).or_default() += 1;
        }
    }

    fn check(&self, entity: &EntityDef) -> TranslateResult<()> {
        for rel in entity.relationships() {
            if self.counts.get(rel.field.as_str()).copied().unwrap_or(0) > 1 {
                return Err(TranslateError::ConstraintViolation {
                    entity: entity.name.clone(),
                    relationship: rel.field.clone(),
                    expected: CardinalityExpectation::AtMostOne,
                });
            }
        }
        Ok(())
    }
}

fn attaching(op: &str) -> bool {
    matches!(op, "create" | "connect" | "connectOrCreate")
}

/// A created node must be attached to each of its required one-relationships,
/// except the one leading back to the parent that creates it.
fn check_required(
    entity: &EntityDef,
    relations: &[RelationOp<'_, '_>],
    inverse: Option<&RelationshipDef>,
) -> TranslateResult<()> {
    for rel in entity.relationships().filter(|r| r.is_one() && r.required) {
        let attached = relations
            .iter()
            .any(|op| op.relationship.field == rel.field && op.kind.attaches());
        let from_parent = inverse.is_some_and(|parent| {
            parent.rel_type == rel.rel_type && parent.direction.reversed() == rel.direction
        });
        if !attached && !from_parent {
            return Err(TranslateError::ConstraintViolation {
                entity: entity.name.clone(),
                relationship: rel.field.clone(),
                expected: CardinalityExpectation::ExactlyOne,
            });
        }
    }
    Ok(())
}

/// Parses mutation arguments against the schema.
pub(crate) struct InputParser<'c, 'a> {
    ctx: &'c TranslationContext<'a>,
}

impl<'c, 'a> InputParser<'c, 'a> {
    pub(crate) fn new(ctx: &'c TranslationContext<'a>) -> Self {
        Self { ctx }
    }

    fn entity(&self, name: &str) -> TranslateResult<&'a EntityDef> {
        let schema = self.ctx.schema;
        schema
            .entity(name)
            .ok_or_else(|| TranslateError::invalid_input(name, "unknown entity"))
    }

    fn member_of(&self, rel: &RelationshipDef, name: &str) -> TranslateResult<&'a EntityDef> {
        let schema = self.ctx.schema;
        schema
            .entity(name)
            .filter(|entity| schema.is_member(&rel.target, &entity.name))
            .ok_or_else(|| TranslateError::UnknownConcreteType {
                abstract_type: rel.target_name().to_owned(),
                name: name.to_owned(),
            })
    }

    /// Splits a relationship input by union member; other targets pass through.
    fn keyed<'v>(
        &self,
        rel: &RelationshipDef,
        value: &'v Value,
    ) -> TranslateResult<Vec<(Option<&'a EntityDef>, &'v Value)>> {
        match &rel.target {
            TypeTarget::Union(name) => object(name, value)?
                .iter()
                .map(|(member, inner)| Ok((Some(self.member_of(rel, member)?), inner)))
                .collect(),
            _ => Ok(vec![(None, value)]),
        }
    }

    /// Concrete entities an element applies to.
    fn members(
        &self,
        rel: &RelationshipDef,
        member: Option<&'a EntityDef>,
        where_value: Option<&Value>,
    ) -> TranslateResult<Vec<&'a EntityDef>> {
        if let Some(member) = member {
            return Ok(vec![member]);
        }
        match &rel.target {
            TypeTarget::Entity(name) => Ok(vec![self.entity(name)?]),
            TypeTarget::Interface(_) => Ok(select_members(self.ctx, &rel.target, where_value, true)?
                .into_iter()
                .filter(|branch| branch.extra.is_none())
                .map(|branch| branch.entity)
                .collect()),
            TypeTarget::Union(name) => Err(TranslateError::invalid_input(
                name,
                "union inputs must be keyed by member type",
            )),
        }
    }

    fn scalar_write(
        &self,
        owner: &dyn FieldSource,
        def: &'a FieldDef,
        modifier: Option<Modifier>,
        value: &Value,
    ) -> TranslateResult<Option<ScalarWrite<'a>>> {
        let owner_name = owner.type_name();
        let scalar = def.as_scalar().ok_or_else(|| {
            TranslateError::invalid_input(owner_name, format!("'{}' cannot be written", def.name))
        })?;
        if scalar.autogenerate.is_some() {
            return Err(TranslateError::invalid_input(
                owner_name,
                format!("'{}' is generated and cannot be set", def.name),
            ));
        }
        let Some(modifier) = modifier else {
            if value.is_null() && scalar.required {
                return Err(TranslateError::invalid_input(
                    owner_name,
                    format!("'{}' cannot be set to null", def.name),
                ));
            }
            return Ok(Some(ScalarWrite {
                field: def,
                scalar,
                op: WriteOp::Set(coerce_field(scalar, value.clone())?),
            }));
        };
        if value.is_null() {
            return Err(TranslateError::invalid_input(
                owner_name,
                format!("modifier on '{}' needs a value", def.name),
            ));
        }
        let integer = !scalar.list && matches!(scalar.ty, ScalarType::Int | ScalarType::BigInt);
        let float = !scalar.list && scalar.ty == ScalarType::Float;
        let op = match modifier {
            Modifier::Increment if integer => {
                WriteOp::Arith(ArithOp::Add, coerce_literal(&scalar.ty, value.clone())?)
            }
            Modifier::Decrement if integer => {
                WriteOp::Arith(ArithOp::Sub, coerce_literal(&scalar.ty, value.clone())?)
            }
            Modifier::Add if float => WriteOp::Arith(ArithOp::Add, coerce_literal(&scalar.ty, value.clone())?),
            Modifier::Subtract if float => {
                WriteOp::Arith(ArithOp::Sub, coerce_literal(&scalar.ty, value.clone())?)
            }
            Modifier::Multiply if float => {
                WriteOp::Arith(ArithOp::Mul, coerce_literal(&scalar.ty, value.clone())?)
            }
            Modifier::Divide if float => WriteOp::Arith(ArithOp::Div, coerce_literal(&scalar.ty, value.clone())?),
            Modifier::Push if scalar.list => {
                WriteOp::Push(coerce_field(scalar, Value::List(value.clone().into_list()))?)
            }
            Modifier::Pop if scalar.list => match value.as_int() {
                Some(0) => return Ok(None),
                Some(count) if count > 0 => WriteOp::Pop(count),
                _ => {
                    return Err(TranslateError::invalid_input(
                        owner_name,
                        format!("pop count for '{}' must be a positive integer", def.name),
                    ))
                }
            },
            other => {
                return Err(TranslateError::invalid_input(
                    owner_name,
                    format!("{other:?} does not apply to '{}' of type {}", def.name, scalar.ty.name()),
                ))
            }
        };
        Ok(Some(ScalarWrite {
            field: def,
            scalar,
            op,
        }))
    }

    fn edge_writes(
        &self,
        rel: &RelationshipDef,
        value: Option<&Value>,
        mode: WriteMode,
    ) -> TranslateResult<Vec<ScalarWrite<'a>>> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };
        let schema = self.ctx.schema;
        let properties = rel
            .properties
            .as_deref()
            .and_then(|name| schema.properties(name))
            .ok_or_else(|| {
                TranslateError::invalid_input(
                    &rel.source,
                    format!("'{}' carries no relationship properties", rel.field),
                )
            })?;
        let mut writes = Vec::new();
        for (key, inner) in object(&properties.name, value)? {
            let (def, modifier) = match properties.lookup_field(key) {
                Some(def) => (def, None),
                None if mode == WriteMode::Update => split_modifier(properties, key)
                    .map(|(def, modifier)| (def, Some(modifier)))
                    .ok_or_else(|| unknown_input(&properties.name, key))?,
                None => return Err(unknown_input(&properties.name, key)),
            };
            writes.extend(self.scalar_write(properties, def, modifier, inner)?);
        }
        Ok(writes)
    }

    /// Create input for `entity`. `inverse` is the relationship the parent
    /// creates this node through, if any.
    pub(crate) fn create_node<'v>(
        &self,
        entity: &'a EntityDef,
        value: &'v Value,
        depth: usize,
        inverse: Option<&RelationshipDef>,
    ) -> TranslateResult<NodeInput<'a, 'v>> {
        self.ctx.check_mutation_depth(depth)?;
        let mut input = NodeInput::empty(entity);
        let mut attached = Attached::default();
        for (key, inner) in object(&entity.name, value)? {
            let def = entity
                .field_def(key)
                .ok_or_else(|| unknown_input(&entity.name, key))?;
            match &def.kind {
                FieldKind::Scalar(_) => input.writes.extend(self.scalar_write(entity, def, None, inner)?),
                FieldKind::Relationship(rel) => {
                    for (member, fields) in self.keyed(rel, inner)? {
                        for (op, elements) in object(&entity.name, fields)? {
                            if !attaching(op) {
                                return Err(unknown_input(&entity.name, op));
                            }
                            for element in items(elements) {
                                attached.add(rel);
                                input
                                    .relations
                                    .extend(self.element(op, rel, member, element, depth + 1)?);
                            }
                        }
                    }
                }
                _ => {
                    return Err(TranslateError::invalid_input(
                        &entity.name,
                        format!("'{key}' cannot be written"),
                    ))
                }
            }
        }
        attached.check(entity)?;
        check_required(entity, &input.relations, inverse)?;
        Ok(input)
    }

    /// Update input for `entity`, including arithmetic and list modifiers.
    pub(crate) fn update_node<'v>(
        &self,
        entity: &'a EntityDef,
        value: &'v Value,
        depth: usize,
    ) -> TranslateResult<NodeInput<'a, 'v>> {
        self.ctx.check_mutation_depth(depth)?;
        let mut input = NodeInput::empty(entity);
        let mut attached = Attached::default();
        for (key, inner) in object(&entity.name, value)? {
            let Some(def) = entity.field_def(key) else {
                let (def, modifier) =
                    split_modifier(entity, key).ok_or_else(|| unknown_input(&entity.name, key))?;
                input
                    .writes
                    .extend(self.scalar_write(entity, def, Some(modifier), inner)?);
                continue;
            };
            match &def.kind {
                FieldKind::Scalar(_) => input.writes.extend(self.scalar_write(entity, def, None, inner)?),
                FieldKind::Relationship(rel) => {
                    for (member, elements) in self.keyed(rel, inner)? {
                        for element in items(elements) {
                            let ops = self.update_element(rel, member, element, depth + 1, &mut attached)?;
                            input.relations.extend(ops);
                        }
                    }
                }
                _ => {
                    return Err(TranslateError::invalid_input(
                        &entity.name,
                        format!("'{key}' cannot be written"),
                    ))
                }
            }
        }
        attached.check(entity)?;
        Ok(input)
    }

    /// `{ connect: { actors: [..] } }` style arguments: relationship field to
    /// elements of a single operation.
    pub(crate) fn relation_arg<'v>(
        &self,
        entity: &'a EntityDef,
        op: &str,
        value: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let mut ops = Vec::new();
        let mut attached = Attached::default();
        for (key, inner) in object(&entity.name, value)? {
            let rel = entity
                .field_def(key)
                .and_then(FieldDef::as_relationship)
                .ok_or_else(|| unknown_input(&entity.name, key))?;
            for (member, elements) in self.keyed(rel, inner)? {
                for element in items(elements) {
                    if attaching(op) {
                        attached.add(rel);
                    }
                    ops.extend(self.element(op, rel, member, element, depth)?);
                }
            }
        }
        attached.check(entity)?;
        Ok(ops)
    }

    /// `{ where, update, connect, disconnect, create, delete, connectOrCreate }`
    fn update_element<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
        attached: &mut Attached<'a>,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        self.ctx.check_mutation_depth(depth)?;
        let map = object(rel.target_name(), element)?;
        let mut ops = Vec::new();
        if let Some(update) = map.get("update") {
            ops.extend(self.element_update(rel, member, map.get("where"), update, depth)?);
        }
        for (key, inner) in map {
            match key.as_str() {
                "where" | "update" => {}
                "create" | "connect" | "connectOrCreate" | "disconnect" | "delete" => {
                    for nested in items(inner) {
                        if attaching(key) {
                            attached.add(rel);
                        }
                        ops.extend(self.element(key, rel, member, nested, depth)?);
                    }
                }
                other => return Err(unknown_input(rel.target_name(), other)),
            }
        }
        Ok(ops)
    }

    fn element<'v>(
        &self,
        op: &str,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        self.ctx.check_mutation_depth(depth)?;
        match op {
            "create" => self.create_element(rel, member, element, depth),
            "connect" => self.connect_element(rel, member, element, depth),
            "connectOrCreate" => self.connect_or_create_element(rel, member, element, depth),
            "disconnect" => self.removal_element(rel, member, element, depth, false),
            "delete" => self.removal_element(rel, member, element, depth, true),
            other => Err(unknown_input(rel.target_name(), other)),
        }
    }

    fn create_element<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let target = rel.target_name();
        let map = object(target, element)?;
        let node_value = map
            .get("node")
            .ok_or_else(|| TranslateError::invalid_input(target, "create input requires 'node'"))?;
        let (entity, node_value) = match (member, &rel.target) {
            (Some(member), _) => (member, node_value),
            (None, TypeTarget::Entity(name)) => (self.entity(name)?, node_value),
            (None, _) => {
                let mut entries = object(target, node_value)?.iter();
                let (Some((name, inner)), None) = (entries.next(), entries.next()) else {
                    return Err(TranslateError::invalid_input(
                        target,
                        "expected exactly one implementing type under 'node'",
                    ));
                };
                (self.member_of(rel, name)?, inner)
            }
        };
        let node = self.create_node(entity, node_value, depth, Some(rel))?;
        let edge = self.edge_writes(rel, map.get("edge"), WriteMode::Create)?;
        Ok(vec![RelationOp {
            relationship: rel,
            member: entity,
            kind: OpKind::Create { node, edge },
        }])
    }

    fn connect_element<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let map = object(rel.target_name(), element)?;
        let where_value = map.get("where");
        let filter = where_value
            .and_then(Value::as_map)
            .and_then(|w| w.get("node"));
        let mut ops = Vec::new();
        for entity in self.members(rel, member, where_value)? {
            let nested = match map.get("connect") {
                Some(value) => self.relation_arg(entity, "connect", value, depth + 1)?,
                None => Vec::new(),
            };
            ops.push(RelationOp {
                relationship: rel,
                member: entity,
                kind: OpKind::Connect {
                    filter,
                    edge: self.edge_writes(rel, map.get("edge"), WriteMode::Create)?,
                    nested,
                },
            });
        }
        Ok(ops)
    }

    fn connect_or_create_element<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let target = rel.target_name();
        let entity = match (member, &rel.target) {
            (Some(member), _) => member,
            (None, TypeTarget::Entity(name)) => self.entity(name)?,
            (None, _) => {
                return Err(TranslateError::invalid_input(
                    target,
                    "connectOrCreate needs a concrete target type",
                ))
            }
        };
        let map = object(target, element)?;
        let key_value = map
            .get("where")
            .and_then(Value::as_map)
            .and_then(|w| w.get("node"))
            .ok_or_else(|| {
                TranslateError::invalid_input(&entity.name, "connectOrCreate requires 'where.node'")
            })?;
        let mut key = Vec::new();
        for (name, value) in object(&entity.name, key_value)? {
            if !entity.is_unique_field(name) {
                return Err(TranslateError::NonUniqueConnectOrCreate {
                    entity: entity.name.clone(),
                    field: name.clone(),
                });
            }
            if value.is_null() {
                return Err(TranslateError::invalid_input(
                    &entity.name,
                    format!("connectOrCreate key '{name}' cannot be null"),
                ));
            }
            let def = entity
                .field_def(name)
                .ok_or_else(|| unknown_input(&entity.name, name))?;
            let scalar = def
                .as_scalar()
                .ok_or_else(|| unknown_input(&entity.name, name))?;
            key.push(ScalarWrite {
                field: def,
                scalar,
                op: WriteOp::Set(coerce_field(scalar, value.clone())?),
            });
        }
        if key.is_empty() {
            return Err(TranslateError::invalid_input(
                &entity.name,
                "connectOrCreate requires at least one unique field",
            ));
        }
        let on_create = map.get("onCreate").and_then(Value::as_map);
        let node = match on_create.and_then(|c| c.get("node")) {
            Some(value) => self.create_node(entity, value, depth, Some(rel))?,
            None => NodeInput::empty(entity),
        };
        if !node.relations.is_empty() {
            return Err(TranslateError::invalid_input(
                &entity.name,
                "connectOrCreate cannot write nested relationships",
            ));
        }
        let edge = self.edge_writes(rel, on_create.and_then(|c| c.get("edge")), WriteMode::Create)?;
        Ok(vec![RelationOp {
            relationship: rel,
            member: entity,
            kind: OpKind::ConnectOrCreate { key, node, edge },
        }])
    }

    fn element_update<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        where_value: Option<&'v Value>,
        update: &'v Value,
        depth: usize,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let update = object(rel.target_name(), update)?;
        let mut ops = Vec::new();
        for entity in self.members(rel, member, where_value)? {
            let node = match update.get("node") {
                Some(value) => Some(self.update_node(entity, value, depth)?),
                None => None,
            };
            ops.push(RelationOp {
                relationship: rel,
                member: entity,
                kind: OpKind::Update {
                    filter: where_value,
                    node,
                    edge: self.edge_writes(rel, update.get("edge"), WriteMode::Update)?,
                },
            });
        }
        Ok(ops)
    }

    /// Disconnect and delete elements: `{ where, disconnect | delete }`.
    fn removal_element<'v>(
        &self,
        rel: &'a RelationshipDef,
        member: Option<&'a EntityDef>,
        element: &'v Value,
        depth: usize,
        delete: bool,
    ) -> TranslateResult<Vec<RelationOp<'a, 'v>>> {
        let map = object(rel.target_name(), element)?;
        let where_value = map.get("where");
        let nested_key = if delete { "delete" } else { "disconnect" };
        let mut ops = Vec::new();
        for entity in self.members(rel, member, where_value)? {
            let nested = match map.get(nested_key) {
                Some(value) => self.relation_arg(entity, nested_key, value, depth + 1)?,
                None => Vec::new(),
            };
            let kind = if delete {
                OpKind::Delete {
                    filter: where_value,
                    nested,
                }
            } else {
                OpKind::Disconnect {
                    filter: where_value,
                    nested,
                }
            };
            ops.push(RelationOp {
                relationship: rel,
                member: entity,
                kind,
            });
        }
        Ok(ops)
    }
}
