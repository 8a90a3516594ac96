use serde::{Deserialize, Serialize};

use super::TypeTarget;

/// Declared direction of a relationship, seen from the owning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// `(source)-[:T]->(target)`.
    #[serde(alias = "OUT")]
    Outgoing,
    /// `(source)<-[:T]-(target)`.
    #[serde(alias = "IN")]
    Incoming,
    /// Matched in either direction; written as outgoing.
    Undirected,
}

impl Direction {
    /// Direction the same edge has when declared from the other endpoint.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Undirected => Direction::Undirected,
        }
    }
}

/// Number of related nodes a relationship field resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Single related node (`director: Person`).
    One,
    /// List of related nodes (`actors: [Actor!]!`).
    Many,
}

/// Relationship field metadata, resolved once at schema build.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDef {
    /// Field name on the owning type.
    pub field: String,
    /// Owning entity or interface.
    pub source: String,
    /// Declared target type.
    pub target: TypeTarget,
    /// Concrete entities the target expands to; filled by the builder.
    pub members: Vec<String>,
    /// Wire relationship type.
    pub rel_type: String,
    /// Declared direction.
    pub direction: Direction,
    /// One or many.
    pub cardinality: Cardinality,
    /// Whether a one-relationship must always be connected.
    pub required: bool,
    /// Relationship-properties type carried by the edge.
    pub properties: Option<String>,
}

impl RelationshipDef {
    /// Creates an outgoing many-relationship towards `target`.
    pub fn new(
        field: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            field: field.into(),
            source: String::new(),
            target: TypeTarget::Entity(target.into()),
            members: Vec::new(),
            rel_type: rel_type.into(),
            direction,
            cardinality: Cardinality::Many,
            required: false,
            properties: None,
        }
    }

    /// Returns `true` for one-cardinality relationships.
    pub fn is_one(&self) -> bool {
        self.cardinality == Cardinality::One
    }

    /// Returns `true` when the target is an interface or union.
    pub fn is_polymorphic(&self) -> bool {
        !matches!(self.target, TypeTarget::Entity(_))
    }

    /// Name of the declared target type.
    pub fn target_name(&self) -> &str {
        self.target.name()
    }
}
