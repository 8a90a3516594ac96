//! Compiled schema metadata.
//!
//! A [`Schema`] is built once by [`SchemaBuilder`] (or loaded from a
//! [`SchemaDocument`]) and is immutable afterwards; translators share it
//! behind an `Arc`.

#![forbid(unsafe_code)]

pub mod auth;
pub mod builder;
pub mod document;
pub mod entity;
pub mod filter;
pub mod relationship;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

pub use auth::{
    AuthOperation, AuthenticationRule, AuthorizationRule, JwtComparator, JwtPredicate,
    RuleMode, RulePredicate, ValidationPhase,
};
pub use builder::SchemaBuilder;
pub use document::SchemaDocument;
pub use entity::{
    AutoGenerate, CypherField, CypherReturn, EntityDef, FieldDef, FieldKind, InterfaceDef,
    PropertiesDef, QueryLimit, ScalarField, ScalarType, SortDirection, UnionDef,
};
pub use filter::{classify_where_key, Comparator, Quantifier, WhereKey};
pub use relationship::{Cardinality, Direction, RelationshipDef};

/// Anything with named fields a `where` argument can address.
pub trait FieldSource {
    /// Declared type name.
    fn type_name(&self) -> &str;
    /// Field by name.
    fn lookup_field(&self, name: &str) -> Option<&FieldDef>;
}

/// Declared type a relationship or root field resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTarget {
    /// Concrete node type.
    Entity(String),
    /// Interface implemented by entities.
    Interface(String),
    /// Union of entities.
    Union(String),
}

impl TypeTarget {
    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            TypeTarget::Entity(name) | TypeTarget::Interface(name) | TypeTarget::Union(name) => {
                name
            }
        }
    }
}

/// Operation a root field compiles to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootField {
    /// `movies`, `productions`.
    Read(TypeTarget),
    /// `moviesConnection`.
    Connection(TypeTarget),
    /// `moviesAggregate`.
    Aggregate(String),
    /// `createMovies`.
    Create(String),
    /// `updateMovies`.
    Update(String),
    /// `deleteMovies`.
    Delete(String),
}

/// Immutable, fully resolved schema metadata.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) entities: IndexMap<String, EntityDef>,
    pub(crate) interfaces: IndexMap<String, InterfaceDef>,
    pub(crate) unions: IndexMap<String, UnionDef>,
    pub(crate) properties: IndexMap<String, PropertiesDef>,
    pub(crate) root_fields: FxHashMap<String, RootField>,
}

impl Schema {
    /// Entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Interface by name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.interfaces.get(name)
    }

    /// Union by name.
    pub fn union(&self, name: &str) -> Option<&UnionDef> {
        self.unions.get(name)
    }

    /// Relationship-properties type by name.
    pub fn properties(&self, name: &str) -> Option<&PropertiesDef> {
        self.properties.get(name)
    }

    /// Entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }

    /// Root field by public name.
    pub fn root_field(&self, name: &str) -> Option<&RootField> {
        self.root_fields.get(name)
    }

    /// Every root field name, sorted.
    pub fn root_field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.root_fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Entity, interface or properties type addressable by `where`.
    pub fn field_source(&self, name: &str) -> Option<&dyn FieldSource> {
        if let Some(entity) = self.entities.get(name) {
            return Some(entity);
        }
        if let Some(interface) = self.interfaces.get(name) {
            return Some(interface);
        }
        self.properties.get(name).map(|p| p as &dyn FieldSource)
    }

    /// Resolves a bare type name to its target kind.
    pub fn target_of(&self, name: &str) -> Option<TypeTarget> {
        if self.entities.contains_key(name) {
            Some(TypeTarget::Entity(name.to_owned()))
        } else if self.interfaces.contains_key(name) {
            Some(TypeTarget::Interface(name.to_owned()))
        } else if self.unions.contains_key(name) {
            Some(TypeTarget::Union(name.to_owned()))
        } else {
            None
        }
    }

    /// Concrete entities a target expands to, in declaration order.
    pub fn members(&self, target: &TypeTarget) -> Vec<&EntityDef> {
        match target {
            TypeTarget::Entity(name) => self.entities.get(name).into_iter().collect(),
            TypeTarget::Interface(name) => self
                .interfaces
                .get(name)
                .map(|i| {
                    i.implementers
                        .iter()
                        .filter_map(|member| self.entities.get(member))
                        .collect()
                })
                .unwrap_or_default(),
            TypeTarget::Union(name) => self
                .unions
                .get(name)
                .map(|u| {
                    u.members
                        .iter()
                        .filter_map(|member| self.entities.get(member))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Whether `entity` belongs to `target`.
    pub fn is_member(&self, target: &TypeTarget, entity: &str) -> bool {
        match target {
            TypeTarget::Entity(name) => name == entity,
            TypeTarget::Interface(name) => self
                .interfaces
                .get(name)
                .map(|i| i.implementers.iter().any(|m| m == entity))
                .unwrap_or(false),
            TypeTarget::Union(name) => self
                .unions
                .get(name)
                .map(|u| u.members.iter().any(|m| m == entity))
                .unwrap_or(false),
        }
    }
}

/// Default root field name: lower camel case plus a simple plural suffix.
pub fn pluralize(type_name: &str) -> String {
    let mut chars = type_name.chars();
    let mut camel = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    if camel.ends_with('y')
        && !camel.ends_with("ay")
        && !camel.ends_with("ey")
        && !camel.ends_with("oy")
        && !camel.ends_with("uy")
    {
        camel.pop();
        camel.push_str("ies");
    } else if camel.ends_with('s') || camel.ends_with('x') || camel.ends_with("ch") || camel.ends_with("sh") {
        camel.push_str("es");
    } else {
        camel.push('s');
    }
    camel
}

/// Upper camel form of a plural, used in mutation root names.
pub(crate) fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralize_follows_english_suffixes() {
        assert_eq!(pluralize("Movie"), "movies");
        assert_eq!(pluralize("Category"), "categories");
        assert_eq!(pluralize("Day"), "days");
        assert_eq!(pluralize("Address"), "addresses");
        assert_eq!(pluralize("TVShow"), "tVShows");
    }
}
