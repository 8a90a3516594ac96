//! Entity, interface, union and field definitions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::auth::{AuthenticationRule, AuthorizationRule};
use super::relationship::{Cardinality, Direction, RelationshipDef};
use super::FieldSource;
use crate::value::Value;

/// Built-in and enum scalar types understood by the translator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Opaque identifier, stored as a string.
    Id,
    /// UTF-8 string.
    String,
    /// 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Integer transported as a string.
    BigInt,
    /// Boolean.
    Boolean,
    /// Zoned date-time.
    DateTime,
    /// Calendar date.
    Date,
    /// Zoned time.
    Time,
    /// Date-time without zone.
    LocalDateTime,
    /// Time without zone.
    LocalTime,
    /// ISO-8601 duration.
    Duration,
    /// WGS-84 point.
    Point,
    /// Cartesian point.
    CartesianPoint,
    /// Declared enum; values are strings.
    Enum(String),
}

impl ScalarType {
    /// Resolves a built-in scalar name.
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "ID" => ScalarType::Id,
            "String" => ScalarType::String,
            "Int" => ScalarType::Int,
            "Float" => ScalarType::Float,
            "BigInt" => ScalarType::BigInt,
            "Boolean" => ScalarType::Boolean,
            "DateTime" => ScalarType::DateTime,
            "Date" => ScalarType::Date,
            "Time" => ScalarType::Time,
            "LocalDateTime" => ScalarType::LocalDateTime,
            "LocalTime" => ScalarType::LocalTime,
            "Duration" => ScalarType::Duration,
            "Point" => ScalarType::Point,
            "CartesianPoint" => ScalarType::CartesianPoint,
            _ => return None,
        })
    }

    /// GraphQL-facing name.
    pub fn name(&self) -> &str {
        match self {
            ScalarType::Id => "ID",
            ScalarType::String => "String",
            ScalarType::Int => "Int",
            ScalarType::Float => "Float",
            ScalarType::BigInt => "BigInt",
            ScalarType::Boolean => "Boolean",
            ScalarType::DateTime => "DateTime",
            ScalarType::Date => "Date",
            ScalarType::Time => "Time",
            ScalarType::LocalDateTime => "LocalDateTime",
            ScalarType::LocalTime => "LocalTime",
            ScalarType::Duration => "Duration",
            ScalarType::Point => "Point",
            ScalarType::CartesianPoint => "CartesianPoint",
            ScalarType::Enum(name) => name,
        }
    }

    /// Int, Float or BigInt.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Float | ScalarType::BigInt)
    }

    /// Any of the temporal types.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ScalarType::DateTime
                | ScalarType::Date
                | ScalarType::Time
                | ScalarType::LocalDateTime
                | ScalarType::LocalTime
                | ScalarType::Duration
        )
    }

    /// Point or CartesianPoint.
    pub fn is_spatial(&self) -> bool {
        matches!(self, ScalarType::Point | ScalarType::CartesianPoint)
    }

    /// ID or String.
    pub fn is_textual(&self) -> bool {
        matches!(self, ScalarType::Id | ScalarType::String)
    }
}

/// Value generated by the store when a node is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoGenerate {
    /// `randomUUID()` on create.
    Id,
    /// `datetime()` on the selected write kinds.
    Timestamp {
        /// Set when the node is created.
        on_create: bool,
        /// Set on every update.
        on_update: bool,
    },
}

/// Scalar field metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    /// Scalar type.
    pub ty: ScalarType,
    /// Whether the field holds a list.
    pub list: bool,
    /// Non-null in the public schema.
    pub required: bool,
    /// Stored property name when aliased.
    pub db_property: Option<String>,
    /// Backed by a uniqueness constraint.
    pub unique: bool,
    /// Store-generated value.
    pub autogenerate: Option<AutoGenerate>,
    /// Value written when a create omits the field.
    pub default: Option<Value>,
}

impl ScalarField {
    /// Plain nullable scalar.
    pub fn new(ty: ScalarType) -> Self {
        Self {
            ty,
            list: false,
            required: false,
            db_property: None,
            unique: false,
            autogenerate: None,
            default: None,
        }
    }
}

/// Shape returned by a computed field's statement.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherReturn {
    /// Scalar column, projected as-is.
    Scalar(ScalarType),
    /// Nodes of a declared type, projected with a nested selection.
    Target(String),
}

/// Computed field backed by a user statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherField {
    /// Statement template; `this` refers to the owning node.
    pub statement: String,
    /// Column extracted from the statement's result.
    pub column: String,
    /// Returned shape.
    pub returns: CypherReturn,
    /// Whether the field is a list.
    pub list: bool,
}

/// Closed set of field behaviours, resolved once at schema build.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Stored property.
    Scalar(ScalarField),
    /// Traversal to related nodes.
    Relationship(RelationshipDef),
    /// Computed by an embedded statement.
    Cypher(CypherField),
    /// Derived `<rel>Connection` field.
    Connection {
        /// Underlying relationship field.
        relationship: String,
    },
    /// Derived `<rel>Aggregate` field.
    Aggregation {
        /// Underlying relationship field.
        relationship: String,
    },
}

/// A field on an entity, interface or relationship-properties type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Public field name.
    pub name: String,
    /// Behaviour.
    pub kind: FieldKind,
    /// Field-level rules, ANDed with the owner's rules.
    pub authorization: Vec<AuthorizationRule>,
}

impl FieldDef {
    /// Scalar field of type `ty`.
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::with_kind(name, FieldKind::Scalar(ScalarField::new(ty)))
    }

    /// Many-relationship to `target` (entity, interface or union).
    pub fn relationship(
        name: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let name = name.into();
        let def = RelationshipDef::new(name.clone(), target, rel_type, direction);
        Self::with_kind(name, FieldKind::Relationship(def))
    }

    /// Computed scalar field.
    pub fn cypher(
        name: impl Into<String>,
        statement: impl Into<String>,
        column: impl Into<String>,
        returns: CypherReturn,
    ) -> Self {
        Self::with_kind(
            name,
            FieldKind::Cypher(CypherField {
                statement: statement.into(),
                column: column.into(),
                returns,
                list: false,
            }),
        )
    }

    pub(crate) fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            authorization: Vec::new(),
        }
    }

    /// Marks a scalar non-null or a one-relationship required.
    pub fn required(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Scalar(s) => s.required = true,
            FieldKind::Relationship(r) => r.required = true,
            _ => {}
        }
        self
    }

    /// Marks a scalar or computed field as a list.
    pub fn list(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Scalar(s) => s.list = true,
            FieldKind::Cypher(c) => c.list = true,
            FieldKind::Relationship(r) => r.cardinality = Cardinality::Many,
            _ => {}
        }
        self
    }

    /// Makes a relationship resolve to a single node.
    pub fn one(mut self) -> Self {
        if let FieldKind::Relationship(r) = &mut self.kind {
            r.cardinality = Cardinality::One;
        }
        self
    }

    /// Declares a uniqueness constraint on a scalar.
    pub fn unique(mut self) -> Self {
        if let FieldKind::Scalar(s) = &mut self.kind {
            s.unique = true;
        }
        self
    }

    /// Stores the scalar under a different property name.
    pub fn alias(mut self, property: impl Into<String>) -> Self {
        if let FieldKind::Scalar(s) = &mut self.kind {
            s.db_property = Some(property.into());
        }
        self
    }

    /// Generates a UUID on create; implies uniqueness.
    pub fn autogenerate_id(mut self) -> Self {
        if let FieldKind::Scalar(s) = &mut self.kind {
            s.autogenerate = Some(AutoGenerate::Id);
            s.unique = true;
        }
        self
    }

    /// Stamps `datetime()` on create and/or update.
    pub fn timestamp(mut self, on_create: bool, on_update: bool) -> Self {
        if let FieldKind::Scalar(s) = &mut self.kind {
            s.autogenerate = Some(AutoGenerate::Timestamp {
                on_create,
                on_update,
            });
        }
        self
    }

    /// Value written when a create omits the field.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        if let FieldKind::Scalar(s) = &mut self.kind {
            s.default = Some(value.into());
        }
        self
    }

    /// Relationship-properties type carried by the edge.
    pub fn properties(mut self, properties: impl Into<String>) -> Self {
        if let FieldKind::Relationship(r) = &mut self.kind {
            r.properties = Some(properties.into());
        }
        self
    }

    /// Attaches a field-level authorization rule.
    pub fn rule(mut self, rule: AuthorizationRule) -> Self {
        self.authorization.push(rule);
        self
    }

    /// Scalar metadata, if this is a stored property.
    pub fn as_scalar(&self) -> Option<&ScalarField> {
        match &self.kind {
            FieldKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Relationship metadata, if this is a traversal.
    pub fn as_relationship(&self) -> Option<&RelationshipDef> {
        match &self.kind {
            FieldKind::Relationship(r) => Some(r),
            _ => None,
        }
    }

    /// Stored property name of a scalar field.
    pub fn db_property(&self) -> &str {
        self.as_scalar()
            .and_then(|s| s.db_property.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Direction of one default sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending.
    #[serde(rename = "ASC")]
    Asc,
    /// Descending.
    #[serde(rename = "DESC")]
    Desc,
}

/// `@limit` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryLimit {
    /// Applied when the request gives no limit.
    pub default: Option<u64>,
    /// Upper bound for explicit limits.
    pub max: Option<u64>,
}

pub(crate) fn index_fields(fields: &[FieldDef]) -> FxHashMap<String, usize> {
    fields
        .iter()
        .enumerate()
        .map(|(idx, field)| (field.name.clone(), idx))
        .collect()
}

/// A node type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    /// Type name.
    pub name: String,
    /// Node labels; the first is primary. Defaults to the type name.
    pub labels: Vec<String>,
    /// Implemented interfaces.
    pub implements: Vec<String>,
    /// Federation key field sets.
    pub keys: Vec<Vec<String>>,
    /// Sort applied when a read gives none.
    pub default_sort: Vec<(String, SortDirection)>,
    /// `@limit` bounds.
    pub limit: Option<QueryLimit>,
    /// Root field name override.
    pub plural: Option<String>,
    /// Entity rules, including those inherited from interfaces after build.
    pub authorization: Vec<AuthorizationRule>,
    /// Operations requiring an authenticated caller.
    pub authentication: Option<AuthenticationRule>,
    /// Ordered fields, including derived connection/aggregate fields.
    pub fields: Vec<FieldDef>,
    pub(crate) field_index: FxHashMap<String, usize>,
}

impl EntityDef {
    /// Empty entity labelled with its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: vec![name.clone()],
            name,
            implements: Vec::new(),
            keys: Vec::new(),
            default_sort: Vec::new(),
            limit: None,
            plural: None,
            authorization: Vec::new(),
            authentication: None,
            fields: Vec::new(),
            field_index: FxHashMap::default(),
        }
    }

    /// Appends a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.field_index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        self
    }

    /// Replaces the label list.
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Declares an implemented interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Declares a federation key.
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Attaches an entity-level authorization rule.
    pub fn rule(mut self, rule: AuthorizationRule) -> Self {
        self.authorization.push(rule);
        self
    }

    /// Requires authentication for the given rule's operations.
    pub fn authentication(mut self, rule: AuthenticationRule) -> Self {
        self.authentication = Some(rule);
        self
    }

    /// Sets `@limit`.
    pub fn limit(mut self, default: Option<u64>, max: Option<u64>) -> Self {
        self.limit = Some(QueryLimit { default, max });
        self
    }

    /// Adds a default sort key.
    pub fn default_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.default_sort.push((field.into(), direction));
        self
    }

    /// Overrides the pluralised root field name.
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    /// Primary label.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or(&self.name)
    }

    /// Field by name.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.field_index.get(name).map(|&idx| &self.fields[idx])
    }

    /// Fields declared unique or used as keys.
    pub fn is_unique_field(&self, name: &str) -> bool {
        let unique = self
            .field_def(name)
            .and_then(FieldDef::as_scalar)
            .map(|s| s.unique)
            .unwrap_or(false);
        unique || self.keys.iter().any(|key| key.len() == 1 && key[0] == name)
    }

    /// Relationship fields in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDef> {
        self.fields.iter().filter_map(FieldDef::as_relationship)
    }

    pub(crate) fn reindex(&mut self) {
        self.field_index = index_fields(&self.fields);
    }
}

impl FieldSource for EntityDef {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn lookup_field(&self, name: &str) -> Option<&FieldDef> {
        self.field_def(name)
    }
}

/// An interface implemented by entities.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    /// Type name.
    pub name: String,
    /// Declared fields; implementers must declare each of them.
    pub fields: Vec<FieldDef>,
    /// Rules inherited by every implementer.
    pub authorization: Vec<AuthorizationRule>,
    /// Root field name override.
    pub plural: Option<String>,
    /// Implementing entities, filled by the builder.
    pub implementers: Vec<String>,
    pub(crate) field_index: FxHashMap<String, usize>,
}

impl InterfaceDef {
    /// Empty interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            authorization: Vec::new(),
            plural: None,
            implementers: Vec::new(),
            field_index: FxHashMap::default(),
        }
    }

    /// Appends a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.field_index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        self
    }

    /// Attaches a rule inherited by implementers.
    pub fn rule(mut self, rule: AuthorizationRule) -> Self {
        self.authorization.push(rule);
        self
    }

    /// Overrides the pluralised root field name.
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    pub(crate) fn reindex(&mut self) {
        self.field_index = index_fields(&self.fields);
    }
}

impl FieldSource for InterfaceDef {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn lookup_field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index.get(name).map(|&idx| &self.fields[idx])
    }
}

/// A union of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    /// Type name.
    pub name: String,
    /// Member entities.
    pub members: Vec<String>,
    /// Root field name override.
    pub plural: Option<String>,
}

impl UnionDef {
    /// Union over `members`.
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            plural: None,
        }
    }
}

/// Properties carried by relationships of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesDef {
    /// Type name.
    pub name: String,
    /// Scalar fields stored on the edge.
    pub fields: Vec<FieldDef>,
    /// Rules composed with the parent relationship's rules.
    pub authorization: Vec<AuthorizationRule>,
    pub(crate) field_index: FxHashMap<String, usize>,
}

impl PropertiesDef {
    /// Empty properties type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            authorization: Vec::new(),
            field_index: FxHashMap::default(),
        }
    }

    /// Appends a scalar field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.field_index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        self
    }

    /// Attaches a rule applied alongside the relationship.
    pub fn rule(mut self, rule: AuthorizationRule) -> Self {
        self.authorization.push(rule);
        self
    }
}

impl FieldSource for PropertiesDef {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn lookup_field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index.get(name).map(|&idx| &self.fields[idx])
    }
}
