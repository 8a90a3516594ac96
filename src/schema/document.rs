//! Serialized schema metadata.
//!
//! A [`SchemaDocument`] is the JSON or TOML form of the metadata the schema
//! expansion phase produces. Field types use GraphQL notation (`"[Actor!]!"`);
//! everything else mirrors the builder API one to one.

use serde::Deserialize;

use super::auth::{AuthOperation, AuthenticationRule, AuthorizationRule, ValidationPhase};
use super::builder::SchemaBuilder;
use super::entity::{
    CypherReturn, EntityDef, FieldDef, InterfaceDef, PropertiesDef, ScalarType, SortDirection,
    UnionDef,
};
use super::relationship::Direction;
use super::Schema;
use crate::error::{SchemaError, SchemaResult};
use crate::value::Value;

/// Root of a serialized schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchemaDocument {
    /// Node types.
    #[serde(default)]
    pub entities: Vec<EntityDocument>,
    /// Interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceDocument>,
    /// Unions.
    #[serde(default)]
    pub unions: Vec<UnionDocument>,
    /// Relationship-properties types.
    #[serde(default)]
    pub relationship_properties: Vec<PropertiesDocument>,
    /// Enum types; values are stored as strings.
    #[serde(default)]
    pub enums: Vec<EnumDocument>,
}

/// Serialized entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct EntityDocument {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    /// Each key is a space-separated field list, as in `@key(fields: "id sku")`.
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub default_sort: Vec<SortDocument>,
    #[serde(default)]
    pub limit: Option<LimitDocument>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub authorization: Vec<RuleDocument>,
    #[serde(default)]
    pub authentication: Option<AuthenticationDocument>,
    pub fields: Vec<FieldDocument>,
}

/// Serialized interface.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct InterfaceDocument {
    pub name: String,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub authorization: Vec<RuleDocument>,
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
}

/// Serialized union.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct UnionDocument {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub plural: Option<String>,
}

/// Serialized relationship-properties type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct PropertiesDocument {
    pub name: String,
    #[serde(default)]
    pub authorization: Vec<RuleDocument>,
    pub fields: Vec<FieldDocument>,
}

/// Serialized enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct EnumDocument {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct SortDocument {
    pub field: String,
    #[serde(default = "ascending")]
    pub direction: SortDirection,
}

fn ascending() -> SortDirection {
    SortDirection::Asc
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct LimitDocument {
    #[serde(default)]
    pub default: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

/// Serialized field. Exactly one of `relationship`/`cypher` may be present;
/// neither makes it a stored scalar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct FieldDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub relationship: Option<RelationshipDocument>,
    #[serde(default)]
    pub cypher: Option<CypherDocument>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub timestamp: Option<Vec<TimestampEvent>>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub authorization: Vec<RuleDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct RelationshipDocument {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    #[serde(default)]
    pub properties: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct CypherDocument {
    pub statement: String,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum TimestampEvent {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum RuleModeDocument {
    Filter,
    Validate,
}

/// Serialized `@authorization` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[allow(missing_docs)]
pub struct RuleDocument {
    pub mode: RuleModeDocument,
    #[serde(default)]
    pub operations: Vec<AuthOperation>,
    #[serde(default)]
    pub when: Vec<ValidationPhase>,
    #[serde(default = "required_by_default")]
    pub require_authentication: bool,
    #[serde(default, rename = "where")]
    pub filter: Option<Value>,
}

fn required_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct AuthenticationDocument {
    #[serde(default)]
    pub operations: Vec<AuthOperation>,
}

struct TypeRef<'a> {
    base: &'a str,
    list: bool,
    required: bool,
}

fn parse_type_ref(text: &str) -> Option<TypeRef<'_>> {
    let text = text.trim();
    let (inner, required) = match text.strip_suffix('!') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    if let Some(listed) = inner.strip_prefix('[') {
        let element = listed.strip_suffix(']')?.trim();
        let base = element.strip_suffix('!').unwrap_or(element);
        return valid_name(base).then_some(TypeRef {
            base,
            list: true,
            required,
        });
    }
    valid_name(inner).then_some(TypeRef {
        base: inner,
        list: false,
        required,
    })
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDocument {
        reason: reason.into(),
    }
}

impl SchemaDocument {
    /// Parses a JSON document.
    pub fn from_json(text: &str) -> SchemaResult<Self> {
        serde_json::from_str(text).map_err(|err| invalid(err.to_string()))
    }

    /// Parses a TOML document.
    pub fn from_toml(text: &str) -> SchemaResult<Self> {
        toml::from_str(text).map_err(|err| invalid(err.to_string()))
    }

    /// Converts the document into validated schema metadata.
    pub fn into_schema(self) -> SchemaResult<Schema> {
        let enums: Vec<String> = self.enums.iter().map(|e| e.name.clone()).collect();
        let scalar_of = |name: &str| -> Option<ScalarType> {
            ScalarType::builtin(name).or_else(|| {
                enums
                    .iter()
                    .any(|e| e == name)
                    .then(|| ScalarType::Enum(name.to_owned()))
            })
        };

        let mut builder = SchemaBuilder::new();
        for doc in self.relationship_properties {
            let mut props = PropertiesDef::new(doc.name.clone());
            for field in doc.fields {
                props = props.field(convert_field(&doc.name, field, &scalar_of)?);
            }
            for rule in doc.authorization {
                props = props.rule(convert_rule(rule));
            }
            builder = builder.properties(props);
        }
        for doc in self.interfaces {
            let mut interface = InterfaceDef::new(doc.name.clone());
            if let Some(plural) = doc.plural {
                interface = interface.plural(plural);
            }
            for field in doc.fields {
                interface = interface.field(convert_field(&doc.name, field, &scalar_of)?);
            }
            for rule in doc.authorization {
                interface = interface.rule(convert_rule(rule));
            }
            builder = builder.interface(interface);
        }
        for doc in self.entities {
            builder = builder.entity(convert_entity(doc, &scalar_of)?);
        }
        for doc in self.unions {
            let mut union = UnionDef::new(doc.name, doc.members);
            union.plural = doc.plural;
            builder = builder.union(union);
        }
        builder.build()
    }
}

fn convert_entity(
    doc: EntityDocument,
    scalar_of: &dyn Fn(&str) -> Option<ScalarType>,
) -> SchemaResult<EntityDef> {
    let mut entity = EntityDef::new(doc.name.clone());
    if !doc.labels.is_empty() {
        entity = entity.labels(doc.labels);
    }
    for interface in doc.implements {
        entity = entity.implements(interface);
    }
    for key in doc.keys {
        let fields: Vec<&str> = key.split_whitespace().collect();
        if fields.is_empty() {
            return Err(SchemaError::InvalidKey {
                entity: doc.name.clone(),
                field: key.clone(),
            });
        }
        entity = entity.key(fields);
    }
    for sort in doc.default_sort {
        entity = entity.default_sort(sort.field, sort.direction);
    }
    if let Some(limit) = doc.limit {
        entity = entity.limit(limit.default, limit.max);
    }
    if let Some(plural) = doc.plural {
        entity = entity.plural(plural);
    }
    for rule in doc.authorization {
        entity = entity.rule(convert_rule(rule));
    }
    if let Some(auth) = doc.authentication {
        entity = entity.authentication(AuthenticationRule::new(auth.operations));
    }
    for field in doc.fields {
        entity = entity.field(convert_field(&doc.name, field, scalar_of)?);
    }
    Ok(entity)
}

fn convert_field(
    owner: &str,
    doc: FieldDocument,
    scalar_of: &dyn Fn(&str) -> Option<ScalarType>,
) -> SchemaResult<FieldDef> {
    let ty = parse_type_ref(&doc.ty).ok_or_else(|| {
        invalid(format!("field '{owner}.{}' has malformed type '{}'", doc.name, doc.ty))
    })?;
    let mut field = match (doc.relationship, doc.cypher) {
        (Some(_), Some(_)) => {
            return Err(invalid(format!(
                "field '{owner}.{}' cannot be both a relationship and a cypher field",
                doc.name
            )))
        }
        (Some(rel), None) => {
            let mut field =
                FieldDef::relationship(doc.name.clone(), ty.base, rel.rel_type, rel.direction);
            if !ty.list {
                field = field.one();
                if ty.required {
                    field = field.required();
                }
            }
            if let Some(props) = rel.properties {
                field = field.properties(props);
            }
            field
        }
        (None, Some(cypher)) => {
            let returns = match scalar_of(ty.base) {
                Some(scalar) => CypherReturn::Scalar(scalar),
                None => CypherReturn::Target(ty.base.to_owned()),
            };
            let field = FieldDef::cypher(doc.name.clone(), cypher.statement, cypher.column, returns);
            if ty.list {
                field.list()
            } else {
                field
            }
        }
        (None, None) => {
            let scalar = scalar_of(ty.base).ok_or_else(|| SchemaError::UnknownEntity {
                name: ty.base.to_owned(),
            })?;
            let mut field = FieldDef::scalar(doc.name.clone(), scalar);
            if ty.list {
                field = field.list();
            }
            if ty.required {
                field = field.required();
            }
            if doc.unique {
                field = field.unique();
            }
            if let Some(alias) = doc.alias {
                field = field.alias(alias);
            }
            if doc.id {
                field = field.autogenerate_id();
            }
            if let Some(events) = doc.timestamp {
                let on_create = events.is_empty() || events.contains(&TimestampEvent::Create);
                let on_update = events.is_empty() || events.contains(&TimestampEvent::Update);
                field = field.timestamp(on_create, on_update);
            }
            if let Some(default) = doc.default {
                field = field.default_value(default);
            }
            field
        }
    };
    for rule in doc.authorization {
        field = field.rule(convert_rule(rule));
    }
    Ok(field)
}

fn convert_rule(doc: RuleDocument) -> AuthorizationRule {
    let mut rule = match doc.mode {
        RuleModeDocument::Filter => AuthorizationRule::filter(doc.operations),
        RuleModeDocument::Validate => {
            let rule = AuthorizationRule::validate(doc.operations);
            if doc.when.is_empty() {
                rule
            } else {
                rule.when(doc.when)
            }
        }
    };
    if !doc.require_authentication {
        rule = rule.allow_unauthenticated();
    }
    if let Some(filter) = doc.filter {
        rule = rule.matching_value(filter);
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, RootField, TypeTarget};

    const MOVIES: &str = r#"{
        "entities": [
            {
                "name": "Movie",
                "keys": ["id"],
                "fields": [
                    { "name": "id", "type": "ID!", "id": true },
                    { "name": "title", "type": "String!" },
                    { "name": "genre", "type": "Genre" },
                    { "name": "actors", "type": "[Actor!]!",
                      "relationship": { "type": "ACTED_IN", "direction": "IN", "properties": "ActedIn" } },
                    { "name": "director", "type": "Person!",
                      "relationship": { "type": "DIRECTED", "direction": "IN" } }
                ]
            },
            {
                "name": "Actor",
                "fields": [
                    { "name": "name", "type": "String!" },
                    { "name": "movies", "type": "[Movie!]!",
                      "relationship": { "type": "ACTED_IN", "direction": "OUT", "properties": "ActedIn" } }
                ]
            },
            { "name": "Person", "fields": [ { "name": "name", "type": "String" } ] }
        ],
        "relationshipProperties": [
            { "name": "ActedIn", "fields": [ { "name": "role", "type": "String" } ] }
        ],
        "enums": [ { "name": "Genre", "values": ["DRAMA", "COMEDY"] } ]
    }"#;

    #[test]
    fn json_document_builds_schema() {
        let schema = SchemaDocument::from_json(MOVIES)
            .expect("parse")
            .into_schema()
            .expect("schema");
        let movie = schema.entity("Movie").expect("movie");
        let director = movie
            .field_def("director")
            .and_then(FieldDef::as_relationship)
            .expect("director");
        assert!(director.is_one());
        assert!(director.required);
        assert!(matches!(
            movie.field_def("genre").map(|f| &f.kind),
            Some(FieldKind::Scalar(s)) if s.ty == ScalarType::Enum("Genre".into())
        ));
        assert_eq!(movie.keys, vec![vec!["id".to_string()]]);
        assert_eq!(
            schema.root_field("movies"),
            Some(&RootField::Read(TypeTarget::Entity("Movie".into())))
        );
    }

    #[test]
    fn toml_document_with_rules() {
        let text = r#"
            [[entities]]
            name = "Post"
            fields = [{ name = "title", type = "String" }]

            [[entities.authorization]]
            mode = "VALIDATE"
            operations = ["CREATE"]
            where = { jwt = { roles_INCLUDES = "admin" } }
        "#;
        let schema = SchemaDocument::from_toml(text)
            .expect("parse")
            .into_schema()
            .expect("schema");
        let post = schema.entity("Post").expect("post");
        assert_eq!(post.authorization.len(), 1);
        assert!(post.authorization[0].predicate().is_some());
    }

    #[test]
    fn unknown_scalar_is_reported() {
        let text = r#"{ "entities": [ { "name": "A", "fields": [ { "name": "x", "type": "Money" } ] } ] }"#;
        let err = SchemaDocument::from_json(text)
            .expect("parse")
            .into_schema()
            .unwrap_err();
        assert_eq!(err.code(), "UnknownEntity");
    }

    #[test]
    fn malformed_documents_are_invalid() {
        let err = SchemaDocument::from_json(r#"{ "entitys": [] }"#).unwrap_err();
        assert_eq!(err.code(), "InvalidDocument");
        assert!(parse_type_ref("[Actor!").is_none());
        let list = parse_type_ref("[Actor!]!").expect("type");
        assert!(list.list && list.required);
        assert_eq!(list.base, "Actor");
    }
}
