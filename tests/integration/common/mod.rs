#![allow(dead_code)]

use graphql_cypher::schema::{
    AuthOperation, AuthenticationRule, AuthorizationRule, Direction, EntityDef, FieldDef,
    InterfaceDef, PropertiesDef, ScalarType,
};
use graphql_cypher::{
    Claims, CompiledStatement, Schema, SchemaBuilder, SelectionField, TranslateResult, Translator,
    TranslatorConfig, Value, ValueMap,
};

/// Movies, series and the actors playing in them; an actor has at most one
/// favourite movie.
pub fn movie_schema() -> Schema {
    SchemaBuilder::new()
        .interface(InterfaceDef::new("Production").field(FieldDef::scalar("title", ScalarType::String)))
        .entity(
            EntityDef::new("Movie")
                .implements("Production")
                .field(FieldDef::scalar("id", ScalarType::Id).autogenerate_id())
                .field(FieldDef::scalar("title", ScalarType::String))
                .field(FieldDef::scalar("runtime", ScalarType::Int))
                .field(
                    FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming)
                        .properties("ActedIn"),
                ),
        )
        .entity(
            EntityDef::new("Series")
                .implements("Production")
                .field(FieldDef::scalar("title", ScalarType::String))
                .field(FieldDef::scalar("episodes", ScalarType::Int)),
        )
        .entity(
            EntityDef::new("Actor")
                .field(FieldDef::scalar("name", ScalarType::String).unique())
                .field(
                    FieldDef::relationship("movies", "Movie", "ACTED_IN", Direction::Outgoing)
                        .properties("ActedIn"),
                )
                .field(FieldDef::relationship("favourite", "Movie", "LIKES", Direction::Outgoing).one()),
        )
        .properties(PropertiesDef::new("ActedIn").field(FieldDef::scalar("role", ScalarType::String)))
        .build()
        .expect("movie schema")
}

/// Posts owned by their author, editable by admins, deletable only when
/// signed in.
pub fn post_schema() -> Schema {
    SchemaBuilder::new()
        .entity(
            EntityDef::new("Post")
                .field(FieldDef::scalar("title", ScalarType::String))
                .field(FieldDef::scalar("author", ScalarType::String))
                .rule(
                    AuthorizationRule::filter([AuthOperation::Read])
                        .matching(serde_json::json!({ "node": { "author": "$jwt.sub" } })),
                )
                .rule(
                    AuthorizationRule::validate([AuthOperation::Update])
                        .matching(serde_json::json!({ "jwt": { "roles_INCLUDES": "admin" } })),
                )
                .rule(
                    AuthorizationRule::validate([AuthOperation::Create])
                        .matching(serde_json::json!({ "node": { "author": "$jwt.sub" } })),
                )
                .authentication(AuthenticationRule::new([AuthOperation::Delete])),
        )
        .build()
        .expect("post schema")
}

pub fn user(sub: &str, roles: &[&str]) -> Claims {
    let mut jwt = ValueMap::new();
    jwt.insert("sub".into(), Value::from(sub));
    jwt.insert(
        "roles".into(),
        Value::List(roles.iter().map(|role| Value::from(*role)).collect()),
    );
    Claims::authenticated(jwt)
}

pub fn translate(schema: Schema, field: &SelectionField, claims: &Claims) -> TranslateResult<CompiledStatement> {
    Translator::new(schema, TranslatorConfig::default()).translate(field, claims)
}
