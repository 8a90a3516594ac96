mod common;

use graphql_cypher::schema::{AuthOperation, AuthorizationRule, EntityDef, FieldDef, ScalarType};
use graphql_cypher::{Claims, SchemaBuilder, SelectionBuilder, Translator, TranslatorConfig, Value};
use serde_json::json;

use common::{post_schema, translate, user};

#[test]
fn read_filter_scopes_rows_to_the_caller() {
    let field = SelectionBuilder::new("posts").field("title").build().expect("field");
    let statement = translate(post_schema(), &field, &user("alice", &[])).expect("statement");
    assert_eq!(
        statement.text,
        "MATCH (this:Post)\nWHERE $isAuthenticated = true AND $param0 IS NOT NULL AND this.author = $param0\nRETURN this { .title } AS this"
    );
    assert_eq!(statement.param("param0"), Some(&Value::from("alice")));
    assert_eq!(statement.param("isAuthenticated"), Some(&Value::Bool(true)));
}

#[test]
fn anonymous_reads_are_filtered_not_rejected() {
    let field = SelectionBuilder::new("posts").field("title").build().expect("field");
    let statement = translate(post_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(statement.param("isAuthenticated"), Some(&Value::Bool(false)));
    assert_eq!(statement.param("param0"), Some(&Value::Null));
}

#[test]
fn claims_only_rules_are_decided_before_execution() {
    let field = SelectionBuilder::new("updatePosts")
        .arg("update", json!({ "title": "Edited" }))
        .build()
        .expect("field");

    let err = translate(post_schema(), &field, &user("bob", &["viewer"])).unwrap_err();
    assert_eq!(err.code(), "Forbidden");
    assert!(err.is_forbidden());

    let statement = translate(post_schema(), &field, &user("bob", &["admin"])).expect("statement");
    assert!(!statement.text.contains("validatePredicate"), "{}", statement.text);
}

#[test]
fn node_rules_become_runtime_guards() {
    let field = SelectionBuilder::new("createPosts")
        .arg("input", json!([{ "title": "Hello", "author": "alice" }]))
        .child(SelectionBuilder::new("posts").field("title"))
        .build()
        .expect("field");
    let statement = translate(post_schema(), &field, &user("alice", &[])).expect("statement");
    assert!(
        statement.text.contains("    WITH *\n    WHERE apoc.util.validatePredicate(NOT ("),
        "{}",
        statement.text
    );
    assert!(statement.text.contains("\"Forbidden\", [0])"), "{}", statement.text);

    let lenient = Translator::new(
        post_schema(),
        TranslatorConfig {
            runtime_guards: false,
            ..TranslatorConfig::default()
        },
    );
    let statement = lenient.translate(&field, &user("alice", &[])).expect("statement");
    assert!(!statement.text.contains("validatePredicate"), "{}", statement.text);
}

#[test]
fn deletes_require_a_token() {
    let field = SelectionBuilder::new("deletePosts")
        .arg("where", json!({ "title": "Hello" }))
        .build()
        .expect("field");
    let err = translate(post_schema(), &field, &Claims::anonymous()).unwrap_err();
    assert_eq!(err.code(), "Unauthenticated");
    assert!(translate(post_schema(), &field, &user("alice", &[])).is_ok());
}

#[test]
fn create_without_the_required_role_is_one_forbidden_error() {
    let schema = SchemaBuilder::new()
        .entity(
            EntityDef::new("Movie")
                .field(FieldDef::scalar("title", ScalarType::String))
                .rule(
                    AuthorizationRule::validate([AuthOperation::Create])
                        .matching(json!({ "jwt": { "roles_INCLUDES": "admin" } })),
                ),
        )
        .build()
        .expect("schema");
    let field = SelectionBuilder::new("createMovies")
        .arg("input", json!([{ "title": "Heat" }, { "title": "Ronin" }]))
        .child(SelectionBuilder::new("movies").field("title"))
        .build()
        .expect("field");

    let err = translate(schema.clone(), &field, &user("bob", &["viewer"])).unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(err.to_string(), "Forbidden");

    let statement = translate(schema, &field, &user("ann", &["admin"])).expect("statement");
    assert_eq!(statement.text.matches("CREATE (").count(), 2);
}

#[test]
fn independent_filter_rules_are_conjoined() {
    let schema = SchemaBuilder::new()
        .entity(
            EntityDef::new("Post")
                .field(FieldDef::scalar("title", ScalarType::String))
                .field(FieldDef::scalar("author", ScalarType::String))
                .rule(
                    AuthorizationRule::filter([AuthOperation::Read])
                        .matching(json!({ "node": { "author": "$jwt.sub" } })),
                )
                .rule(
                    AuthorizationRule::filter([AuthOperation::Read])
                        .matching(json!({ "node": { "title_STARTS_WITH": "Public" } })),
                ),
        )
        .build()
        .expect("schema");
    let field = SelectionBuilder::new("posts").field("title").build().expect("field");
    let statement = translate(schema, &field, &user("alice", &[])).expect("statement");
    let filter = statement
        .text
        .lines()
        .find(|line| line.starts_with("WHERE "))
        .expect("where line");
    assert!(filter.contains("this.author = $param0"), "{filter}");
    assert!(filter.contains("this.title STARTS WITH $param1"), "{filter}");
    assert!(!filter.contains(" OR "), "{filter}");
    assert_eq!(statement.param("param1"), Some(&Value::from("Public")));
}
