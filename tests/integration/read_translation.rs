mod common;

use graphql_cypher::{
    Claims, SelectionBuilder, SelectionField, Translator, TranslatorConfig, Value,
};
use serde_json::json;

use common::{movie_schema, translate};

#[test]
fn root_read_filters_sorts_and_traverses() {
    let field = SelectionBuilder::new("movies")
        .arg("where", json!({ "title_STARTS_WITH": "The" }))
        .arg("sort", json!([{ "title": "ASC" }]))
        .arg("limit", json!(10))
        .field("title")
        .child(SelectionBuilder::new("actors").field("name"))
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        [
            "MATCH (this:Movie)",
            "WHERE this.title STARTS WITH $param0",
            "WITH *",
            "ORDER BY this.title ASC",
            "LIMIT $param1",
            "CALL {",
            "    WITH this",
            "    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)",
            "    RETURN collect(this1 { .name }) AS var2",
            "}",
            "RETURN this { .title, actors: var2 } AS this",
        ]
        .join("\n")
    );
    assert_eq!(statement.param("param0"), Some(&Value::from("The")));
    assert_eq!(statement.param("param1"), Some(&Value::Int(10)));
    assert_eq!(statement.params_json()["param1"], json!(10));
}

#[test]
fn interface_read_unions_every_implementation() {
    let field = SelectionBuilder::new("productions")
        .arg("sort", json!([{ "title": "ASC" }]))
        .field("title")
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        "CALL {\n    MATCH (this1:Movie)\n    RETURN this1 { __typename: \"Movie\", .title } AS this, this1.title AS var0\n    UNION\n    MATCH (this2:Series)\n    RETURN this2 { __typename: \"Series\", .title } AS this, this2.title AS var0\n}\nWITH *\nORDER BY var0 ASC\nRETURN this AS this"
    );
}

#[test]
fn aggregate_root_counts_matching_nodes() {
    let field = SelectionBuilder::new("moviesAggregate")
        .arg("where", json!({ "runtime_GT": 60 }))
        .field("count")
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        "MATCH (this:Movie)\nWHERE this.runtime > $param0\nRETURN { count: count(this) } AS this"
    );
}

#[test]
fn selection_parsed_from_json_translates_like_a_built_one() {
    let parsed = SelectionField::from_json(json!({
        "name": "movies",
        "arguments": { "where": { "title": "Heat" } },
        "selection": [{ "name": "title" }]
    }))
    .expect("parsed");
    let built = SelectionBuilder::new("movies")
        .arg("where", json!({ "title": "Heat" }))
        .field("title")
        .build()
        .expect("built");
    let translator = Translator::with_defaults(movie_schema());
    let claims = Claims::anonymous();
    let a = translator.translate(&parsed, &claims).expect("parsed statement");
    let b = translator.translate(&built, &claims).expect("built statement");
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn unknown_roots_and_fields_are_rejected() {
    let claims = Claims::anonymous();
    let translator = Translator::with_defaults(movie_schema());

    let field = SelectionBuilder::new("films").field("title").build().expect("field");
    let err = translator.translate(&field, &claims).unwrap_err();
    assert_eq!(err.code(), "UnknownRootField");

    let field = SelectionBuilder::new("movies").field("budget").build().expect("field");
    let err = translator.translate(&field, &claims).unwrap_err();
    assert_eq!(err.code(), "UnknownField");

    let field = SelectionBuilder::new("movies")
        .arg("where", json!({ "budget_GT": 1 }))
        .field("title")
        .build()
        .expect("field");
    let err = translator.translate(&field, &claims).unwrap_err();
    assert_eq!(err.code(), "UnknownFilterField");
}

#[test]
fn selection_depth_is_bounded() {
    let config = TranslatorConfig {
        max_selection_depth: 2,
        ..TranslatorConfig::default()
    };
    let translator = Translator::new(movie_schema(), config);
    let field = SelectionBuilder::new("movies")
        .child(
            SelectionBuilder::new("actors")
                .child(SelectionBuilder::new("movies").field("title")),
        )
        .build()
        .expect("field");
    let err = translator.translate(&field, &Claims::anonymous()).unwrap_err();
    assert_eq!(err.code(), "DepthExceeded");
}
