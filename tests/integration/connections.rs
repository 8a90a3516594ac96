mod common;

use graphql_cypher::cursor::{decode_cursor, encode_cursor};
use graphql_cypher::{Claims, SelectionBuilder, Value};
use serde_json::json;

use common::{movie_schema, translate};

#[test]
fn root_connection_pages_after_the_cursor() {
    let field = SelectionBuilder::new("moviesConnection")
        .arg("first", json!(2))
        .arg("after", json!(encode_cursor(3)))
        .arg("sort", json!([{ "title": "DESC" }]))
        .child(SelectionBuilder::new("edges").child(SelectionBuilder::new("node").field("title")))
        .field("totalCount")
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    let text = &statement.text;
    assert!(text.starts_with("MATCH (this:Movie)\nWITH collect({ node: this }) AS var0\nWITH var0, size(var0) AS var1\n"), "{text}");
    assert!(text.contains("SKIP $param0\n    LIMIT $param1"), "{text}");
    assert!(text.ends_with("RETURN { edges: var3, totalCount: var1 } AS this"), "{text}");
    assert_eq!(statement.param("param0"), Some(&Value::Int(4)));
    assert_eq!(statement.param("param1"), Some(&Value::Int(2)));
}

#[test]
fn total_count_alone_skips_the_page() {
    let field = SelectionBuilder::new("moviesConnection")
        .field("totalCount")
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        "MATCH (this:Movie)\nWITH collect({ node: this }) AS var0\nWITH var0, size(var0) AS var1\nRETURN { totalCount: var1 } AS this"
    );
}

#[test]
fn nested_connection_projects_edge_properties() {
    let field = SelectionBuilder::new("movies")
        .field("title")
        .child(
            SelectionBuilder::new("actorsConnection")
                .arg("where", json!({ "edge": { "role": "Neo" } }))
                .child(
                    SelectionBuilder::new("edges")
                        .child(SelectionBuilder::new("node").field("name"))
                        .child(SelectionBuilder::new("properties").field("role")),
                ),
        )
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    let text = &statement.text;
    assert!(text.contains("    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    WHERE this0.role = $param0\n"), "{text}");
    assert!(text.contains("properties: this0 { .role }"), "{text}");
    assert_eq!(statement.param("param0"), Some(&Value::from("Neo")));
}

#[test]
fn malformed_cursors_are_rejected() {
    let field = SelectionBuilder::new("moviesConnection")
        .arg("after", json!("not a cursor"))
        .field("totalCount")
        .build()
        .expect("field");
    let err = translate(movie_schema(), &field, &Claims::anonymous()).unwrap_err();
    assert_eq!(err.code(), "InvalidCursor");
    assert_eq!(decode_cursor(&encode_cursor(41)).expect("cursor"), 41);
}
