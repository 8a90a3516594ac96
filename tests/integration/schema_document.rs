use std::fs;

use graphql_cypher::schema::RootField;
use graphql_cypher::{
    Claims, SchemaDocument, SelectionBuilder, Translator, TranslatorConfig, Value,
};
use serde_json::json;

const BOOKS: &str = r#"
[[entities]]
name = "Book"
keys = ["isbn"]
fields = [
    { name = "isbn", type = "String!", unique = true },
    { name = "title", type = "String" },
    { name = "createdAt", type = "DateTime", timestamp = ["CREATE"] },
    { name = "stock", type = "Int", default = 0 },
    { name = "author", type = "Author", relationship = { type = "WROTE", direction = "IN" } },
]

[[entities]]
name = "Author"
fields = [
    { name = "name", type = "String!" },
    { name = "books", type = "[Book!]!", relationship = { type = "WROTE", direction = "OUT" } },
]
"#;

fn translator_from_disk() -> Translator {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema_path = dir.path().join("schema.toml");
    let config_path = dir.path().join("translator.toml");
    fs::write(&schema_path, BOOKS).expect("write schema");
    fs::write(&config_path, "[translator]\nmax_mutation_depth = 4\n").expect("write config");

    let text = fs::read_to_string(&schema_path).expect("read schema");
    let schema = SchemaDocument::from_toml(&text)
        .expect("parse")
        .into_schema()
        .expect("schema");
    let config = TranslatorConfig::load(&config_path).expect("config");
    assert_eq!(config.max_mutation_depth, 4);
    Translator::new(schema, config)
}

#[test]
fn toml_document_exposes_root_fields() {
    let translator = translator_from_disk();
    let schema = translator.schema();
    assert!(matches!(schema.root_field("createBooks"), Some(RootField::Create(name)) if name == "Book"));
    assert!(matches!(schema.root_field("authorsAggregate"), Some(RootField::Aggregate(_))));
    assert!(schema.root_field("bookAuthors").is_none());
}

#[test]
fn generated_values_come_from_the_document() {
    let translator = translator_from_disk();
    let field = SelectionBuilder::new("createBooks")
        .arg("input", json!([{ "isbn": "978-0441013593", "title": "Dune" }]))
        .child(SelectionBuilder::new("books").field("title"))
        .build()
        .expect("field");
    let statement = translator.translate(&field, &Claims::anonymous()).expect("statement");
    assert!(
        statement.text.contains(
            "SET this0.isbn = $param0, this0.title = $param1, this0.createdAt = datetime(), this0.stock = $param2"
        ),
        "{}",
        statement.text
    );
    assert_eq!(statement.param("param2"), Some(&Value::Int(0)));
}

#[test]
fn federation_representations_resolve_by_key() {
    let translator = translator_from_disk();
    let selection = SelectionBuilder::new("_entities").field("title").build().expect("selection");
    let representations = vec![
        Value::from_json(json!({ "__typename": "Book", "isbn": "978-0441013593" })).expect("repr"),
    ];
    let statements = translator
        .translate_entities(&representations, &selection, &Claims::anonymous())
        .expect("statements");
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].text,
        "MATCH (this:Book)\nWHERE this.isbn = $param0\nRETURN this { .title } AS this"
    );
}

#[test]
fn malformed_documents_are_rejected() {
    let err = SchemaDocument::from_json(r#"{ "entities": [{ "name": "Book", "fields": [{ "name": "x", "type": "[Int" }] }] }"#)
        .expect("parse")
        .into_schema()
        .unwrap_err();
    assert_eq!(err.code(), "InvalidDocument");

    let err = SchemaDocument::from_json(r#"{ "entities": [], "scalars": [] }"#).unwrap_err();
    assert_eq!(err.code(), "InvalidDocument");

    let err = SchemaDocument::from_json(
        r#"{ "entities": [{ "name": "Book", "fields": [{ "name": "shelf", "type": "Shelf", "relationship": { "type": "ON", "direction": "OUT" } }] }] }"#,
    )
    .expect("parse")
    .into_schema()
    .unwrap_err();
    assert_eq!(err.code(), "UnknownRelationshipTarget");
}
