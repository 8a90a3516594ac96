mod common;

use graphql_cypher::{Claims, SelectionBuilder, Translator, TranslatorConfig, Value};
use serde_json::json;

use common::{movie_schema, translate};

#[test]
fn create_returns_projected_nodes() {
    let field = SelectionBuilder::new("createMovies")
        .arg("input", json!([{ "title": "Heat", "runtime": 170 }]))
        .child(SelectionBuilder::new("movies").fields(["id", "title"]))
        .child(SelectionBuilder::new("info").field("nodesCreated"))
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        [
            "CALL {",
            "    CREATE (this0:Movie)",
            "    SET this0.title = $param0, this0.runtime = $param1, this0.id = randomUUID()",
            "    RETURN this0",
            "}",
            "RETURN [this0 { .id, .title }] AS data",
        ]
        .join("\n")
    );
    assert_eq!(statement.param("param1"), Some(&Value::Int(170)));
}

#[test]
fn create_many_runs_one_subquery_per_node() {
    let field = SelectionBuilder::new("createMovies")
        .arg("input", json!([{ "title": "Heat" }, { "title": "Ronin" }]))
        .child(SelectionBuilder::new("movies").field("title"))
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(statement.text.matches("CALL {").count(), 2);
    assert!(statement.text.ends_with("RETURN [this0 { .title }, this1 { .title }] AS data"), "{}", statement.text);
}

/// Variables introduced by node or edge patterns and by `AS` aliases.
fn declared_variables(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for (open, prefix) in [("(", "this"), ("[", "this"), ("AS ", "var")] {
        let marker = format!("{open}{prefix}");
        for (at, _) in text.match_indices(&marker) {
            let rest = &text[at + marker.len()..];
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                continue;
            }
            let declared = open == "AS " || rest[digits.len()..].starts_with(':');
            if declared {
                found.push(format!("{prefix}{digits}"));
            }
        }
    }
    found
}

#[test]
fn deep_nested_creates_never_reuse_a_variable() {
    let mut node = json!({ "name": "Level 5" });
    for level in (1..5).rev() {
        node = if level % 2 == 1 {
            json!({ "name": format!("Level {level}"), "movies": { "create": [{ "node": node }] } })
        } else {
            json!({ "title": format!("Level {level}"), "actors": { "create": [{ "node": node }] } })
        };
    }
    let root = json!({ "title": "Level 0", "actors": { "create": [{ "node": node }] } });
    let field = SelectionBuilder::new("createMovies")
        .arg("input", json!([root]))
        .child(SelectionBuilder::new("movies").field("title"))
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");

    let declared = declared_variables(&statement.text);
    let mut unique = declared.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(declared.len(), unique.len(), "{}", statement.text);
    assert_eq!(statement.text.matches(":Movie)").count(), 3, "{}", statement.text);
    assert_eq!(statement.text.matches(":Actor)").count(), 3, "{}", statement.text);
    assert_eq!(statement.text.matches(":ACTED_IN]").count(), 5, "{}", statement.text);
}

#[test]
fn update_applies_modifiers_and_nested_connects() {
    let field = SelectionBuilder::new("updateMovies")
        .arg("where", json!({ "title": "Heat" }))
        .arg("update", json!({ "runtime_INCREMENT": 5 }))
        .arg("connect", json!({ "actors": [{ "where": { "node": { "name": "Al Pacino" } }, "edge": { "role": "Hanna" } }] }))
        .child(SelectionBuilder::new("movies").field("title"))
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        [
            "MATCH (this:Movie)",
            "WHERE this.title = $param0",
            "SET this.runtime = this.runtime + $param1",
            "WITH *",
            "CALL {",
            "    WITH this",
            "    MATCH (this0:Actor)",
            "    WHERE this0.name = $param2",
            "    MERGE (this)<-[this1:ACTED_IN]-(this0)",
            "    SET this1.role = $param3",
            "    RETURN count(*) AS var2",
            "}",
            "RETURN collect(DISTINCT this { .title }) AS data",
        ]
        .join("\n")
    );
}

#[test]
fn delete_detaches_matched_nodes() {
    let field = SelectionBuilder::new("deleteMovies")
        .arg("where", json!({ "title": "Heat" }))
        .field("nodesDeleted")
        .build()
        .expect("field");
    let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
    assert_eq!(
        statement.text,
        "MATCH (this:Movie)\nWHERE this.title = $param0\nWITH DISTINCT this\nDETACH DELETE this"
    );
}

#[test]
fn malformed_inputs_fail_before_any_text_is_built() {
    let translator = Translator::with_defaults(movie_schema());
    let claims = Claims::anonymous();

    let generated = SelectionBuilder::new("createMovies")
        .arg("input", json!([{ "id": "m1", "title": "Heat" }]))
        .build()
        .expect("field");
    assert_eq!(translator.translate(&generated, &claims).unwrap_err().code(), "InvalidInput");

    let non_unique = SelectionBuilder::new("updateActors")
        .arg(
            "connectOrCreate",
            json!({ "movies": [{ "where": { "node": { "title": "Heat" } }, "onCreate": { "node": { "title": "Heat" } } }] }),
        )
        .build()
        .expect("field");
    assert_eq!(
        translator.translate(&non_unique, &claims).unwrap_err().code(),
        "NonUniqueConnectOrCreate"
    );

    let missing = SelectionBuilder::new("createMovies").build().expect("field");
    assert_eq!(translator.translate(&missing, &claims).unwrap_err().code(), "InvalidArgument");
}

#[test]
fn mutation_depth_is_bounded() {
    let config = TranslatorConfig {
        max_mutation_depth: 1,
        ..TranslatorConfig::default()
    };
    let translator = Translator::new(movie_schema(), config);
    let field = SelectionBuilder::new("createMovies")
        .arg(
            "input",
            json!([{ "title": "Heat", "actors": { "create": [{ "node": { "name": "Al" } }] } }]),
        )
        .build()
        .expect("field");
    let err = translator.translate(&field, &Claims::anonymous()).unwrap_err();
    assert_eq!(err.code(), "DepthExceeded");
}

const FAVOURITE_GUARD: &str =
    "ConstraintViolation: Actor.favourite must be connected at most once";

#[test]
fn every_attaching_path_guards_one_relationships() {
    let nested_connect = SelectionBuilder::new("updateMovies")
        .arg(
            "connect",
            json!({ "actors": [{
                "where": { "node": { "name": "Keanu" } },
                "connect": { "favourite": [{ "where": { "node": { "title": "Heat" } } }] }
            }] }),
        )
        .build()
        .expect("nested connect");
    let connect_or_create = SelectionBuilder::new("updateActors")
        .arg("where", json!({ "name": "Keanu" }))
        .arg(
            "connectOrCreate",
            json!({ "favourite": [{
                "where": { "node": { "id": "m1" } },
                "onCreate": { "node": { "title": "Heat" } }
            }] }),
        )
        .build()
        .expect("connect or create");
    let create = SelectionBuilder::new("createActors")
        .arg(
            "input",
            json!([{
                "name": "Keanu",
                "favourite": { "connect": [{ "where": { "node": { "title": "Heat" } } }] }
            }]),
        )
        .child(SelectionBuilder::new("actors").field("name"))
        .build()
        .expect("create");

    for field in [nested_connect, connect_or_create, create] {
        let statement = translate(movie_schema(), &field, &Claims::anonymous()).expect("statement");
        assert_eq!(statement.text.matches(FAVOURITE_GUARD).count(), 1, "{}", statement.text);
        assert!(
            statement.text.contains("COUNT { MATCH (this") && statement.text.contains(")-[:LIKES]->(:Movie) } <= 1"),
            "{}",
            statement.text
        );
    }
}
