use graphql_cypher::cursor::{decode_cursor, encode_cursor, PageWindow};
use graphql_cypher::schema::{Direction, EntityDef, FieldDef, ScalarType};
use graphql_cypher::{Claims, SchemaBuilder, SelectionBuilder, Translator, Value};
use proptest::prelude::*;
use serde_json::json;

fn translator() -> Translator {
    let schema = SchemaBuilder::new()
        .entity(
            EntityDef::new("Movie")
                .field(FieldDef::scalar("title", ScalarType::String))
                .field(FieldDef::scalar("runtime", ScalarType::Int))
                .field(FieldDef::relationship("actors", "Actor", "ACTED_IN", Direction::Incoming)),
        )
        .entity(EntityDef::new("Actor").field(FieldDef::scalar("name", ScalarType::String)))
        .build()
        .expect("schema");
    Translator::with_defaults(schema)
}

/// Filters that hold for every row, written the ways a client may spell them.
fn arb_empty_filter() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(json!({})),
        Just(json!({ "AND": [] })),
        Just(json!({ "NOT": {} })),
        Just(json!({ "AND": [{}, { "AND": [] }] })),
    ]
}

fn text_for(translator: &Translator, filter: Option<serde_json::Value>) -> String {
    let mut builder = SelectionBuilder::new("movies").field("title");
    if let Some(filter) = filter {
        builder = builder.arg("where", filter);
    }
    let field = builder.build().expect("field");
    let statement = translator.translate(&field, &Claims::anonymous()).expect("statement");
    assert!(statement.params.is_empty(), "{:?}", statement.params);
    statement.text
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 '\"{}\\\\]{0,24}"
}

proptest! {
    #[test]
    fn prop_cursor_resumes_after_its_offset(offset in 0u64..u64::MAX) {
        let cursor = encode_cursor(offset);
        prop_assert_eq!(decode_cursor(&cursor).expect("decode"), offset);
        let window = PageWindow::from_arguments(None, Some(&Value::String(cursor))).expect("window");
        prop_assert_eq!(window.start, offset + 1);
    }

    #[test]
    fn prop_user_values_never_reach_the_text(title in arb_text(), name in arb_text()) {
        let field = SelectionBuilder::new("movies")
            .arg("where", json!({ "title": title.clone(), "actors_SOME": { "name": name.clone() } }))
            .field("title")
            .build()
            .expect("field");
        let statement = translator().translate(&field, &Claims::anonymous()).expect("statement");
        prop_assert_eq!(statement.param("param0"), Some(&Value::String(title)));
        prop_assert_eq!(statement.param("param1"), Some(&Value::String(name)));
        prop_assert_eq!(
            statement.text,
            "MATCH (this:Movie)\nWHERE this.title = $param0 AND EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Actor) WHERE this0.name = $param1 }\nRETURN this { .title } AS this"
        );
    }

    #[test]
    fn prop_translation_is_deterministic(runtime in any::<i64>(), first in 0i64..1_000) {
        let field = SelectionBuilder::new("movies")
            .arg("where", json!({ "runtime_GTE": runtime }))
            .arg("limit", json!(first))
            .field("title")
            .child(SelectionBuilder::new("actors").field("name"))
            .build()
            .expect("field");
        let translator = translator();
        let claims = Claims::anonymous();
        let a = translator.translate(&field, &claims).expect("first");
        let b = translator.translate(&field, &claims).expect("second");
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.param("param0"), Some(&Value::Int(runtime)));
        prop_assert_eq!(a.param("param1"), Some(&Value::Int(first)));
    }

    #[test]
    fn prop_empty_filters_add_no_condition(empty in arb_empty_filter()) {
        let translator = translator();
        prop_assert_eq!(text_for(&translator, Some(empty.clone())), text_for(&translator, None));
        prop_assert_eq!(
            text_for(&translator, Some(json!({ "actorsAggregate": empty.clone() }))),
            text_for(&translator, None)
        );
        prop_assert_eq!(
            text_for(&translator, Some(json!({ "actorsAggregate": { "AND": [empty.clone()] } }))),
            text_for(&translator, None)
        );
        prop_assert_eq!(
            text_for(&translator, Some(json!({ "actors_SOME": empty.clone() }))),
            text_for(&translator, Some(json!({ "actors_SOME": {} })))
        );
        prop_assert_eq!(
            text_for(&translator, Some(json!({ "actorsConnection_SOME": { "node": empty } }))),
            text_for(&translator, Some(json!({ "actorsConnection_SOME": {} })))
        );
    }

    #[test]
    fn prop_input_integers_keep_their_magnitude(runtime in any::<i64>()) {
        let field = SelectionBuilder::new("createMovies")
            .arg("input", json!([{ "runtime": runtime }]))
            .child(SelectionBuilder::new("movies").field("runtime"))
            .build()
            .expect("field");
        let statement = translator().translate(&field, &Claims::anonymous()).expect("statement");
        prop_assert!(statement.text.contains("SET this0.runtime = $param0"), "{}", statement.text);
        prop_assert_eq!(statement.param("param0"), Some(&Value::Int(runtime)));
    }
}

#[test]
fn empty_where_matches_no_where() {
    let bare = SelectionBuilder::new("movies")
        .field("title")
        .build()
        .expect("field");
    let empty = SelectionBuilder::new("movies")
        .arg("where", json!({}))
        .field("title")
        .build()
        .expect("field");
    let translator = translator();
    let claims = Claims::anonymous();
    let bare = translator.translate(&bare, &claims).expect("bare");
    let empty = translator.translate(&empty, &claims).expect("empty");
    assert_eq!(bare.text, empty.text);
    assert!(empty.params.is_empty());
}
