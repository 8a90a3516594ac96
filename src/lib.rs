//! Schema-driven translation of resolved GraphQL operations into Neo4j 5
//! Cypher statements.
//!
//! A [`Schema`] describes entities, interfaces, unions and relationships.
//! A [`Translator`] turns one resolved root field ([`SelectionField`]) plus
//! the caller's [`Claims`] into a [`CompiledStatement`]: statement text and
//! the parameters it references. Executing the statement is left to the
//! caller's driver.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod coerce;
pub mod config;
pub mod cursor;
pub mod cypher;
pub mod error;
pub mod logging;
pub mod operation;
pub mod schema;
pub mod statement;
pub mod translate;
pub mod value;

pub use claims::Claims;
pub use config::{ConfigError, TranslatorConfig};
pub use error::{SchemaError, TranslateError, TranslateResult};
pub use operation::{SelectionBuilder, SelectionField};
pub use schema::{Schema, SchemaBuilder, SchemaDocument};
pub use statement::{CompiledStatement, TranslationNotice};
pub use translate::Translator;
pub use value::{Value, ValueMap};
