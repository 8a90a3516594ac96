//! Statement assembly: the translator's output artifact.

use std::collections::BTreeMap;

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::cypher::{render, Clause};
use crate::value::Value;

/// Caveat attached to a compiled statement for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TranslationNotice {
    /// Rows equal on every sort key come back in store order, which is not
    /// guaranteed to be stable across executions or concurrent writes.
    UnstableTieBreak {
        /// Sorted entity.
        entity: String,
    },
}

/// Executable statement text plus its parameter bindings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    /// Cypher text.
    pub text: String,
    /// Parameters referenced by `text`.
    pub params: BTreeMap<String, Value>,
    /// Caveats the caller may surface.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<TranslationNotice>,
}

impl CompiledStatement {
    /// Stable hash of the statement text, for upstream plan caches.
    pub fn fingerprint(&self) -> u64 {
        xxh64(self.text.as_bytes(), 0)
    }

    /// Parameter by name.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Parameters as a JSON object for drivers that take one.
    pub fn params_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.params
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// Renders `clauses` and packages them with their parameters.
pub(crate) fn assemble(
    clauses: &[Clause],
    params: BTreeMap<String, Value>,
    mut notices: Vec<TranslationNotice>,
) -> CompiledStatement {
    notices.dedup();
    CompiledStatement {
        text: render(clauses),
        params,
        notices,
    }
}
