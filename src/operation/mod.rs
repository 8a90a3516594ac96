//! Resolved operation tree handed to the translator.
//!
//! The GraphQL execution layer parses the document, substitutes variables and
//! hands over one [`SelectionField`] per root field. Arguments are already
//! plain values; nothing here refers to GraphQL variables.

#![forbid(unsafe_code)]

mod builder;

pub use builder::SelectionBuilder;

use serde::Deserialize;

use crate::value::{Value, ValueMap};

/// One selected field with its arguments and sub-selection.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectionField {
    /// Schema field name.
    pub name: String,
    /// Response key override.
    pub alias: Option<String>,
    /// Fully resolved arguments.
    pub arguments: ValueMap,
    /// Nested selection; empty for leaves.
    pub selection: Vec<SelectionField>,
    /// Type condition of the fragment this field was selected through.
    pub on: Option<String>,
}

impl SelectionField {
    /// Leaf field without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Key the field's value is returned under.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Argument by name; `None` when absent or explicitly null.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }

    /// Argument by name, keeping an explicit null.
    pub fn raw_argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Child field by schema name.
    pub fn child(&self, name: &str) -> Option<&SelectionField> {
        self.selection.iter().find(|f| f.name == name)
    }

    /// Children that apply to `type_name`: unconditioned ones plus those whose
    /// type condition names it or one of `also`.
    pub fn children_for<'a>(
        &'a self,
        type_name: &'a str,
        also: &'a [String],
    ) -> impl Iterator<Item = &'a SelectionField> + 'a {
        self.selection.iter().filter(move |f| match &f.on {
            None => true,
            Some(on) => on == type_name || also.iter().any(|a| a == on),
        })
    }

    /// Nesting depth of the selection, counting this field. Walks with an
    /// explicit stack so arbitrarily deep selections cannot overflow it.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((field, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            pending.extend(field.selection.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Parses a selection from its JSON form.
    pub fn from_json(value: serde_json::Value) -> crate::error::TranslateResult<Self> {
        serde_json::from_value(value)
            .map_err(|err| crate::error::TranslateError::invalid_argument("selection", err.to_string()))
    }
}
