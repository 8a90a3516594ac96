//! Fluent construction of selection trees.

use super::SelectionField;
use crate::error::{TranslateError, TranslateResult};
use crate::value::Value;

/// Builds a [`SelectionField`] without spelling out nested structs.
///
/// The first failing argument conversion is kept and returned by
/// [`SelectionBuilder::build`]; later calls become no-ops.
#[derive(Debug, Default)]
pub struct SelectionBuilder {
    field: SelectionField,
    error: Option<TranslateError>,
}

impl SelectionBuilder {
    /// Starts a field named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            field: SelectionField::new(name),
            error: None,
        }
    }

    /// Adds an argument from JSON.
    pub fn arg(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        if self.error.is_some() {
            return self;
        }
        match Value::from_json(value) {
            Ok(value) => {
                self.field.arguments.insert(name.into(), value);
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Adds an already converted argument.
    pub fn arg_value(mut self, name: impl Into<String>, value: Value) -> Self {
        if self.error.is_none() {
            self.field.arguments.insert(name.into(), value);
        }
        self
    }

    /// Sets the response alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.field.alias = Some(alias.into());
        self
    }

    /// Restricts the field to a concrete type, as an inline fragment would.
    pub fn on(mut self, type_name: impl Into<String>) -> Self {
        self.field.on = Some(type_name.into());
        self
    }

    /// Adds leaf children.
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field
            .selection
            .extend(names.into_iter().map(SelectionField::new));
        self
    }

    /// Adds a single leaf child.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.fields([name])
    }

    /// Adds a nested child.
    pub fn child(mut self, child: SelectionBuilder) -> Self {
        if self.error.is_some() {
            return self;
        }
        match child.build() {
            Ok(field) => self.field.selection.push(field),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Finishes the field.
    pub fn build(self) -> TranslateResult<SelectionField> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_nested_selection() {
        let field = SelectionBuilder::new("movies")
            .arg("where", json!({ "title": "Heat" }))
            .field("title")
            .child(SelectionBuilder::new("actors").field("name"))
            .build()
            .expect("build");
        assert_eq!(field.selection.len(), 2);
        assert_eq!(field.selection[1].selection[0].name, "name");
    }

    #[test]
    fn first_error_wins() {
        let err = SelectionBuilder::new("movies")
            .arg("where", json!({ "id": u64::MAX }))
            .child(SelectionBuilder::new("actors"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "IntegerOutOfRange");
    }
}
