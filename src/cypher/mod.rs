//! Intermediate representation of emitted Cypher.
//!
//! Translators build [`Clause`] lists over an [`Expr`] tree and only turn
//! them into text at the assembly boundary, so predicate and authorization
//! fragments compose structurally.

#![forbid(unsafe_code)]

pub mod clause;
pub mod expr;
pub mod render;

pub use clause::{
    Clause, Imports, NodePattern, OrderItem, Pattern, PatternDirection, Projection,
    ProjectionItem, RelPattern, SetItem,
};
pub use expr::{ArithOp, CompareOp, Expr, MapEntry, Subquery, Var};
pub use render::{ident, render, render_expr};
