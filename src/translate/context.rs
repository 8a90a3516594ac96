//! Per-operation translation state.

use std::collections::BTreeMap;

use crate::claims::Claims;
use crate::config::TranslatorConfig;
use crate::cypher::{Clause, Expr, Var};
use crate::error::{AuthViolation, TranslateError, TranslateResult};
use crate::schema::Schema;
use crate::statement::{assemble, CompiledStatement, TranslationNotice};
use crate::value::{Value, ValueMap};

const JWT_PARAM: &str = "jwt";
const IS_AUTHENTICATED_PARAM: &str = "isAuthenticated";

/// Mutable state threaded through one translation.
///
/// Variable and parameter counters live here and nowhere else, so two
/// translations running side by side never share names.
pub(crate) struct TranslationContext<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) config: &'a TranslatorConfig,
    pub(crate) claims: &'a Claims,
    next_var: usize,
    next_param: usize,
    params: BTreeMap<String, Value>,
    notices: Vec<TranslationNotice>,
    violations: Vec<AuthViolation>,
}

impl<'a> TranslationContext<'a> {
    pub(crate) fn new(schema: &'a Schema, config: &'a TranslatorConfig, claims: &'a Claims) -> Self {
        Self {
            schema,
            config,
            claims,
            next_var: 0,
            next_param: 0,
            params: BTreeMap::new(),
            notices: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Variable bound to the root node of a read or update.
    pub(crate) fn root_var(&self) -> Var {
        Var::new("this")
    }

    /// Fresh node or relationship variable.
    pub(crate) fn fresh_node(&mut self) -> Var {
        let var = Var(format!("this{}", self.next_var));
        self.next_var += 1;
        var
    }

    /// Fresh result variable.
    pub(crate) fn fresh_var(&mut self) -> Var {
        let var = Var(format!("var{}", self.next_var));
        self.next_var += 1;
        var
    }

    /// Hoists `value` into a fresh parameter.
    pub(crate) fn param(&mut self, value: Value) -> Expr {
        Expr::Param(self.param_name(value))
    }

    /// Like [`Self::param`], for callers splicing the name into raw text.
    pub(crate) fn param_name(&mut self, value: Value) -> String {
        let name = format!("param{}", self.next_param);
        self.next_param += 1;
        self.params.insert(name.clone(), value);
        name
    }

    /// `$jwt`, registered on first use. Anonymous callers get an empty map
    /// so every claim lookup yields null.
    pub(crate) fn jwt_param(&mut self) -> Expr {
        if !self.params.contains_key(JWT_PARAM) {
            let jwt = match self.claims.jwt_value() {
                Value::Null => Value::Map(ValueMap::new()),
                value => value,
            };
            self.params.insert(JWT_PARAM.to_owned(), jwt);
        }
        Expr::param(JWT_PARAM)
    }

    /// `$isAuthenticated`, registered on first use.
    pub(crate) fn is_authenticated_param(&mut self) -> Expr {
        let authenticated = self.claims.is_authenticated();
        self.params
            .entry(IS_AUTHENTICATED_PARAM.to_owned())
            .or_insert(Value::Bool(authenticated));
        Expr::param(IS_AUTHENTICATED_PARAM)
    }

    pub(crate) fn check_selection_depth(&self, depth: usize) -> TranslateResult<()> {
        check(depth, self.config.max_selection_depth, "selection")
    }

    pub(crate) fn check_filter_depth(&self, depth: usize) -> TranslateResult<()> {
        check(depth, self.config.max_filter_depth, "where argument")
    }

    pub(crate) fn check_mutation_depth(&self, depth: usize) -> TranslateResult<()> {
        check(depth, self.config.max_mutation_depth, "mutation input")
    }

    pub(crate) fn notice(&mut self, notice: TranslationNotice) {
        if !self.notices.contains(&notice) {
            self.notices.push(notice);
        }
    }

    /// Records a validation rule decided false from claims alone.
    pub(crate) fn violation(&mut self, violation: AuthViolation) {
        self.violations.push(violation);
    }

    /// Assembles the statement, or fails with every recorded violation.
    pub(crate) fn finish(self, clauses: &[Clause]) -> TranslateResult<CompiledStatement> {
        if !self.violations.is_empty() {
            return Err(TranslateError::Forbidden {
                violations: self.violations,
            });
        }
        Ok(assemble(clauses, self.params, self.notices))
    }
}

fn check(depth: usize, max: usize, what: &'static str) -> TranslateResult<()> {
    if depth > max {
        Err(TranslateError::DepthExceeded { what, max })
    } else {
        Ok(())
    }
}
