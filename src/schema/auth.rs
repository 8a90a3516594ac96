//! Authorization and authentication rule model.
//!
//! Rules are attached to entities, interfaces, relationship-properties types
//! and individual fields. Their `where`-shaped templates are parsed into a
//! [`RulePredicate`] once, when the schema is built; node parts are validated
//! against the owning type by the builder.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::claims::{Claims, Placeholder};
use crate::error::{SchemaError, SchemaResult};
use crate::value::Value;

/// Operation kinds a rule can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOperation {
    /// Reading nodes, including nested traversals and aggregates.
    Read,
    /// Creating nodes.
    Create,
    /// Updating node properties.
    Update,
    /// Deleting nodes.
    Delete,
    /// Connecting nodes through a relationship.
    Connect,
    /// Disconnecting nodes.
    Disconnect,
    /// Writing a relationship.
    CreateRelationship,
    /// Removing a relationship.
    DeleteRelationship,
}

impl AuthOperation {
    /// Every operation kind.
    pub const ALL: [AuthOperation; 8] = [
        AuthOperation::Read,
        AuthOperation::Create,
        AuthOperation::Update,
        AuthOperation::Delete,
        AuthOperation::Connect,
        AuthOperation::Disconnect,
        AuthOperation::CreateRelationship,
        AuthOperation::DeleteRelationship,
    ];

    /// Operations a FILTER rule applies to when none are listed.
    pub const FILTER_DEFAULT: [AuthOperation; 5] = [
        AuthOperation::Read,
        AuthOperation::Update,
        AuthOperation::Delete,
        AuthOperation::CreateRelationship,
        AuthOperation::DeleteRelationship,
    ];
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthOperation::Read => "READ",
            AuthOperation::Create => "CREATE",
            AuthOperation::Update => "UPDATE",
            AuthOperation::Delete => "DELETE",
            AuthOperation::Connect => "CONNECT",
            AuthOperation::Disconnect => "DISCONNECT",
            AuthOperation::CreateRelationship => "CREATE_RELATIONSHIP",
            AuthOperation::DeleteRelationship => "DELETE_RELATIONSHIP",
        };
        f.write_str(name)
    }
}

/// When a validation rule is checked relative to the write it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationPhase {
    /// Against the matched state, before writes.
    Before,
    /// Against the final state, after writes.
    After,
}

/// How a rule takes effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMode {
    /// Silently narrows the matched set.
    Filter,
    /// Aborts the operation with `Forbidden` when unsatisfied.
    Validate {
        /// Phases the rule is checked in.
        when: Vec<ValidationPhase>,
    },
}

/// Comparators available on token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtComparator {
    /// Equality.
    Eq,
    /// Inequality; false when the claim is absent.
    Not,
    /// Claim is one of the listed values.
    In,
    /// Claim list contains the value.
    Includes,
    /// Ordering comparators.
    Lt,
    /// `<=`.
    Lte,
    /// `>`.
    Gt,
    /// `>=`.
    Gte,
    /// Substring.
    Contains,
    /// Prefix.
    StartsWith,
    /// Suffix.
    EndsWith,
}

const JWT_SUFFIXES: [(&str, JwtComparator); 10] = [
    ("_STARTS_WITH", JwtComparator::StartsWith),
    ("_ENDS_WITH", JwtComparator::EndsWith),
    ("_CONTAINS", JwtComparator::Contains),
    ("_INCLUDES", JwtComparator::Includes),
    ("_NOT", JwtComparator::Not),
    ("_LTE", JwtComparator::Lte),
    ("_GTE", JwtComparator::Gte),
    ("_LT", JwtComparator::Lt),
    ("_GT", JwtComparator::Gt),
    ("_IN", JwtComparator::In),
];

/// Claims-only predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum JwtPredicate {
    /// Conjunction.
    And(Vec<JwtPredicate>),
    /// Disjunction.
    Or(Vec<JwtPredicate>),
    /// Negation.
    Not(Box<JwtPredicate>),
    /// Single claim comparison.
    Condition {
        /// Dotted claim path.
        path: Vec<String>,
        /// Comparator.
        comparator: JwtComparator,
        /// Literal or `$context` placeholder.
        value: Value,
    },
}

impl JwtPredicate {
    fn parse(owner: &str, template: &Value) -> SchemaResult<Self> {
        let map = template.as_map().ok_or_else(|| invalid(owner, "jwt must be an object"))?;
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            let part = match key.as_str() {
                "AND" | "OR" => {
                    let items = value
                        .as_list()
                        .ok_or_else(|| invalid(owner, format!("jwt {key} must be a list")))?
                        .iter()
                        .map(|item| JwtPredicate::parse(owner, item))
                        .collect::<SchemaResult<Vec<_>>>()?;
                    if key == "AND" {
                        JwtPredicate::And(items)
                    } else {
                        JwtPredicate::Or(items)
                    }
                }
                "NOT" => JwtPredicate::Not(Box::new(JwtPredicate::parse(owner, value)?)),
                _ => {
                    let (claim, comparator) = JWT_SUFFIXES
                        .iter()
                        .find_map(|(suffix, cmp)| key.strip_suffix(suffix).map(|c| (c, *cmp)))
                        .unwrap_or((key.as_str(), JwtComparator::Eq));
                    if claim.is_empty() {
                        return Err(SchemaError::UnknownComparator {
                            owner: owner.to_owned(),
                            key: key.clone(),
                        });
                    }
                    JwtPredicate::Condition {
                        path: claim.split('.').map(str::to_owned).collect(),
                        comparator,
                        value: value.clone(),
                    }
                }
            };
            parts.push(part);
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => JwtPredicate::And(parts),
        })
    }

    /// Evaluates against resolved claims. Missing claims never satisfy a comparison.
    pub fn evaluate(&self, claims: &Claims) -> bool {
        match self {
            JwtPredicate::And(items) => items.iter().all(|p| p.evaluate(claims)),
            JwtPredicate::Or(items) => items.iter().any(|p| p.evaluate(claims)),
            JwtPredicate::Not(inner) => !inner.evaluate(claims),
            JwtPredicate::Condition {
                path,
                comparator,
                value,
            } => {
                let claim = claims.jwt_path(path);
                let expected = match value.as_str().and_then(Placeholder::parse) {
                    Some(placeholder) => claims.resolve(&placeholder),
                    None => value.clone(),
                };
                compare_claim(&claim, *comparator, &expected)
            }
        }
    }
}

fn compare_claim(claim: &Value, comparator: JwtComparator, expected: &Value) -> bool {
    if claim.is_null() || expected.is_null() {
        return false;
    }
    match comparator {
        JwtComparator::Eq => loosely_equal(claim, expected),
        JwtComparator::Not => !loosely_equal(claim, expected),
        JwtComparator::In => expected
            .as_list()
            .map(|items| items.iter().any(|item| loosely_equal(claim, item)))
            .unwrap_or(false),
        JwtComparator::Includes => claim
            .as_list()
            .map(|items| items.iter().any(|item| loosely_equal(item, expected)))
            .unwrap_or(false),
        JwtComparator::Lt => order(claim, expected) == Some(Ordering::Less),
        JwtComparator::Lte => matches!(
            order(claim, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        JwtComparator::Gt => order(claim, expected) == Some(Ordering::Greater),
        JwtComparator::Gte => matches!(
            order(claim, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        JwtComparator::Contains => text_pair(claim, expected)
            .map(|(a, b)| a.contains(b))
            .unwrap_or(false),
        JwtComparator::StartsWith => text_pair(claim, expected)
            .map(|(a, b)| a.starts_with(b))
            .unwrap_or(false),
        JwtComparator::EndsWith => text_pair(claim, expected)
            .map(|(a, b)| a.ends_with(b))
            .unwrap_or(false),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn text_pair<'v>(a: &'v Value, b: &'v Value) -> Option<(&'v str, &'v str)> {
    Some((a.as_str()?, b.as_str()?))
}

/// Parsed rule template.
#[derive(Debug, Clone, PartialEq)]
pub enum RulePredicate {
    /// Conjunction.
    And(Vec<RulePredicate>),
    /// Disjunction.
    Or(Vec<RulePredicate>),
    /// Negation.
    Not(Box<RulePredicate>),
    /// `where`-shaped filter over the guarded node; may hold placeholders.
    Node(Value),
    /// Claims-only comparison.
    Jwt(JwtPredicate),
}

impl RulePredicate {
    /// Parses `{ node, jwt, AND, OR, NOT }`.
    pub fn parse(owner: &str, template: &Value) -> SchemaResult<Self> {
        let map = template
            .as_map()
            .ok_or_else(|| invalid(owner, "rule template must be an object"))?;
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            let part = match key.as_str() {
                "node" => {
                    if value.as_map().is_none() {
                        return Err(invalid(owner, "node must be an object"));
                    }
                    RulePredicate::Node(value.clone())
                }
                "jwt" => RulePredicate::Jwt(JwtPredicate::parse(owner, value)?),
                "AND" | "OR" => {
                    let items = value
                        .as_list()
                        .ok_or_else(|| invalid(owner, format!("{key} must be a list")))?
                        .iter()
                        .map(|item| RulePredicate::parse(owner, item))
                        .collect::<SchemaResult<Vec<_>>>()?;
                    if key == "AND" {
                        RulePredicate::And(items)
                    } else {
                        RulePredicate::Or(items)
                    }
                }
                "NOT" => RulePredicate::Not(Box::new(RulePredicate::parse(owner, value)?)),
                other => {
                    return Err(SchemaError::UnknownComparator {
                        owner: owner.to_owned(),
                        key: other.to_owned(),
                    })
                }
            };
            parts.push(part);
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => RulePredicate::And(parts),
        })
    }

    /// Returns `true` when some branch inspects the guarded node.
    pub fn references_node(&self) -> bool {
        match self {
            RulePredicate::And(items) | RulePredicate::Or(items) => {
                items.iter().any(RulePredicate::references_node)
            }
            RulePredicate::Not(inner) => inner.references_node(),
            RulePredicate::Node(_) => true,
            RulePredicate::Jwt(_) => false,
        }
    }

    /// Visits every node template.
    pub fn node_templates(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            RulePredicate::And(items) | RulePredicate::Or(items) => {
                items.iter().for_each(|item| item.collect_nodes(out))
            }
            RulePredicate::Not(inner) => inner.collect_nodes(out),
            RulePredicate::Node(value) => out.push(value),
            RulePredicate::Jwt(_) => {}
        }
    }

    /// Evaluates a claims-only predicate. `None` when a node part is present.
    pub fn evaluate_claims(&self, claims: &Claims) -> Option<bool> {
        match self {
            RulePredicate::And(items) => {
                let mut result = true;
                for item in items {
                    result &= item.evaluate_claims(claims)?;
                }
                Some(result)
            }
            RulePredicate::Or(items) => {
                let mut result = false;
                for item in items {
                    result |= item.evaluate_claims(claims)?;
                }
                Some(result)
            }
            RulePredicate::Not(inner) => inner.evaluate_claims(claims).map(|v| !v),
            RulePredicate::Node(_) => None,
            RulePredicate::Jwt(jwt) => Some(jwt.evaluate(claims)),
        }
    }
}

fn invalid(owner: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidAuthorizationRule {
        owner: owner.to_owned(),
        reason: reason.into(),
    }
}

/// An `@authorization` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRule {
    /// Operations the rule applies to.
    pub operations: Vec<AuthOperation>,
    /// Filter or validate.
    pub mode: RuleMode,
    /// Adds an `$isAuthenticated = true` conjunct.
    pub require_authentication: bool,
    /// Raw template as declared.
    pub template: Option<Value>,
    pub(crate) predicate: Option<RulePredicate>,
    pub(crate) invalid: Option<String>,
}

impl AuthorizationRule {
    /// FILTER rule; an empty operation list uses the filter defaults.
    pub fn filter<I>(operations: I) -> Self
    where
        I: IntoIterator<Item = AuthOperation>,
    {
        let mut operations: Vec<_> = operations.into_iter().collect();
        if operations.is_empty() {
            operations = AuthOperation::FILTER_DEFAULT.to_vec();
        }
        Self::with_mode(operations, RuleMode::Filter)
    }

    /// VALIDATE rule checked before and after writes; an empty operation
    /// list applies to every operation.
    pub fn validate<I>(operations: I) -> Self
    where
        I: IntoIterator<Item = AuthOperation>,
    {
        let mut operations: Vec<_> = operations.into_iter().collect();
        if operations.is_empty() {
            operations = AuthOperation::ALL.to_vec();
        }
        Self::with_mode(
            operations,
            RuleMode::Validate {
                when: vec![ValidationPhase::Before, ValidationPhase::After],
            },
        )
    }

    fn with_mode(operations: Vec<AuthOperation>, mode: RuleMode) -> Self {
        Self {
            operations,
            mode,
            require_authentication: true,
            template: None,
            predicate: None,
            invalid: None,
        }
    }

    /// Restricts a VALIDATE rule to the given phases.
    pub fn when<I>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = ValidationPhase>,
    {
        if let RuleMode::Validate { when } = &mut self.mode {
            *when = phases.into_iter().collect();
        }
        self
    }

    /// Sets the `where`-shaped template from JSON.
    pub fn matching(mut self, template: serde_json::Value) -> Self {
        match Value::from_json(template) {
            Ok(value) => self.template = Some(value),
            Err(err) => self.invalid = Some(err.to_string()),
        }
        self
    }

    /// Sets the template from an already converted value.
    pub fn matching_value(mut self, template: Value) -> Self {
        self.template = Some(template);
        self
    }

    /// Drops the implicit authentication requirement.
    pub fn allow_unauthenticated(mut self) -> Self {
        self.require_authentication = false;
        self
    }

    /// Whether the rule covers `operation`.
    pub fn applies_to(&self, operation: AuthOperation) -> bool {
        self.operations.contains(&operation)
    }

    /// Whether a VALIDATE rule runs in `phase`.
    pub fn validates_in(&self, phase: ValidationPhase) -> bool {
        match &self.mode {
            RuleMode::Validate { when } => when.contains(&phase),
            RuleMode::Filter => false,
        }
    }

    /// Parsed template, available after schema build.
    pub fn predicate(&self) -> Option<&RulePredicate> {
        self.predicate.as_ref()
    }

    /// Parses the template; called once by the schema builder.
    pub(crate) fn resolve(&mut self, owner: &str) -> SchemaResult<()> {
        if let Some(reason) = self.invalid.take() {
            return Err(invalid(owner, reason));
        }
        if self.operations.is_empty() {
            return Err(invalid(owner, "rule lists no operations"));
        }
        if let RuleMode::Validate { when } = &self.mode {
            if when.is_empty() {
                return Err(invalid(owner, "validate rule lists no phases"));
            }
        }
        self.predicate = match &self.template {
            Some(template) => Some(RulePredicate::parse(owner, template)?),
            None => None,
        };
        if self.predicate.is_none() && !self.require_authentication {
            return Err(invalid(owner, "rule has neither a template nor an authentication requirement"));
        }
        Ok(())
    }
}

/// An `@authentication` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRule {
    /// Operations requiring a token.
    pub operations: Vec<AuthOperation>,
}

impl AuthenticationRule {
    /// Requires authentication for `operations`; empty means all.
    pub fn new<I>(operations: I) -> Self
    where
        I: IntoIterator<Item = AuthOperation>,
    {
        let mut operations: Vec<_> = operations.into_iter().collect();
        if operations.is_empty() {
            operations = AuthOperation::ALL.to_vec();
        }
        Self { operations }
    }

    /// Whether `operation` requires a token.
    pub fn covers(&self, operation: AuthOperation) -> bool {
        self.operations.contains(&operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(payload: serde_json::Value) -> Claims {
        Claims::from_json(payload).expect("claims")
    }

    fn parse(template: serde_json::Value) -> RulePredicate {
        let value = Value::from_json(template).expect("value");
        RulePredicate::parse("Movie", &value).expect("parse")
    }

    #[test]
    fn jwt_includes_is_decided_from_claims() {
        let predicate = parse(json!({ "jwt": { "roles_INCLUDES": "admin" } }));
        assert!(!predicate.references_node());
        assert_eq!(
            predicate.evaluate_claims(&claims(json!({ "roles": ["admin"] }))),
            Some(true)
        );
        assert_eq!(
            predicate.evaluate_claims(&claims(json!({ "roles": ["user"] }))),
            Some(false)
        );
        assert_eq!(predicate.evaluate_claims(&Claims::anonymous()), Some(false));
    }

    #[test]
    fn node_parts_defer_to_runtime() {
        let predicate = parse(json!({
            "OR": [
                { "jwt": { "roles_INCLUDES": "admin" } },
                { "node": { "owner": { "id": "$jwt.sub" } } }
            ]
        }));
        assert!(predicate.references_node());
        assert_eq!(predicate.evaluate_claims(&Claims::anonymous()), None);
        assert_eq!(predicate.node_templates().len(), 1);
    }

    #[test]
    fn not_comparator_treats_missing_claim_as_unsatisfied() {
        let predicate = parse(json!({ "jwt": { "tier_NOT": "free" } }));
        assert_eq!(predicate.evaluate_claims(&claims(json!({}))), Some(false));
        assert_eq!(
            predicate.evaluate_claims(&claims(json!({ "tier": "pro" }))),
            Some(true)
        );
    }

    #[test]
    fn numeric_claims_compare_across_int_and_float() {
        let predicate = parse(json!({ "jwt": { "level_GTE": 2.5 } }));
        assert_eq!(
            predicate.evaluate_claims(&claims(json!({ "level": 3 }))),
            Some(true)
        );
    }

    #[test]
    fn unknown_template_keys_are_rejected() {
        let value = Value::from_json(json!({ "nodes": {} })).expect("value");
        let err = RulePredicate::parse("Movie", &value).unwrap_err();
        assert_eq!(err.code(), "UnknownComparator");
    }

    #[test]
    fn rule_without_template_or_authentication_is_invalid() {
        let mut rule = AuthorizationRule::filter([AuthOperation::Read]).allow_unauthenticated();
        let err = rule.resolve("Movie").unwrap_err();
        assert_eq!(err.code(), "InvalidAuthorizationRule");
    }
}
