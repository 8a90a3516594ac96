#![forbid(unsafe_code)]

use std::fmt;

use thiserror::Error;

use crate::schema::AuthOperation;

/// Result alias for schema construction.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Result alias for operation translation.
pub type TranslateResult<T> = std::result::Result<T, TranslateError>;

/// Errors raised while compiling schema metadata.
///
/// A schema that fails to build is never served; callers surface these once at
/// startup rather than per operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SchemaError {
    /// Referenced entity, interface or union is not declared.
    #[error("unknown type '{name}'")]
    UnknownEntity { name: String },
    /// Field lookup failed on a declared type.
    #[error("type '{owner}' has no field '{field}'")]
    UnknownField { owner: String, field: String },
    /// Two declarations share a type name.
    #[error("type '{name}' declared more than once")]
    DuplicateType { name: String },
    /// Two fields on one type share a name.
    #[error("field '{owner}.{field}' declared more than once")]
    DuplicateField { owner: String, field: String },
    /// Relationship points at an undeclared type.
    #[error("relationship '{owner}.{field}' targets unknown type '{target}'")]
    UnknownRelationshipTarget {
        owner: String,
        field: String,
        target: String,
    },
    /// Two endpoint declarations of the same relationship type disagree.
    #[error("relationship type '{rel_type}' declared inconsistently by '{first}' and '{second}'")]
    ConflictingRelationship {
        rel_type: String,
        first: String,
        second: String,
    },
    /// Relationship properties type is missing or differs between endpoints.
    #[error("relationship type '{rel_type}' properties mismatch: {reason}")]
    RelationshipPropertiesMismatch { rel_type: String, reason: String },
    /// A filter template uses a key that resolves to no comparator.
    #[error("unknown comparator '{key}' on type '{owner}'")]
    UnknownComparator { owner: String, key: String },
    /// An entity implements an interface that is not declared.
    #[error("type '{entity}' implements unknown interface '{interface}'")]
    UnresolvableInterface { entity: String, interface: String },
    /// An implementer lacks a field its interface declares.
    #[error("type '{entity}' does not declare field '{field}' required by interface '{interface}'")]
    MissingInterfaceField {
        entity: String,
        interface: String,
        field: String,
    },
    /// A federation key names a field that is not a scalar on the entity.
    #[error("key field '{field}' on '{entity}' is not a scalar field")]
    InvalidKey { entity: String, field: String },
    /// Authorization rule is structurally invalid.
    #[error("invalid authorization rule on '{owner}': {reason}")]
    InvalidAuthorizationRule { owner: String, reason: String },
    /// Computed field declaration is unusable.
    #[error("invalid cypher field '{owner}.{field}': {reason}")]
    InvalidCypherField {
        owner: String,
        field: String,
        reason: String,
    },
    /// Serialized schema document failed to parse.
    #[error("invalid schema document: {reason}")]
    InvalidDocument { reason: String },
}

impl SchemaError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownEntity { .. } => "UnknownEntity",
            SchemaError::UnknownField { .. } => "UnknownField",
            SchemaError::DuplicateType { .. } => "DuplicateType",
            SchemaError::DuplicateField { .. } => "DuplicateField",
            SchemaError::UnknownRelationshipTarget { .. } => "UnknownRelationshipTarget",
            SchemaError::ConflictingRelationship { .. } => "ConflictingRelationship",
            SchemaError::RelationshipPropertiesMismatch { .. } => "RelationshipPropertiesMismatch",
            SchemaError::UnknownComparator { .. } => "UnknownComparator",
            SchemaError::UnresolvableInterface { .. } => "UnresolvableInterface",
            SchemaError::MissingInterfaceField { .. } => "MissingInterfaceField",
            SchemaError::InvalidKey { .. } => "InvalidKey",
            SchemaError::InvalidAuthorizationRule { .. } => "InvalidAuthorizationRule",
            SchemaError::InvalidCypherField { .. } => "InvalidCypherField",
            SchemaError::InvalidDocument { .. } => "InvalidDocument",
        }
    }
}

/// Expected cardinality reported by a constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityExpectation {
    /// Required one-relationship.
    ExactlyOne,
    /// Optional one-relationship.
    AtMostOne,
}

impl fmt::Display for CardinalityExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardinalityExpectation::ExactlyOne => f.write_str("exactly once"),
            CardinalityExpectation::AtMostOne => f.write_str("at most once"),
        }
    }
}

/// One failed claims-only validation rule.
///
/// Kept out of the user-facing message; only the error code is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthViolation {
    /// Entity that owns the failing rule.
    pub entity: String,
    /// Field the rule was attached to, when field-level.
    pub field: Option<String>,
    /// Operation the rule guarded.
    pub operation: AuthOperation,
}

/// Errors raised while translating a single operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TranslateError {
    /// Root field does not exist on the compiled schema.
    #[error("unknown root field '{name}'")]
    UnknownRootField { name: String },
    /// Selected field does not exist on the target type.
    #[error("type '{owner}' has no field '{field}'")]
    UnknownField { owner: String, field: String },
    /// `where` argument has the wrong shape.
    #[error("malformed where argument: {reason}")]
    MalformedWhere { reason: String },
    /// `where` key does not resolve to a field or comparator.
    #[error("unknown filter '{key}' on type '{owner}'")]
    UnknownFilterField { owner: String, key: String },
    /// Non-filter argument has the wrong shape.
    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },
    /// Polymorphic filter or representation names a type outside the member set.
    #[error("'{name}' is not a concrete member of '{abstract_type}'")]
    UnknownConcreteType { abstract_type: String, name: String },
    /// Cursor failed to decode.
    #[error("cursor '{cursor}' is invalid")]
    InvalidCursor { cursor: String },
    /// Selection, filter or mutation input nests too deeply.
    #[error("{what} exceeds maximum depth {max}")]
    DepthExceeded { what: &'static str, max: usize },
    /// Operation requires an authenticated caller.
    #[error("Unauthenticated")]
    Unauthenticated,
    /// Validation rule rejected the operation.
    #[error("Forbidden")]
    Forbidden { violations: Vec<AuthViolation> },
    /// Relationship cardinality would be broken by the mutation.
    #[error("ConstraintViolation: {entity}.{relationship} must be connected {expected}")]
    ConstraintViolation {
        entity: String,
        relationship: String,
        expected: CardinalityExpectation,
    },
    /// Mutation input has the wrong shape.
    #[error("invalid input for '{entity}': {reason}")]
    InvalidInput { entity: String, reason: String },
    /// connectOrCreate matched on a field that is not unique.
    #[error("connectOrCreate on '{entity}' must match on unique fields, got '{field}'")]
    NonUniqueConnectOrCreate { entity: String, field: String },
    /// Integer literal exceeds the signed 64-bit range.
    #[error("integer literal {literal} is out of range")]
    IntegerOutOfRange { literal: String },
    /// Literal does not parse as the field's scalar type.
    #[error("expected {expected} literal, found {found}")]
    InvalidLiteral { expected: &'static str, found: String },
}

impl TranslateError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            TranslateError::UnknownRootField { .. } => "UnknownRootField",
            TranslateError::UnknownField { .. } => "UnknownField",
            TranslateError::MalformedWhere { .. } => "MalformedWhere",
            TranslateError::UnknownFilterField { .. } => "UnknownFilterField",
            TranslateError::InvalidArgument { .. } => "InvalidArgument",
            TranslateError::UnknownConcreteType { .. } => "UnknownConcreteType",
            TranslateError::InvalidCursor { .. } => "InvalidCursor",
            TranslateError::DepthExceeded { .. } => "DepthExceeded",
            TranslateError::Unauthenticated => "Unauthenticated",
            TranslateError::Forbidden { .. } => "Forbidden",
            TranslateError::ConstraintViolation { .. } => "ConstraintViolation",
            TranslateError::InvalidInput { .. } => "InvalidInput",
            TranslateError::NonUniqueConnectOrCreate { .. } => "NonUniqueConnectOrCreate",
            TranslateError::IntegerOutOfRange { .. } => "IntegerOutOfRange",
            TranslateError::InvalidLiteral { .. } => "InvalidLiteral",
        }
    }

    /// Returns `true` for authorization failures that must not leak detail.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, TranslateError::Forbidden { .. })
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        TranslateError::MalformedWhere {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        TranslateError::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_input(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        TranslateError::InvalidInput {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_field(owner: impl Into<String>, field: impl Into<String>) -> Self {
        TranslateError::UnknownField {
            owner: owner.into(),
            field: field.into(),
        }
    }
}

/// Formats a translation error with its code prefix.
pub struct TranslateErrorWithCode<'a>(pub &'a TranslateError);

impl fmt::Display for TranslateErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

/// Maps failures raised by emitted runtime guards back onto typed errors.
///
/// The execution layer sees driver errors whose message embeds the guard
/// text; classifying them lets callers treat a runtime `Forbidden` exactly
/// like one decided during translation.
#[derive(Debug, Clone)]
pub struct RuntimeGuard {
    forbidden_message: String,
}

const CONSTRAINT_PREFIX: &str = "ConstraintViolation: ";

impl RuntimeGuard {
    /// Creates a classifier for guards rendered with `forbidden_message`.
    pub fn new(forbidden_message: impl Into<String>) -> Self {
        Self {
            forbidden_message: forbidden_message.into(),
        }
    }

    /// Renders the message embedded in a cardinality guard.
    pub fn constraint_message(
        entity: &str,
        relationship: &str,
        expected: CardinalityExpectation,
    ) -> String {
        format!("{CONSTRAINT_PREFIX}{entity}.{relationship} must be connected {expected}")
    }

    /// Classifies a driver error message; `None` when no guard raised it.
    pub fn classify(&self, message: &str) -> Option<TranslateError> {
        if let Some(start) = message.find(CONSTRAINT_PREFIX) {
            let rest = &message[start + CONSTRAINT_PREFIX.len()..];
            let (target, tail) = rest.split_once(" must be connected ")?;
            let (entity, relationship) = target.split_once('.')?;
            let expected = if tail.starts_with("exactly once") {
                CardinalityExpectation::ExactlyOne
            } else if tail.starts_with("at most once") {
                CardinalityExpectation::AtMostOne
            } else {
                return None;
            };
            return Some(TranslateError::ConstraintViolation {
                entity: entity.to_owned(),
                relationship: relationship.to_owned(),
                expected,
            });
        }
        if message.contains(&self.forbidden_message) {
            return Some(TranslateError::Forbidden {
                violations: Vec::new(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_display_hides_violations() {
        let err = TranslateError::Forbidden {
            violations: vec![AuthViolation {
                entity: "Movie".into(),
                field: None,
                operation: AuthOperation::Create,
            }],
        };
        assert_eq!(err.to_string(), "Forbidden");
        assert!(err.is_forbidden());
        assert_eq!(TranslateErrorWithCode(&err).to_string(), "[Forbidden] Forbidden");
    }

    #[test]
    fn classify_round_trips_constraint_message() {
        let guard = RuntimeGuard::new("Forbidden");
        let message = RuntimeGuard::constraint_message(
            "Movie",
            "director",
            CardinalityExpectation::ExactlyOne,
        );
        let driver = format!(
            "Failed to invoke function `apoc.util.validatePredicate`: Caused by: java.lang.RuntimeException: {message}"
        );
        let err = guard.classify(&driver).expect("classified");
        assert_eq!(
            err,
            TranslateError::ConstraintViolation {
                entity: "Movie".into(),
                relationship: "director".into(),
                expected: CardinalityExpectation::ExactlyOne,
            }
        );
        assert_eq!(err.to_string(), message);
    }

    #[test]
    fn classify_detects_forbidden_and_ignores_other_failures() {
        let guard = RuntimeGuard::new("Forbidden");
        let err = guard
            .classify("java.lang.RuntimeException: Forbidden")
            .expect("forbidden");
        assert!(err.is_forbidden());
        assert!(guard.classify("Neo.ClientError.Statement.SyntaxError").is_none());
    }
}
