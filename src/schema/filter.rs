//! Classification of `where` keys against a type's fields.
//!
//! Keys are `<field><suffix>` comparators, relationship quantifiers,
//! connection and aggregate filters, or the boolean combinators. The same
//! classifier validates rule templates at build time and drives the
//! predicate builder at translation time.

use super::entity::{FieldDef, FieldKind, ScalarField, ScalarType};
use super::relationship::{Cardinality, RelationshipDef};
use super::{FieldSource, Schema, TypeTarget};
use crate::error::{SchemaError, SchemaResult};
use crate::value::Value;

/// Scalar comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// `field`
    Eq,
    /// `field_IN`
    In,
    /// `field_CONTAINS`
    Contains,
    /// `field_STARTS_WITH`
    StartsWith,
    /// `field_ENDS_WITH`
    EndsWith,
    /// `field_MATCHES`
    Matches,
    /// `field_LT`
    Lt,
    /// `field_LTE`
    Lte,
    /// `field_GT`
    Gt,
    /// `field_GTE`
    Gte,
    /// `field_DISTANCE`
    Distance,
    /// `field_INCLUDES`
    Includes,
}

// Longest suffixes first so `_LTE` is not read as `_LT`.
const SUFFIXES: [(&str, Comparator); 11] = [
    ("_STARTS_WITH", Comparator::StartsWith),
    ("_ENDS_WITH", Comparator::EndsWith),
    ("_CONTAINS", Comparator::Contains),
    ("_DISTANCE", Comparator::Distance),
    ("_INCLUDES", Comparator::Includes),
    ("_MATCHES", Comparator::Matches),
    ("_LTE", Comparator::Lte),
    ("_GTE", Comparator::Gte),
    ("_LT", Comparator::Lt),
    ("_GT", Comparator::Gt),
    ("_IN", Comparator::In),
];

impl Comparator {
    /// Whether the comparator is offered for `scalar`.
    pub fn allowed_for(self, scalar: &ScalarField) -> bool {
        if scalar.list {
            return matches!(self, Comparator::Eq | Comparator::Includes);
        }
        let ordered = matches!(
            self,
            Comparator::Lt | Comparator::Lte | Comparator::Gt | Comparator::Gte
        );
        match &scalar.ty {
            ScalarType::Boolean => self == Comparator::Eq,
            ScalarType::Enum(_) => matches!(self, Comparator::Eq | Comparator::In),
            ScalarType::Id | ScalarType::String => {
                ordered
                    || matches!(
                        self,
                        Comparator::Eq
                            | Comparator::In
                            | Comparator::Contains
                            | Comparator::StartsWith
                            | Comparator::EndsWith
                            | Comparator::Matches
                    )
            }
            ScalarType::Point | ScalarType::CartesianPoint => {
                ordered || matches!(self, Comparator::Eq | Comparator::In | Comparator::Distance)
            }
            ty if ty.is_numeric() || ty.is_temporal() => {
                ordered || matches!(self, Comparator::Eq | Comparator::In)
            }
            _ => matches!(self, Comparator::Eq | Comparator::In),
        }
    }
}

/// Relationship filter quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// At least one related node matches.
    Some,
    /// Every related node matches; true when there are none.
    All,
    /// No related node matches.
    None,
    /// Exactly one related node matches.
    Single,
    /// One-relationship shorthand; `null` tests for absence.
    Exists,
}

const QUANTIFIERS: [(&str, Quantifier); 4] = [
    ("_SOME", Quantifier::Some),
    ("_ALL", Quantifier::All),
    ("_NONE", Quantifier::None),
    ("_SINGLE", Quantifier::Single),
];

/// A classified `where` key.
#[derive(Debug, Clone, Copy)]
pub enum WhereKey<'s> {
    /// `AND: [...]`
    And,
    /// `OR: [...]`
    Or,
    /// `NOT: {...}`
    Not,
    /// Scalar comparison.
    Scalar {
        /// Compared field.
        field: &'s FieldDef,
        /// Its scalar metadata.
        scalar: &'s ScalarField,
        /// Operator.
        comparator: Comparator,
    },
    /// Relationship quantifier.
    Relationship {
        /// Relationship field.
        field: &'s FieldDef,
        /// Its metadata.
        relationship: &'s RelationshipDef,
        /// Quantifier.
        quantifier: Quantifier,
    },
    /// Connection quantifier over `{ node, edge }`.
    Connection {
        /// Relationship metadata.
        relationship: &'s RelationshipDef,
        /// Quantifier.
        quantifier: Quantifier,
    },
    /// Aggregate comparison over related nodes.
    Aggregate {
        /// Relationship metadata.
        relationship: &'s RelationshipDef,
    },
    /// `typename_IN: [...]`
    Typename,
    /// `_on: { Member: {...} }`
    On,
}

fn default_quantifier(relationship: &RelationshipDef) -> Quantifier {
    match relationship.cardinality {
        Cardinality::One => Quantifier::Exists,
        Cardinality::Many => Quantifier::Some,
    }
}

fn relationship_of<'s>(owner: &'s dyn FieldSource, name: &str) -> Option<&'s RelationshipDef> {
    owner.lookup_field(name).and_then(FieldDef::as_relationship)
}

/// Classifies `key` against `owner`; `None` when it resolves to nothing.
pub fn classify_where_key<'s>(owner: &'s dyn FieldSource, key: &str) -> Option<WhereKey<'s>> {
    match key {
        "AND" => return Some(WhereKey::And),
        "OR" => return Some(WhereKey::Or),
        "NOT" => return Some(WhereKey::Not),
        "typename_IN" => return Some(WhereKey::Typename),
        "_on" => return Some(WhereKey::On),
        _ => {}
    }
    if let Some(found) = classify_field(owner, key, None) {
        return Some(found);
    }
    for (suffix, comparator) in SUFFIXES {
        if let Some(base) = key.strip_suffix(suffix) {
            if let Some(field) = owner.lookup_field(base) {
                if let FieldKind::Scalar(scalar) = &field.kind {
                    return comparator.allowed_for(scalar).then_some(WhereKey::Scalar {
                        field,
                        scalar,
                        comparator,
                    });
                }
            }
        }
    }
    for (suffix, quantifier) in QUANTIFIERS {
        if let Some(base) = key.strip_suffix(suffix) {
            if let Some(found) = classify_field(owner, base, Some(quantifier)) {
                return Some(found);
            }
        }
    }
    None
}

fn classify_field<'s>(
    owner: &'s dyn FieldSource,
    name: &str,
    quantifier: Option<Quantifier>,
) -> Option<WhereKey<'s>> {
    let field = owner.lookup_field(name)?;
    match &field.kind {
        FieldKind::Scalar(scalar) if quantifier.is_none() => Some(WhereKey::Scalar {
            field,
            scalar,
            comparator: Comparator::Eq,
        }),
        FieldKind::Relationship(relationship) => Some(WhereKey::Relationship {
            field,
            relationship,
            quantifier: quantifier.unwrap_or_else(|| default_quantifier(relationship)),
        }),
        FieldKind::Connection { relationship } => {
            let relationship = relationship_of(owner, relationship)?;
            Some(WhereKey::Connection {
                relationship,
                quantifier: quantifier.unwrap_or_else(|| default_quantifier(relationship)),
            })
        }
        FieldKind::Aggregation { relationship } if quantifier.is_none() => {
            Some(WhereKey::Aggregate {
                relationship: relationship_of(owner, relationship)?,
            })
        }
        _ => None,
    }
}

/// Reduction applied by an aggregate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// `avg(x)`
    Average,
    /// `min(x)`
    Min,
    /// `max(x)`
    Max,
    /// `sum(x)`
    Sum,
    /// `min(size(x))`
    ShortestLength,
    /// `max(size(x))`
    LongestLength,
    /// `avg(size(x))`
    AverageLength,
}

/// Comparison applied to a reduced value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// `=`
    Equal,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

const AGGREGATE_OPS: [(&str, AggregateOp); 5] = [
    ("_EQUAL", AggregateOp::Equal),
    ("_LTE", AggregateOp::Lte),
    ("_GTE", AggregateOp::Gte),
    ("_LT", AggregateOp::Lt),
    ("_GT", AggregateOp::Gt),
];

const AGGREGATE_FUNCTIONS: [(&str, AggregateFunction); 7] = [
    ("_AVERAGE_LENGTH", AggregateFunction::AverageLength),
    ("_SHORTEST_LENGTH", AggregateFunction::ShortestLength),
    ("_LONGEST_LENGTH", AggregateFunction::LongestLength),
    ("_AVERAGE", AggregateFunction::Average),
    ("_MIN", AggregateFunction::Min),
    ("_MAX", AggregateFunction::Max),
    ("_SUM", AggregateFunction::Sum),
];

/// Parses `count`, `count_LT`, ... inside an aggregate filter.
pub fn parse_count_key(key: &str) -> Option<AggregateOp> {
    match key {
        "count" => Some(AggregateOp::Equal),
        "count_LT" => Some(AggregateOp::Lt),
        "count_LTE" => Some(AggregateOp::Lte),
        "count_GT" => Some(AggregateOp::Gt),
        "count_GTE" => Some(AggregateOp::Gte),
        _ => None,
    }
}

/// Parses `<field>_<FUNCTION>_<OP>` inside an aggregate `node`/`edge` filter.
pub fn parse_aggregate_key<'s>(
    owner: &'s dyn FieldSource,
    key: &str,
) -> Option<(&'s FieldDef, AggregateFunction, AggregateOp)> {
    let (rest, op) = AGGREGATE_OPS
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|rest| (rest, *op)))?;
    let (name, function) = AGGREGATE_FUNCTIONS
        .iter()
        .find_map(|(suffix, f)| rest.strip_suffix(suffix).map(|name| (name, *f)))?;
    let field = owner.lookup_field(name)?;
    let scalar = field.as_scalar()?;
    if scalar.list {
        return None;
    }
    let allowed = match function {
        AggregateFunction::ShortestLength
        | AggregateFunction::LongestLength
        | AggregateFunction::AverageLength => scalar.ty.is_textual(),
        AggregateFunction::Average | AggregateFunction::Sum => scalar.ty.is_numeric(),
        AggregateFunction::Min | AggregateFunction::Max => {
            scalar.ty.is_numeric() || scalar.ty.is_temporal()
        }
    };
    allowed.then_some((field, function, op))
}

/// Validates a rule's node template against `owner`.
///
/// Aggregate filters are rejected: rule predicates are evaluated inline and
/// cannot hoist the subqueries an aggregate comparison needs.
pub(crate) fn validate_template(
    schema: &Schema,
    owner: &dyn FieldSource,
    template: &Value,
) -> SchemaResult<()> {
    let map = template.as_map().ok_or_else(|| SchemaError::InvalidAuthorizationRule {
        owner: owner.type_name().to_owned(),
        reason: "filter must be an object".into(),
    })?;
    for (key, value) in map {
        let unknown = || SchemaError::UnknownComparator {
            owner: owner.type_name().to_owned(),
            key: key.clone(),
        };
        match classify_where_key(owner, key).ok_or_else(unknown)? {
            WhereKey::And | WhereKey::Or => {
                for item in value.as_list().ok_or_else(unknown)? {
                    validate_template(schema, owner, item)?;
                }
            }
            WhereKey::Not => validate_template(schema, owner, value)?,
            WhereKey::Scalar { .. } | WhereKey::Typename => {}
            WhereKey::On => {
                for (member, inner) in value.as_map().ok_or_else(unknown)? {
                    let source = schema.field_source(member).ok_or_else(|| {
                        SchemaError::UnknownEntity {
                            name: member.clone(),
                        }
                    })?;
                    validate_template(schema, source, inner)?;
                }
            }
            WhereKey::Relationship { relationship, .. } => {
                if !value.is_null() {
                    validate_related(schema, relationship, value)?;
                }
            }
            WhereKey::Connection { relationship, .. } => {
                let inner = value.as_map().ok_or_else(unknown)?;
                for (part, part_value) in inner {
                    match part.as_str() {
                        "node" => validate_related(schema, relationship, part_value)?,
                        "edge" => {
                            let props = relationship
                                .properties
                                .as_deref()
                                .and_then(|name| schema.properties(name))
                                .ok_or_else(unknown)?;
                            validate_template(schema, props, part_value)?;
                        }
                        _ => return Err(unknown()),
                    }
                }
            }
            WhereKey::Aggregate { .. } => {
                return Err(SchemaError::InvalidAuthorizationRule {
                    owner: owner.type_name().to_owned(),
                    reason: format!("aggregate filter '{key}' is not allowed in rules"),
                })
            }
        }
    }
    Ok(())
}

fn validate_related(
    schema: &Schema,
    relationship: &RelationshipDef,
    value: &Value,
) -> SchemaResult<()> {
    match &relationship.target {
        TypeTarget::Union(_) => {
            let map = value.as_map().ok_or_else(|| SchemaError::InvalidAuthorizationRule {
                owner: relationship.source.clone(),
                reason: format!("filter on union field '{}' must be keyed by member", relationship.field),
            })?;
            for (member, inner) in map {
                if !relationship.members.contains(member) {
                    return Err(SchemaError::UnknownComparator {
                        owner: relationship.target_name().to_owned(),
                        key: member.clone(),
                    });
                }
                let entity = schema.entity(member).ok_or_else(|| SchemaError::UnknownEntity {
                    name: member.clone(),
                })?;
                validate_template(schema, entity, inner)?;
            }
            Ok(())
        }
        target => {
            let source = schema
                .field_source(target.name())
                .ok_or_else(|| SchemaError::UnknownEntity {
                    name: target.name().to_owned(),
                })?;
            validate_template(schema, source, value)
        }
    }
}
