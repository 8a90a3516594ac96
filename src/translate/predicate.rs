//! `where` arguments and rule templates compiled to predicate expressions.
//!
//! Every literal is validated against the compared field's scalar type and
//! hoisted into a parameter. Relationship quantifiers become `EXISTS {}` /
//! `COUNT {}` subqueries; aggregate comparisons need a correlated `CALL {}`
//! and are returned as preludes the caller emits ahead of the predicate.

use crate::claims::Placeholder;
use crate::coerce::{coerce_field, coerce_literal, constructor, wrap_list, wrap_scalar};
use crate::cypher::{ArithOp, Clause, CompareOp, Expr, Imports, NodePattern, Pattern, RelPattern, Var};
use crate::error::{TranslateError, TranslateResult};
use crate::schema::filter::{parse_aggregate_key, parse_count_key, AggregateFunction, AggregateOp};
use crate::schema::{
    classify_where_key, Comparator, EntityDef, FieldDef, FieldSource, Quantifier,
    RelationshipDef, ScalarField, ScalarType, TypeTarget, WhereKey,
};
use crate::value::{Value, ValueMap};

use super::context::TranslationContext;
use super::{hop_pattern, membership};

/// A compiled filter plus the subqueries it reads from.
#[derive(Debug)]
pub(crate) struct Filter {
    pub(crate) predicate: Expr,
    pub(crate) preludes: Vec<Clause>,
}

/// Where the filter text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FilterMode {
    /// Caller-supplied `where` argument.
    User,
    /// Authorization rule template; `$jwt.*` / `$context.*` strings resolve
    /// against the claims.
    Template,
}

/// Compiles a node `where` argument against `owner`, bound to `var`.
pub(crate) fn build_filter<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    var: &Var,
    value: Option<&Value>,
    mode: FilterMode,
) -> TranslateResult<Filter> {
    let mut builder = PredicateBuilder::new(ctx, mode);
    let predicate = match value {
        None | Some(Value::Null) => Expr::Bool(true),
        Some(value) => builder.node_filter(owner, var, value, 1)?,
    };
    Ok(Filter {
        predicate,
        preludes: builder.preludes,
    })
}

/// Compiles a rule template. Templates never carry aggregate filters, so no
/// preludes can arise.
pub(crate) fn template_predicate<'a>(
    ctx: &mut TranslationContext<'a>,
    owner: &'a dyn FieldSource,
    var: &Var,
    template: &Value,
) -> TranslateResult<Expr> {
    let filter = build_filter(ctx, owner, var, Some(template), FilterMode::Template)?;
    if !filter.preludes.is_empty() {
        return Err(TranslateError::malformed(
            "aggregate filters are not supported in authorization rules",
        ));
    }
    Ok(filter.predicate)
}

/// Compiles a connection `where` (`{ node, edge, AND, OR, NOT }`).
pub(crate) fn connection_filter<'a>(
    ctx: &mut TranslationContext<'a>,
    relationship: &'a RelationshipDef,
    node_owner: &'a dyn FieldSource,
    node: &Var,
    edge: &Var,
    value: Option<&Value>,
) -> TranslateResult<Filter> {
    let mut builder = PredicateBuilder::new(ctx, FilterMode::User);
    let predicate = match value {
        None | Some(Value::Null) => Expr::Bool(true),
        Some(value) => builder.connection_where(relationship, node_owner, node, edge, value, 1)?,
    };
    Ok(Filter {
        predicate,
        preludes: builder.preludes,
    })
}

/// Member-name keys of a union `where`, when the value is keyed that way.
pub(crate) fn union_where<'v>(
    ctx: &TranslationContext<'_>,
    union_name: &str,
    value: Option<&'v Value>,
) -> TranslateResult<Vec<(String, &'v Value)>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let map = value
        .as_map()
        .ok_or_else(|| TranslateError::malformed(format!("where on union '{union_name}' must be an object")))?;
    let target = TypeTarget::Union(union_name.to_owned());
    map.iter()
        .map(|(member, inner)| {
            if ctx.schema.is_member(&target, member) {
                Ok((member.clone(), inner))
            } else {
                Err(TranslateError::UnknownConcreteType {
                    abstract_type: union_name.to_owned(),
                    name: member.clone(),
                })
            }
        })
        .collect()
}

/// `typename_IN` entries at the top level of an interface `where`.
pub(crate) fn top_level_typenames(
    interface: &str,
    implementers: &[String],
    value: Option<&Value>,
) -> TranslateResult<Option<Vec<String>>> {
    let Some(names) = value.and_then(Value::as_map).and_then(|m| m.get("typename_IN")) else {
        return Ok(None);
    };
    let names = typename_list(names)?;
    for name in &names {
        if !implementers.contains(name) {
            return Err(TranslateError::UnknownConcreteType {
                abstract_type: interface.to_owned(),
                name: name.clone(),
            });
        }
    }
    Ok(Some(names))
}

fn typename_list(value: &Value) -> TranslateResult<Vec<String>> {
    let items = value
        .as_list()
        .ok_or_else(|| TranslateError::malformed("typename_IN expects a list of type names"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| TranslateError::malformed("typename_IN expects a list of type names"))
        })
        .collect()
}

fn object<'v>(value: &'v Value, what: &str) -> TranslateResult<&'v ValueMap> {
    value
        .as_map()
        .ok_or_else(|| TranslateError::malformed(format!("{what} must be an object, found {}", value.kind())))
}

fn list<'v>(value: &'v Value, what: &str) -> TranslateResult<&'v [Value]> {
    value
        .as_list()
        .ok_or_else(|| TranslateError::malformed(format!("{what} must be a list, found {}", value.kind())))
}

struct PredicateBuilder<'c, 'a> {
    ctx: &'c mut TranslationContext<'a>,
    mode: FilterMode,
    preludes: Vec<Clause>,
    quantified: usize,
}

impl<'c, 'a> PredicateBuilder<'c, 'a> {
    fn new(ctx: &'c mut TranslationContext<'a>, mode: FilterMode) -> Self {
        Self {
            ctx,
            mode,
            preludes: Vec::new(),
            quantified: 0,
        }
    }

    fn node_filter(
        &mut self,
        owner: &'a dyn FieldSource,
        var: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        self.ctx.check_filter_depth(depth)?;
        let map = object(value, "where")?;
        let mut parts = Vec::with_capacity(map.len());
        for (key, value) in map {
            let classified =
                classify_where_key(owner, key).ok_or_else(|| TranslateError::UnknownFilterField {
                    owner: owner.type_name().to_owned(),
                    key: key.clone(),
                })?;
            let part = match classified {
                WhereKey::And => {
                    let mut items = Vec::new();
                    for item in list(value, "AND")? {
                        items.push(self.node_filter(owner, var, item, depth + 1)?);
                    }
                    Expr::and(items)
                }
                WhereKey::Or => {
                    let mut items = Vec::new();
                    for item in list(value, "OR")? {
                        items.push(self.node_filter(owner, var, item, depth + 1)?);
                    }
                    Expr::or(items)
                }
                WhereKey::Not => {
                    if value.is_null() {
                        continue;
                    }
                    negate(self.node_filter(owner, var, value, depth + 1)?)
                }
                WhereKey::Scalar {
                    field,
                    scalar,
                    comparator,
                } => self.scalar(key, field, scalar, comparator, var, value)?,
                WhereKey::Relationship {
                    relationship,
                    quantifier,
                    ..
                } => self.relationship(key, relationship, quantifier, var, value, depth)?,
                WhereKey::Connection {
                    relationship,
                    quantifier,
                } => self.connection(key, relationship, quantifier, var, value, depth)?,
                WhereKey::Aggregate { relationship } => {
                    self.aggregate(key, relationship, var, value, depth)?
                }
                WhereKey::Typename => self.typename(owner, var, value)?,
                WhereKey::On => self.on(owner, var, value, depth)?,
            };
            parts.push(part);
        }
        Ok(Expr::and(parts))
    }

    fn placeholder(&self, value: &Value) -> Option<Placeholder> {
        match self.mode {
            FilterMode::Template => value.as_str().and_then(Placeholder::parse),
            FilterMode::User => None,
        }
    }

    /// Resolves placeholders nested in a template list literal.
    fn resolve_nested(&self, value: &Value) -> (Value, bool) {
        if self.mode == FilterMode::User {
            return (value.clone(), false);
        }
        match value {
            Value::List(items) => {
                let mut resolved = false;
                let items = items
                    .iter()
                    .map(|item| match item.as_str().and_then(Placeholder::parse) {
                        Some(placeholder) => {
                            resolved = true;
                            self.ctx.claims.resolve(&placeholder)
                        }
                        None => item.clone(),
                    })
                    .collect();
                (Value::List(items), resolved)
            }
            other => (other.clone(), false),
        }
    }

    fn scalar(
        &mut self,
        key: &str,
        field: &FieldDef,
        scalar: &ScalarField,
        comparator: Comparator,
        var: &Var,
        value: &Value,
    ) -> TranslateResult<Expr> {
        let property = var.prop(field.db_property());
        if let Some(placeholder) = self.placeholder(value) {
            let resolved = self.ctx.claims.resolve(&placeholder);
            let param = self.ctx.param(resolved);
            let comparison = self.comparison(scalar, comparator, property, param.clone());
            return Ok(Expr::and([param.is_not_null(), comparison]));
        }
        if value.is_null() {
            return match comparator {
                Comparator::Eq => Ok(property.is_null()),
                _ => Err(TranslateError::malformed(format!("'{key}' does not accept null"))),
            };
        }
        let (value, from_claims) = self.resolve_nested(value);
        let literal = if from_claims {
            value
        } else {
            self.literal(key, scalar, comparator, value)?
        };
        let param = self.ctx.param(literal);
        Ok(self.comparison(scalar, comparator, property, param))
    }

    fn literal(
        &self,
        key: &str,
        scalar: &ScalarField,
        comparator: Comparator,
        value: Value,
    ) -> TranslateResult<Value> {
        match comparator {
            Comparator::In => {
                let items = match value {
                    Value::List(items) => items,
                    other => {
                        return Err(TranslateError::invalid_argument(
                            key,
                            format!("expected a list, found {}", other.kind()),
                        ))
                    }
                };
                if items.len() > self.ctx.config.max_in_list {
                    return Err(TranslateError::invalid_argument(
                        key,
                        format!("list exceeds {} elements", self.ctx.config.max_in_list),
                    ));
                }
                items
                    .into_iter()
                    .map(|item| coerce_literal(&scalar.ty, item))
                    .collect::<TranslateResult<Vec<_>>>()
                    .map(Value::List)
            }
            Comparator::Includes => coerce_literal(&scalar.ty, value),
            Comparator::Distance => distance_literal(key, &scalar.ty, value),
            Comparator::Lt | Comparator::Lte | Comparator::Gt | Comparator::Gte
                if scalar.ty.is_spatial() =>
            {
                distance_literal(key, &scalar.ty, value)
            }
            Comparator::Eq => coerce_field(scalar, value),
            _ => coerce_literal(&scalar.ty, value),
        }
    }

    fn wrap_list_param(&mut self, ty: &ScalarType, param: Expr) -> Expr {
        if constructor(ty).is_some() {
            let element = self.ctx.fresh_var();
            wrap_list(ty, param, element)
        } else {
            param
        }
    }

    fn comparison(
        &mut self,
        scalar: &ScalarField,
        comparator: Comparator,
        property: Expr,
        param: Expr,
    ) -> Expr {
        let ty = &scalar.ty;
        match comparator {
            Comparator::Eq if scalar.list => {
                let wrapped = self.wrap_list_param(ty, param);
                Expr::eq(property, wrapped)
            }
            Comparator::Eq => Expr::eq(property, wrap_scalar(ty, param)),
            Comparator::In => {
                let wrapped = self.wrap_list_param(ty, param);
                Expr::compare(property, CompareOp::In, wrapped)
            }
            Comparator::Includes => Expr::compare(wrap_scalar(ty, param), CompareOp::In, property),
            Comparator::Contains => Expr::compare(property, CompareOp::Contains, param),
            Comparator::StartsWith => Expr::compare(property, CompareOp::StartsWith, param),
            Comparator::EndsWith => Expr::compare(property, CompareOp::EndsWith, param),
            Comparator::Matches => Expr::compare(property, CompareOp::Matches, param),
            Comparator::Distance => distance(property, param, CompareOp::Eq),
            Comparator::Lt | Comparator::Lte | Comparator::Gt | Comparator::Gte => {
                let op = ordered_op(comparator);
                if ty.is_spatial() {
                    distance(property, param, op)
                } else {
                    Expr::compare(property, op, wrap_scalar(ty, param))
                }
            }
        }
    }

    fn relationship(
        &mut self,
        key: &str,
        relationship: &'a RelationshipDef,
        quantifier: Quantifier,
        var: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        if value.is_null() {
            return self.absent(key, relationship, quantifier, var);
        }
        let schema = self.ctx.schema;
        let mut parts = Vec::new();
        match &relationship.target {
            TypeTarget::Union(union_name) => {
                for (member, inner) in union_where(self.ctx, union_name, Some(value))? {
                    let Some(entity) = schema.entity(&member) else {
                        continue;
                    };
                    let node = self.ctx.fresh_node();
                    let pattern = hop_pattern(var, relationship, None, &node, &entity.labels);
                    let predicate = self.nested(entity, &node, inner, depth)?;
                    parts.push((pattern, predicate));
                }
            }
            target => {
                let owner = target_source(schema, target).ok_or_else(|| {
                    TranslateError::unknown_field(&relationship.source, &relationship.field)
                })?;
                let node = self.ctx.fresh_node();
                let (labels, member_test) = membership(schema, target, &node);
                let pattern = hop_pattern(var, relationship, None, &node, &labels);
                let predicate = self.nested(owner, &node, value, depth)?;
                parts.push((pattern, Expr::and([member_test, predicate])));
            }
        }
        Ok(quantify(quantifier, parts))
    }

    /// `field: null` and the connection equivalent.
    fn absent(
        &mut self,
        key: &str,
        relationship: &RelationshipDef,
        quantifier: Quantifier,
        var: &Var,
    ) -> TranslateResult<Expr> {
        if !matches!(quantifier, Quantifier::Exists | Quantifier::Some) {
            return Err(TranslateError::malformed(format!("'{key}' does not accept null")));
        }
        let schema = self.ctx.schema;
        let parts = schema
            .members(&relationship.target)
            .into_iter()
            .map(|member| {
                let pattern = Pattern::hop(
                    NodePattern::bound(var),
                    RelPattern::new(None, &relationship.rel_type, relationship.direction),
                    NodePattern::anonymous(&member.labels),
                );
                Expr::not(Expr::exists(pattern, Expr::Bool(true)))
            });
        Ok(Expr::and(parts))
    }

    fn nested(
        &mut self,
        owner: &'a dyn FieldSource,
        node: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        self.quantified += 1;
        let predicate = self.node_filter(owner, node, value, depth + 1);
        self.quantified -= 1;
        predicate
    }

    fn connection(
        &mut self,
        key: &str,
        relationship: &'a RelationshipDef,
        quantifier: Quantifier,
        var: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        if value.is_null() {
            return self.absent(key, relationship, quantifier, var);
        }
        let schema = self.ctx.schema;
        let mut parts = Vec::new();
        match &relationship.target {
            TypeTarget::Union(union_name) => {
                for (member, inner) in union_where(self.ctx, union_name, Some(value))? {
                    let Some(entity) = schema.entity(&member) else {
                        continue;
                    };
                    let edge = self.ctx.fresh_node();
                    let node = self.ctx.fresh_node();
                    let pattern = hop_pattern(var, relationship, Some(&edge), &node, &entity.labels);
                    self.quantified += 1;
                    let predicate = self.connection_where(relationship, entity, &node, &edge, inner, depth + 1);
                    self.quantified -= 1;
                    parts.push((pattern, predicate?));
                }
            }
            target => {
                let owner = target_source(schema, target).ok_or_else(|| {
                    TranslateError::unknown_field(&relationship.source, &relationship.field)
                })?;
                let edge = self.ctx.fresh_node();
                let node = self.ctx.fresh_node();
                let (labels, member_test) = membership(schema, target, &node);
                let pattern = hop_pattern(var, relationship, Some(&edge), &node, &labels);
                self.quantified += 1;
                let predicate = self.connection_where(relationship, owner, &node, &edge, value, depth + 1);
                self.quantified -= 1;
                parts.push((pattern, Expr::and([member_test, predicate?])));
            }
        }
        Ok(quantify(quantifier, parts))
    }

    fn connection_where(
        &mut self,
        relationship: &'a RelationshipDef,
        node_owner: &'a dyn FieldSource,
        node: &Var,
        edge: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        self.ctx.check_filter_depth(depth)?;
        let schema = self.ctx.schema;
        let map = object(value, "connection where")?;
        let mut parts = Vec::new();
        for (key, inner) in map {
            let part = match key.as_str() {
                "node" => self.node_filter(node_owner, node, inner, depth + 1)?,
                "edge" => {
                    let properties = relationship
                        .properties
                        .as_deref()
                        .and_then(|name| schema.properties(name))
                        .ok_or_else(|| TranslateError::UnknownFilterField {
                            owner: connection_owner(relationship),
                            key: key.clone(),
                        })?;
                    self.node_filter(properties, edge, inner, depth + 1)?
                }
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in list(inner, key)? {
                        items.push(self.connection_where(relationship, node_owner, node, edge, item, depth + 1)?);
                    }
                    if key == "AND" {
                        Expr::and(items)
                    } else {
                        Expr::or(items)
                    }
                }
                "NOT" => {
                    if inner.is_null() {
                        continue;
                    }
                    negate(self.connection_where(relationship, node_owner, node, edge, inner, depth + 1)?)
                }
                _ => {
                    return Err(TranslateError::UnknownFilterField {
                        owner: connection_owner(relationship),
                        key: key.clone(),
                    })
                }
            };
            parts.push(part);
        }
        Ok(Expr::and(parts))
    }

    fn aggregate(
        &mut self,
        key: &str,
        relationship: &'a RelationshipDef,
        var: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        if self.quantified > 0 || self.mode == FilterMode::Template {
            return Err(TranslateError::malformed(format!(
                "aggregate filter '{key}' cannot be nested inside a relationship filter"
            )));
        }
        let schema = self.ctx.schema;
        let target = schema.entity(relationship.target_name()).ok_or_else(|| {
            TranslateError::malformed(format!("aggregate filter '{key}' needs a concrete target"))
        })?;
        let edge = self.ctx.fresh_node();
        let node = self.ctx.fresh_node();
        let out = self.ctx.fresh_var();
        let predicate = self.aggregate_where(relationship, target, &node, &edge, value, depth + 1)?;
        if let Expr::Bool(_) = predicate {
            return Ok(predicate);
        }
        self.preludes.push(Clause::call(
            Imports::var(var),
            vec![
                Clause::matching(
                    hop_pattern(var, relationship, Some(&edge), &node, &target.labels),
                    Expr::Bool(true),
                ),
                Clause::return_single(predicate, &out),
            ],
        ));
        Ok(Expr::eq(out.expr(), Expr::Bool(true)))
    }

    fn aggregate_where(
        &mut self,
        relationship: &'a RelationshipDef,
        target: &'a EntityDef,
        node: &Var,
        edge: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        self.ctx.check_filter_depth(depth)?;
        let schema = self.ctx.schema;
        let unknown = |key: &str| TranslateError::UnknownFilterField {
            owner: format!("{}Aggregate", relationship.field),
            key: key.to_owned(),
        };
        let map = object(value, "aggregate where")?;
        let mut parts = Vec::new();
        for (key, inner) in map {
            if let Some(op) = parse_count_key(key) {
                let count = coerce_literal(&ScalarType::Int, inner.clone())?;
                if count.is_null() {
                    return Err(TranslateError::malformed(format!("'{key}' does not accept null")));
                }
                let param = self.ctx.param(count);
                parts.push(Expr::compare(
                    Expr::call("count", vec![node.expr()]),
                    aggregate_op(op),
                    param,
                ));
                continue;
            }
            let part = match key.as_str() {
                "node" => self.aggregate_fields(target, node, inner)?,
                "edge" => {
                    let properties = relationship
                        .properties
                        .as_deref()
                        .and_then(|name| schema.properties(name))
                        .ok_or_else(|| unknown(key))?;
                    self.aggregate_fields(properties, edge, inner)?
                }
                "AND" | "OR" => {
                    let mut items = Vec::new();
                    for item in list(inner, key)? {
                        items.push(self.aggregate_where(relationship, target, node, edge, item, depth + 1)?);
                    }
                    if key == "AND" {
                        Expr::and(items)
                    } else {
                        Expr::or(items)
                    }
                }
                "NOT" => negate(self.aggregate_where(relationship, target, node, edge, inner, depth + 1)?),
                _ => return Err(unknown(key)),
            };
            parts.push(part);
        }
        Ok(Expr::and(parts))
    }

    fn aggregate_fields(
        &mut self,
        owner: &'a dyn FieldSource,
        var: &Var,
        value: &Value,
    ) -> TranslateResult<Expr> {
        let map = object(value, "aggregate field filter")?;
        let mut parts = Vec::new();
        for (key, inner) in map {
            let (field, function, op) =
                parse_aggregate_key(owner, key).ok_or_else(|| TranslateError::UnknownFilterField {
                    owner: owner.type_name().to_owned(),
                    key: key.clone(),
                })?;
            let Some(scalar) = field.as_scalar() else {
                continue;
            };
            let property = var.prop(field.db_property());
            let (aggregated, literal_ty) = match function {
                AggregateFunction::Average => (Expr::call("avg", vec![property]), ScalarType::Float),
                AggregateFunction::Sum => (Expr::call("sum", vec![property]), scalar.ty.clone()),
                AggregateFunction::Min => (Expr::call("min", vec![property]), scalar.ty.clone()),
                AggregateFunction::Max => (Expr::call("max", vec![property]), scalar.ty.clone()),
                AggregateFunction::ShortestLength => (
                    Expr::call("min", vec![Expr::call("size", vec![property])]),
                    ScalarType::Int,
                ),
                AggregateFunction::LongestLength => (
                    Expr::call("max", vec![Expr::call("size", vec![property])]),
                    ScalarType::Int,
                ),
                AggregateFunction::AverageLength => (
                    Expr::call("avg", vec![Expr::call("size", vec![property])]),
                    ScalarType::Float,
                ),
            };
            let literal = coerce_literal(&literal_ty, inner.clone())?;
            if literal.is_null() {
                return Err(TranslateError::malformed(format!("'{key}' does not accept null")));
            }
            let param = self.ctx.param(literal);
            parts.push(Expr::compare(aggregated, aggregate_op(op), wrap_scalar(&literal_ty, param)));
        }
        Ok(Expr::and(parts))
    }

    fn typename(
        &mut self,
        owner: &'a dyn FieldSource,
        var: &Var,
        value: &Value,
    ) -> TranslateResult<Expr> {
        let schema = self.ctx.schema;
        let names = typename_list(value)?;
        if let Some(entity) = schema.entity(owner.type_name()) {
            for name in &names {
                if schema.entity(name).is_none() {
                    return Err(TranslateError::UnknownConcreteType {
                        abstract_type: owner.type_name().to_owned(),
                        name: name.clone(),
                    });
                }
            }
            return Ok(Expr::Bool(names.iter().any(|name| *name == entity.name)));
        }
        let Some(interface) = schema.interface(owner.type_name()) else {
            return Err(TranslateError::UnknownFilterField {
                owner: owner.type_name().to_owned(),
                key: "typename_IN".into(),
            });
        };
        let mut parts = Vec::new();
        for name in &names {
            let member = schema
                .entity(name)
                .filter(|_| interface.implementers.contains(name))
                .ok_or_else(|| TranslateError::UnknownConcreteType {
                    abstract_type: interface.name.clone(),
                    name: name.clone(),
                })?;
            parts.push(Expr::HasLabels(var.clone(), member.labels.clone()));
        }
        Ok(Expr::or(parts))
    }

    fn on(
        &mut self,
        owner: &'a dyn FieldSource,
        var: &Var,
        value: &Value,
        depth: usize,
    ) -> TranslateResult<Expr> {
        let schema = self.ctx.schema;
        let map = object(value, "_on")?;
        let interface = schema.interface(owner.type_name());
        let mut parts = Vec::new();
        for (member, inner) in map {
            let invalid = || TranslateError::UnknownConcreteType {
                abstract_type: owner.type_name().to_owned(),
                name: member.clone(),
            };
            let entity = schema.entity(member).ok_or_else(invalid)?;
            match interface {
                Some(interface) => {
                    if !interface.implementers.contains(member) {
                        return Err(invalid());
                    }
                    let predicate = self.node_filter(entity, var, inner, depth + 1)?;
                    parts.push(Expr::or([
                        Expr::not(Expr::HasLabels(var.clone(), entity.labels.clone())),
                        predicate,
                    ]));
                }
                None if member == owner.type_name() => {
                    parts.push(self.node_filter(entity, var, inner, depth + 1)?);
                }
                None => {}
            }
        }
        Ok(Expr::and(parts))
    }
}

/// `NOT {}` is a no-op rather than `false`.
fn negate(inner: Expr) -> Expr {
    if inner.is_true() {
        inner
    } else {
        Expr::not(inner)
    }
}

fn connection_owner(relationship: &RelationshipDef) -> String {
    format!("{}Connection", relationship.field)
}

pub(crate) fn target_source<'s>(
    schema: &'s crate::schema::Schema,
    target: &TypeTarget,
) -> Option<&'s dyn FieldSource> {
    match target {
        TypeTarget::Entity(name) => schema.entity(name).map(|e| e as &dyn FieldSource),
        TypeTarget::Interface(name) => schema.interface(name).map(|i| i as &dyn FieldSource),
        TypeTarget::Union(_) => None,
    }
}

fn quantify(quantifier: Quantifier, parts: Vec<(Pattern, Expr)>) -> Expr {
    match quantifier {
        Quantifier::Some | Quantifier::Exists => {
            Expr::or(parts.into_iter().map(|(pattern, inner)| Expr::exists(pattern, inner)))
        }
        Quantifier::None => Expr::and(
            parts
                .into_iter()
                .map(|(pattern, inner)| Expr::not(Expr::exists(pattern, inner))),
        ),
        Quantifier::All => Expr::and(parts.into_iter().map(|(pattern, inner)| {
            if inner.is_true() {
                inner
            } else {
                Expr::not(Expr::exists(pattern, Expr::not(inner)))
            }
        })),
        Quantifier::Single => {
            let total = parts
                .into_iter()
                .map(|(pattern, inner)| Expr::count(pattern, inner))
                .reduce(|sum, count| Expr::Arith(Box::new(sum), ArithOp::Add, Box::new(count)))
                .unwrap_or(Expr::Int(0));
            Expr::eq(total, Expr::Int(1))
        }
    }
}

fn ordered_op(comparator: Comparator) -> CompareOp {
    match comparator {
        Comparator::Lt => CompareOp::Lt,
        Comparator::Lte => CompareOp::Lte,
        Comparator::Gt => CompareOp::Gt,
        _ => CompareOp::Gte,
    }
}

fn aggregate_op(op: AggregateOp) -> CompareOp {
    match op {
        AggregateOp::Equal => CompareOp::Eq,
        AggregateOp::Lt => CompareOp::Lt,
        AggregateOp::Lte => CompareOp::Lte,
        AggregateOp::Gt => CompareOp::Gt,
        AggregateOp::Gte => CompareOp::Gte,
    }
}

/// `point.distance(property, point($p.point)) op $p.distance`
fn distance(property: Expr, param: Expr, op: CompareOp) -> Expr {
    Expr::compare(
        Expr::call(
            "point.distance",
            vec![property, Expr::call("point", vec![param.clone().property("point")])],
        ),
        op,
        param.property("distance"),
    )
}

fn distance_literal(key: &str, ty: &ScalarType, value: Value) -> TranslateResult<Value> {
    let Value::Map(mut map) = value else {
        return Err(TranslateError::invalid_argument(key, "expected { point, distance }"));
    };
    let point = map
        .shift_remove("point")
        .ok_or_else(|| TranslateError::invalid_argument(key, "missing 'point'"))?;
    let distance = map
        .shift_remove("distance")
        .ok_or_else(|| TranslateError::invalid_argument(key, "missing 'distance'"))?;
    if !map.is_empty() || distance.as_f64().is_none() {
        return Err(TranslateError::invalid_argument(key, "expected { point, distance }"));
    }
    let mut out = ValueMap::new();
    out.insert("point".into(), coerce_literal(ty, point)?);
    out.insert("distance".into(), distance);
    Ok(Value::Map(out))
}
