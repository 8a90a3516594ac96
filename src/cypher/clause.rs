//! Clause-level IR: patterns, projections and the clause list.

use super::expr::{Expr, Var};
use crate::schema::{Direction, SortDirection};

/// Arrow drawn between two node patterns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatternDirection {
    /// `-[]->`
    Right,
    /// `<-[]-`
    Left,
    /// `-[]-`
    Both,
}

impl From<Direction> for PatternDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Outgoing => PatternDirection::Right,
            Direction::Incoming => PatternDirection::Left,
            Direction::Undirected => PatternDirection::Both,
        }
    }
}

/// `(var:Label {key: expr})`
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NodePattern {
    /// Bound variable; anonymous when `None`.
    pub var: Option<Var>,
    /// Labels, all required.
    pub labels: Vec<String>,
    /// Inline property map.
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    /// Node bound to `var` with `labels`.
    pub fn new(var: &Var, labels: &[String]) -> Self {
        Self {
            var: Some(var.clone()),
            labels: labels.to_vec(),
            properties: Vec::new(),
        }
    }

    /// Already bound node, no labels.
    pub fn bound(var: &Var) -> Self {
        Self {
            var: Some(var.clone()),
            labels: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Anonymous node with labels.
    pub fn anonymous(labels: &[String]) -> Self {
        Self {
            var: None,
            labels: labels.to_vec(),
            properties: Vec::new(),
        }
    }
}

/// `-[var:TYPE {key: expr}]->`
#[derive(Clone, Debug, PartialEq)]
pub struct RelPattern {
    /// Bound variable; anonymous when `None`.
    pub var: Option<Var>,
    /// Relationship type.
    pub rel_type: String,
    /// Arrow direction relative to the left node.
    pub direction: PatternDirection,
    /// Inline property map.
    pub properties: Vec<(String, Expr)>,
}

impl RelPattern {
    /// Relationship hop of `rel_type` in `direction`.
    pub fn new(var: Option<&Var>, rel_type: &str, direction: impl Into<PatternDirection>) -> Self {
        Self {
            var: var.cloned(),
            rel_type: rel_type.to_owned(),
            direction: direction.into(),
            properties: Vec::new(),
        }
    }
}

/// A path pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// Leftmost node.
    pub start: NodePattern,
    /// Relationship/node hops to the right.
    pub hops: Vec<(RelPattern, NodePattern)>,
}

impl Pattern {
    /// Single node pattern.
    pub fn node(node: NodePattern) -> Self {
        Self {
            start: node,
            hops: Vec::new(),
        }
    }

    /// One-hop pattern.
    pub fn hop(start: NodePattern, rel: RelPattern, end: NodePattern) -> Self {
        Self {
            start,
            hops: vec![(rel, end)],
        }
    }
}

/// Variables imported into a `CALL {}` body.
#[derive(Clone, Debug, PartialEq)]
pub enum Imports {
    /// Uncorrelated subquery.
    None,
    /// `WITH *`
    Star,
    /// `WITH a, b`
    Vars(Vec<Var>),
}

impl Imports {
    /// Imports a single variable.
    pub fn var(var: &Var) -> Self {
        Imports::Vars(vec![var.clone()])
    }
}

/// `expr [AS alias]`
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionItem {
    /// Projected expression.
    pub expr: Expr,
    /// Output name.
    pub alias: Option<Var>,
}

impl ProjectionItem {
    /// `expr AS alias`
    pub fn aliased(expr: Expr, alias: &Var) -> Self {
        Self {
            expr,
            alias: Some(alias.clone()),
        }
    }

    /// Bare variable.
    pub fn var(var: &Var) -> Self {
        Self {
            expr: var.expr(),
            alias: None,
        }
    }
}

/// `ORDER BY` key.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
    /// Sort expression.
    pub expr: Expr,
    /// Direction.
    pub direction: SortDirection,
}

/// Body shared by `WITH` and `RETURN`.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Projection {
    /// `DISTINCT`
    pub distinct: bool,
    /// Leading `*`.
    pub star: bool,
    /// Projected items.
    pub items: Vec<ProjectionItem>,
    /// `ORDER BY`
    pub order: Vec<OrderItem>,
    /// `SKIP`
    pub skip: Option<Expr>,
    /// `LIMIT`
    pub limit: Option<Expr>,
}

impl Projection {
    /// `*`
    pub fn star() -> Self {
        Self {
            star: true,
            ..Self::default()
        }
    }

    /// Explicit items.
    pub fn items(items: Vec<ProjectionItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Single `expr AS alias`.
    pub fn single(expr: Expr, alias: &Var) -> Self {
        Self::items(vec![ProjectionItem::aliased(expr, alias)])
    }

    /// Whether ordering or paging is attached.
    pub fn is_paged(&self) -> bool {
        !self.order.is_empty() || self.skip.is_some() || self.limit.is_some()
    }
}

/// `SET` item.
#[derive(Clone, Debug, PartialEq)]
pub enum SetItem {
    /// `var.property = value`
    Property {
        /// Bound node or relationship.
        var: Var,
        /// Stored property name.
        property: String,
        /// Assigned expression.
        value: Expr,
    },
}

impl SetItem {
    /// `var.property = value`
    pub fn property(var: &Var, property: impl Into<String>, value: Expr) -> Self {
        SetItem::Property {
            var: var.clone(),
            property: property.into(),
            value,
        }
    }
}

/// One clause of the emitted statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    /// `[OPTIONAL] MATCH p1, p2 [WHERE predicate]`
    Match {
        /// `OPTIONAL MATCH`
        optional: bool,
        /// Comma separated patterns.
        patterns: Vec<Pattern>,
        /// Filter.
        predicate: Option<Expr>,
    },
    /// `WITH projection [WHERE predicate]`
    With {
        /// Carried items.
        projection: Projection,
        /// Filter applied after the projection.
        predicate: Option<Expr>,
    },
    /// `UNWIND list AS var`
    Unwind {
        /// List expression.
        list: Expr,
        /// Element variable.
        var: Var,
    },
    /// `CALL { [WITH imports] body }`
    Call {
        /// Imported variables.
        imports: Imports,
        /// Subquery body.
        body: Vec<Clause>,
    },
    /// `CALL { branch UNION branch }`, every branch importing the same variables.
    Union {
        /// Imported variables.
        imports: Imports,
        /// Branch bodies.
        branches: Vec<Vec<Clause>>,
    },
    /// `CREATE pattern`
    Create {
        /// Created patterns.
        patterns: Vec<Pattern>,
    },
    /// `MERGE pattern [ON CREATE SET ..] [ON MATCH SET ..]`
    Merge {
        /// Merged pattern.
        pattern: Pattern,
        /// Assignments on create.
        on_create: Vec<SetItem>,
        /// Assignments on match.
        on_match: Vec<SetItem>,
    },
    /// `SET a, b`
    Set(Vec<SetItem>),
    /// `[DETACH] DELETE targets`
    Delete {
        /// `DETACH DELETE`
        detach: bool,
        /// Deleted expressions.
        targets: Vec<Expr>,
    },
    /// `RETURN projection`
    Return(Projection),
    /// Verbatim statement text, re-indented.
    Raw(String),
}

impl Clause {
    /// `MATCH pattern [WHERE predicate]`, dropping a constant-true predicate.
    pub fn matching(pattern: Pattern, predicate: Expr) -> Self {
        Clause::Match {
            optional: false,
            patterns: vec![pattern],
            predicate: (!predicate.is_true()).then_some(predicate),
        }
    }

    /// `WITH * WHERE predicate`
    pub fn filter(predicate: Expr) -> Self {
        Clause::With {
            projection: Projection::star(),
            predicate: Some(predicate),
        }
    }

    /// `WITH *`
    pub fn with_star() -> Self {
        Clause::With {
            projection: Projection::star(),
            predicate: None,
        }
    }

    /// `WITH vars`
    pub fn with_vars(vars: &[&Var]) -> Self {
        Clause::With {
            projection: Projection::items(vars.iter().map(|v| ProjectionItem::var(v)).collect()),
            predicate: None,
        }
    }

    /// `CALL { WITH var body }`
    pub fn call(imports: Imports, body: Vec<Clause>) -> Self {
        Clause::Call { imports, body }
    }

    /// `RETURN expr AS alias`
    pub fn return_single(expr: Expr, alias: &Var) -> Self {
        Clause::Return(Projection::single(expr, alias))
    }
}
