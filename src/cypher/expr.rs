//! Expression tree of the emitted Cypher.

use super::clause::Pattern;

/// Identifier bound inside one statement.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(pub String);

impl Var {
    /// Wraps a name.
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    /// The bare name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// `var.property`
    pub fn prop(&self, property: impl Into<String>) -> Expr {
        Expr::Property(Box::new(Expr::Var(self.clone())), property.into())
    }

    /// The variable as an expression.
    pub fn expr(&self) -> Expr {
        Expr::Var(self.clone())
    }
}

/// Binary comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IN`
    In,
    /// `CONTAINS`
    Contains,
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `=~`
    Matches,
}

impl CompareOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::In => "IN",
            CompareOp::Contains => "CONTAINS",
            CompareOp::StartsWith => "STARTS WITH",
            CompareOp::EndsWith => "ENDS WITH",
            CompareOp::Matches => "=~",
        }
    }
}

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl ArithOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Entry of a map projection `var { .a, b: expr }`.
#[derive(Clone, Debug, PartialEq)]
pub enum MapEntry {
    /// `.name`
    Property(String),
    /// `key: expr`
    Entry(String, Expr),
}

/// `MATCH pattern WHERE predicate` inside `EXISTS {}` or `COUNT {}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Subquery {
    /// Matched pattern.
    pub pattern: Pattern,
    /// Optional filter.
    pub predicate: Option<Expr>,
}

/// Cypher expression.
///
/// Literal values supplied by callers never appear here; they are hoisted
/// into parameters. `Int` and `Str` carry structural constants only.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Expr {
    Bool(bool),
    Null,
    Int(i64),
    Str(String),
    Var(Var),
    /// `$name`
    Param(String),
    Property(Box<Expr>, String),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    Arith(Box<Expr>, ArithOp, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// `var:A:B`
    HasLabels(Var, Vec<String>),
    Call {
        name: String,
        distinct: bool,
        args: Vec<Expr>,
    },
    CountStar,
    Exists(Box<Subquery>),
    Count(Box<Subquery>),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Projection(Var, Vec<MapEntry>),
    Index(Box<Expr>, Box<Expr>),
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    /// `[var IN list WHERE predicate | map]`
    Comprehension {
        var: Var,
        list: Box<Expr>,
        predicate: Option<Box<Expr>>,
        map: Option<Box<Expr>>,
    },
    /// `reduce(acc = init, var IN list | body)`
    Reduce {
        acc: Var,
        init: Box<Expr>,
        var: Var,
        list: Box<Expr>,
        body: Box<Expr>,
    },
}

impl Expr {
    /// Conjunction with constant folding; empty is `true`.
    pub fn and(parts: impl IntoIterator<Item = Expr>) -> Expr {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Expr::Bool(true) => {}
                Expr::Bool(false) => return Expr::Bool(false),
                Expr::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Expr::Bool(true),
            1 => kept.remove(0),
            _ => Expr::And(kept),
        }
    }

    /// Disjunction with constant folding; empty is `false`.
    pub fn or(parts: impl IntoIterator<Item = Expr>) -> Expr {
        let mut kept = Vec::new();
        for part in parts {
            match part {
                Expr::Bool(false) => {}
                Expr::Bool(true) => return Expr::Bool(true),
                Expr::Or(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Expr::Bool(false),
            1 => kept.remove(0),
            _ => Expr::Or(kept),
        }
    }

    /// Negation with constant folding.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Expr {
        match inner {
            Expr::Bool(value) => Expr::Bool(!value),
            Expr::Not(inner) => *inner,
            other => Expr::Not(Box::new(other)),
        }
    }

    /// `left op right`
    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Expr {
        Expr::Compare(Box::new(left), op, Box::new(right))
    }

    /// `left = right`
    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::compare(left, CompareOp::Eq, right)
    }

    /// Function call.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            distinct: false,
            args,
        }
    }

    /// `name(DISTINCT arg)`
    pub fn call_distinct(name: impl Into<String>, arg: Expr) -> Expr {
        Expr::Call {
            name: name.into(),
            distinct: true,
            args: vec![arg],
        }
    }

    /// `$name`
    pub fn param(name: impl Into<String>) -> Expr {
        Expr::Param(name.into())
    }

    /// `expr.property`
    pub fn property(self, property: impl Into<String>) -> Expr {
        Expr::Property(Box::new(self), property.into())
    }

    /// `expr IS NULL`
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    /// `expr IS NOT NULL`
    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    /// `EXISTS { MATCH pattern WHERE predicate }`
    pub fn exists(pattern: Pattern, predicate: Expr) -> Expr {
        Expr::Exists(Box::new(Subquery {
            pattern,
            predicate: non_trivial(predicate),
        }))
    }

    /// `COUNT { MATCH pattern WHERE predicate }`
    pub fn count(pattern: Pattern, predicate: Expr) -> Expr {
        Expr::Count(Box::new(Subquery {
            pattern,
            predicate: non_trivial(predicate),
        }))
    }

    /// `head(collect(expr))` or `collect(expr)`.
    pub fn collect(expr: Expr, single: bool) -> Expr {
        let collected = Expr::call("collect", vec![expr]);
        if single {
            Expr::call("head", vec![collected])
        } else {
            collected
        }
    }

    /// Whether the expression folded to `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Bool(true))
    }
}

fn non_trivial(predicate: Expr) -> Option<Expr> {
    if predicate.is_true() {
        None
    } else {
        Some(predicate)
    }
}
