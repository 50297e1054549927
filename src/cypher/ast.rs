//! Read-query AST.

use std::fmt;

use crate::model::{Direction, Value};

/// One read query: `START .. MATCH .. WHERE .. ORDER BY .. RETURN .. SKIP .. LIMIT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadQuery {
    pub start: Vec<StartItem>,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderExpr>,
    pub returns: Vec<ReturnItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

/// `name=node(<expr>)`; the expression yields one id or a list of ids.
#[derive(Debug, Clone, PartialEq)]
pub struct StartItem {
    pub variable: String,
    pub ids: Expr,
}

/// A node followed by zero or more `(relationship, node)` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub start: NodePattern,
    pub steps: Vec<(RelPattern, NodePattern)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub variable: Option<String>,
    /// Alternatives; empty matches any type.
    pub types: Vec<String>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpr {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub expr: Expr,
}

impl ReturnItem {
    /// Result column name: the expression text.
    pub fn column(&self) -> String {
        self.expr.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Regex => "=~",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Parameter(String),
    Variable(String),
    Property { expr: Box<Expr>, key: String },
    Compare { left: Box<Expr>, op: CompareOp, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `count(expr)`: rows where `expr` is not null.
    Count(Box<Expr>),
}

impl Expr {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Count(_))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Parameter(p) => write!(f, "${p}"),
            Expr::Variable(v) => f.write_str(v),
            Expr::Property { expr, key } => write!(f, "{expr}.{key}"),
            Expr::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::And(a, b) => write!(f, "{a} AND {b}"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::Count(e) => write!(f, "count({e})"),
        }
    }
}
