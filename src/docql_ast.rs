//! DocQL abstract syntax tree.
//!
//! Pure syntax: no resolution against any schema happens here. A query
//! has an optional projection and an optional filter; the parser
//! guarantees at least one of the two is present.

use serde::{Deserialize, Serialize};

/// Top-level query node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub select: Option<Vec<SelectItem>>,
    pub where_clause: Option<BoolExpr>,
}

/// One item of the `select` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    /// A collection-qualified field, optionally renamed. A missing
    /// collection is resolved against the implicit current collection
    /// at compile time.
    Field {
        collection: Option<String>,
        field: String,
        alias: Option<String>,
    },
    /// A bare collection, meaning all of its fields.
    Collection(String),
}

/// Boolean filter expression. `and`/`or` chain to the right of the
/// current term: `A and B or C` is `A and (B or C)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoolExpr {
    Condition(Condition),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

/// A single condition leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        left: Operand,
        right: Operand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        }
    }
}

/// A condition operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// `collection.field`; a missing collection resolves against the
    /// implicit current collection.
    Field {
        collection: Option<String>,
        field: String,
    },
    /// A bare collection, meaning its `_ref`.
    Collection(String),
    Str(String),
    Int(i64),
    /// The external-parameter placeholder `?`.
    Placeholder,
}

impl Operand {
    /// Source text form, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Operand::Field {
                collection: Some(c),
                field,
            } => format!("{}.{}", c, field),
            Operand::Field {
                collection: None,
                field,
            } => format!(".{}", field),
            Operand::Collection(c) => c.clone(),
            Operand::Str(s) => format!("\"{}\"", s),
            Operand::Int(n) => n.to_string(),
            Operand::Placeholder => "?".to_string(),
        }
    }
}
