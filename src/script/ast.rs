//! AST types for the script grammar.
//!
//! Scripts are flat lists of `key <op> value` statements where a value is a
//! scalar, a `{ ... }` block of nested statements, or a `{ a b c }` list.

use serde::{Deserialize, Serialize};

/// A fully parsed script file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub statements: Vec<Statement>,
}

/// A single `key <op> value` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub key: String,
    pub op: Operator,
    pub value: Value,
}

/// Comparison/assignment operator between key and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Right-hand side of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    /// A bare word, number, or quoted string.
    Scalar { raw: String },
    /// A nested block of statements.
    Block { statements: Vec<Statement> },
    /// A brace-delimited list of scalars.
    List { items: Vec<String> },
}

impl ScriptFile {
    /// Total number of AST nodes, counting every statement and value.
    pub fn node_count(&self) -> usize {
        self.statements.iter().map(Statement::node_count).sum()
    }
}

impl Statement {
    pub fn node_count(&self) -> usize {
        1 + self.value.node_count()
    }
}

impl Value {
    pub fn node_count(&self) -> usize {
        match self {
            Self::Scalar { .. } => 1,
            Self::Block { statements } => {
                1 + statements.iter().map(Statement::node_count).sum::<usize>()
            }
            Self::List { items } => 1 + items.len(),
        }
    }
}
