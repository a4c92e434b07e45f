//! Script grammar: AST types and the parser.
//!
//! The parser is a pure function (text in, AST or structured error out); the
//! worker pool treats it as an opaque, possibly-slow black box.

pub mod ast;
mod parser;

pub use ast::{Operator, ScriptFile, Statement, Value};
pub use parser::{parse, ScriptError};
