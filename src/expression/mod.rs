//! JMESPath expression engine.
//!
//! # Responsibilities
//! - Tokenize and parse expression text into a [`Node`] tree
//! - Evaluate compiled trees against `serde_json::Value` documents
//! - Provide the built-in function library
//!
//! # Design Decisions
//! - Compile once, search many times: [`Expression`] owns its tree and is
//!   shared read-only across requests
//! - Evaluation borrows the input and builds new values; documents passed in
//!   are never modified
//! - `$` resolves to the document handed to [`Expression::search`], so
//!   expressions nested inside projections can still reach the top level
//!
//! # Data Flow
//! ```text
//! text -> Lexer -> Vec<Spanned> -> Parser -> Node
//! Node + Value -> Interpreter -> Value
//! ```

pub mod ast;
pub mod error;
mod functions;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use std::fmt;

use serde_json::Value;

pub use ast::{Comparator, KeyValuePair, Node};
pub use error::{ParseError, RuntimeError};
pub use interpreter::Interpreter;

/// A compiled expression, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Node,
}

impl Expression {
    /// Parse expression text.
    pub fn compile(source: &str) -> Result<Self, ParseError> {
        let ast = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    /// The text this expression was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root of the parsed tree.
    pub fn ast(&self) -> &Node {
        &self.ast
    }

    /// Evaluate against `data`.
    pub fn search(&self, data: &Value) -> Result<Value, RuntimeError> {
        Interpreter::new(data).visit(&self.ast, data)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
