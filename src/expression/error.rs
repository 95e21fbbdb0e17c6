//! Expression error types.

use thiserror::Error;

/// Error raised while tokenizing or parsing an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The expression text was empty.
    #[error("Invalid JMESPath expression: cannot be empty.")]
    Empty,

    /// The tokenizer hit a character sequence it does not understand.
    #[error("Bad jmespath expression: {message}:\n{expression}\n{}", underline(.position))]
    Lexer {
        /// What went wrong.
        message: String,
        /// Character offset of the offending input.
        position: usize,
        /// Full expression text.
        expression: String,
    },

    /// The token stream does not form a valid expression.
    #[error(
        "{message}: Parse error at column {position}, token \"{token}\" ({token_type}), for expression:\n\"{expression}\"\n{}",
        quoted_underline(.position)
    )]
    Syntax {
        /// What went wrong.
        message: String,
        /// Character offset of the offending token.
        position: usize,
        /// Text of the offending token.
        token: String,
        /// Grammar name of the offending token.
        token_type: &'static str,
        /// Full expression text.
        expression: String,
    },

    /// The expression nests deeper than the evaluator accepts.
    #[error("Invalid JMESPath expression: nesting exceeds the maximum depth of {limit}")]
    TooDeep { limit: usize },

    /// A builtin function is called with the wrong number of arguments.
    #[error(transparent)]
    Arity(RuntimeError),
}

impl ParseError {
    /// Character offset the error points at, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty | ParseError::TooDeep { .. } | ParseError::Arity(_) => None,
            ParseError::Lexer { position, .. } | ParseError::Syntax { position, .. } => {
                Some(*position)
            }
        }
    }
}

fn underline(position: &usize) -> String {
    format!("{}^", " ".repeat(*position))
}

// The expression is echoed inside quotes, so the caret shifts by one.
fn quoted_underline(position: &usize) -> String {
    underline(&(*position + 1))
}

/// Error raised while evaluating a compiled expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Unknown function: {0}()")]
    UnknownFunction(String),

    #[error(
        "Expected {expected} {} for function {function}(), received {actual}",
        argument_noun(.expected)
    )]
    Arity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Expected at least {expected} {} for function {function}(), received {actual}",
        argument_noun(.expected)
    )]
    VariadicArity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "In function {function}(), invalid type for value: {value}, expected one of: {}, received: \"{actual}\"",
        type_list(.expected)
    )]
    InvalidType {
        function: &'static str,
        value: String,
        expected: Vec<&'static str>,
        actual: &'static str,
    },

    #[error("Invalid slice: step cannot be 0")]
    ZeroSliceStep,

    #[error("Expression references are only valid as function arguments")]
    BareExpref,
}

fn argument_noun(count: &usize) -> &'static str {
    if *count == 1 {
        "argument"
    } else {
        "arguments"
    }
}

fn type_list(types: &[&'static str]) -> String {
    let quoted: Vec<String> = types.iter().map(|t| format!("'{t}'")).collect();
    format!("[{}]", quoted.join(", "))
}
