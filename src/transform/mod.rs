//! Payload transformation.
//!
//! # Responsibilities
//! - Build the evaluation context `{"body": ..., "query_params": ...}`
//! - Apply the configured (or per-request) expression to it
//! - Turn compile and evaluation failures into typed errors while the caller
//!   keeps the untransformed body for echoing
//!
//! # Design Decisions
//! - The configured expression is compiled once at startup into a
//!   [`Transform`]; an invalid one is kept as [`Transform::Invalid`] so every
//!   request reports the same parse error instead of the process refusing to
//!   start
//! - The body is borrowed, never consumed: on error the caller still owns the
//!   original to put in `original_data`
//! - No I/O; everything here is unit-testable with literal inputs

pub mod labels;

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::expression::{Expression, ParseError, RuntimeError};

pub use labels::{extract_label_names, extract_label_values, LabelSet, LabelValues};

/// Query string parameters; the last value wins for repeated keys.
pub type QueryParams = BTreeMap<String, String>;

/// Why a transform did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("JMESPath parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("JMESPath execution error: {0}")]
    Execution(#[from] RuntimeError),
}

/// Build the document expressions are evaluated against.
pub fn context(body: &Value, query_params: &QueryParams) -> Value {
    let params = query_params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect::<Map<_, _>>();

    let mut context = Map::with_capacity(2);
    context.insert("body".to_string(), body.clone());
    context.insert("query_params".to_string(), Value::Object(params));
    Value::Object(context)
}

/// A configured expression, compiled ahead of time.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// No expression configured: payloads pass through untouched.
    Passthrough,
    Compiled(Expression),
    /// The configured expression does not parse.
    Invalid { source: String, error: ParseError },
}

impl Transform {
    pub fn compile(source: &str) -> Self {
        if source.is_empty() {
            return Transform::Passthrough;
        }
        match Expression::compile(source) {
            Ok(expression) => Transform::Compiled(expression),
            Err(error) => Transform::Invalid {
                source: source.to_string(),
                error,
            },
        }
    }

    /// Expression text, empty for passthrough.
    pub fn source(&self) -> &str {
        match self {
            Transform::Passthrough => "",
            Transform::Compiled(expression) => expression.source(),
            Transform::Invalid { source, .. } => source,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Transform::Passthrough)
    }

    /// Transform `body`, or explain why not.
    pub fn apply(&self, body: &Value, query_params: &QueryParams) -> Result<Value, TransformError> {
        match self {
            Transform::Passthrough => {
                tracing::info!(returning = "original_data", "No JMESPath expression provided");
                Ok(body.clone())
            }
            Transform::Invalid { source, error } => {
                tracing::error!(error = %error, expression = %source, "JMESPath parse error");
                Err(TransformError::Parse(error.clone()))
            }
            Transform::Compiled(expression) => {
                tracing::info!(expression = %expression, "Applying JMESPath expression");
                expression
                    .search(&context(body, query_params))
                    .map_err(|error| {
                        tracing::error!(
                            error = %error,
                            expression = %expression,
                            "JMESPath execution error"
                        );
                        TransformError::Execution(error)
                    })
            }
        }
    }
}

/// Compile and apply `expression` in one step.
///
/// An empty expression returns `body` unchanged without compiling anything.
pub fn apply(
    expression: &str,
    body: &Value,
    query_params: &QueryParams,
) -> Result<Value, TransformError> {
    Transform::compile(expression).apply(body, query_params)
}
