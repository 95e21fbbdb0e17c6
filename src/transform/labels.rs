//! Metric label extraction.
//!
//! Label names come from the keys of a top-level multi-select hash
//! (`{team: body.team, source: query_params.source}`) and are fixed at
//! startup. Values are produced per request by evaluating the same
//! expression. Extraction is best effort: any failure yields no labels and
//! never affects the response.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::expression::interpreter::type_name;
use crate::expression::{Expression, Node, RuntimeError};
use crate::transform::{context, QueryParams};

/// Label name to rendered value.
pub type LabelValues = HashMap<String, String>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label expression failed: {0}")]
    Execution(#[from] RuntimeError),

    #[error("label expression produced {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Label names declared by `expression`, in source order.
pub fn extract_label_names(expression: &str) -> Vec<String> {
    if expression.is_empty() {
        return Vec::new();
    }
    match Expression::compile(expression) {
        Ok(compiled) => names_of(&compiled),
        Err(error) => {
            tracing::error!(
                error = %error,
                expression = %expression,
                "Failed to compile metrics annotation expression"
            );
            Vec::new()
        }
    }
}

fn names_of(expression: &Expression) -> Vec<String> {
    match expression.ast() {
        Node::MultiSelectHash(pairs) => pairs.iter().map(|pair| pair.key.clone()).collect(),
        other => {
            tracing::warn!(
                expression = %expression,
                node_type = other.node_type(),
                "Metrics annotation expression must be a multi-select hash; no labels will be used"
            );
            Vec::new()
        }
    }
}

/// Evaluate the label expression, surfacing why it produced nothing.
pub fn try_extract_label_values(
    expression: &Expression,
    label_names: &[String],
    body: &Value,
    query_params: &QueryParams,
) -> Result<LabelValues, LabelError> {
    let map = match expression.search(&context(body, query_params))? {
        Value::Object(map) => map,
        other => return Err(LabelError::NotAnObject(type_name(&other))),
    };

    Ok(map
        .into_iter()
        .filter(|(name, _)| label_names.is_empty() || label_names.contains(name))
        .filter_map(|(name, value)| render(value).map(|rendered| (name, rendered)))
        .collect())
}

/// Evaluate `expression` for label values, downgrading every failure to an
/// empty map.
pub fn extract_label_values(
    expression: &str,
    label_names: &[String],
    body: &Value,
    query_params: &QueryParams,
) -> LabelValues {
    if expression.is_empty() {
        return LabelValues::new();
    }
    match Expression::compile(expression) {
        Ok(compiled) => values_or_empty(&compiled, label_names, body, query_params),
        Err(error) => {
            tracing::error!(error = %error, expression = %expression, "Failed to compile metrics annotation expression");
            LabelValues::new()
        }
    }
}

fn values_or_empty(
    expression: &Expression,
    label_names: &[String],
    body: &Value,
    query_params: &QueryParams,
) -> LabelValues {
    try_extract_label_values(expression, label_names, body, query_params).unwrap_or_else(|error| {
        tracing::warn!(error = %error, expression = %expression, "Failed to extract metric labels");
        LabelValues::new()
    })
}

fn render(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// The label expression compiled once, with its declared names.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    expression: Option<Expression>,
    names: Vec<String>,
}

impl LabelSet {
    pub fn from_expression(source: &str) -> Self {
        let names = extract_label_names(source);
        if names.is_empty() {
            return Self::default();
        }
        // Names only come back for a source that compiled.
        let expression = Expression::compile(source).ok();
        tracing::info!(expression = %source, labels = ?names, "Forwarded counter labels configured");
        Self { expression, names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Label values for one request.
    pub fn extract(&self, body: &Value, query_params: &QueryParams) -> LabelValues {
        match &self.expression {
            Some(expression) => values_or_empty(expression, &self.names, body, query_params),
            None => LabelValues::new(),
        }
    }

    /// Pair every declared name with its value, in declaration order.
    /// Missing values become `""`.
    pub fn resolve(&self, values: &LabelValues) -> Vec<(String, String)> {
        self.names
            .iter()
            .map(|name| (name.clone(), values.get(name).cloned().unwrap_or_default()))
            .collect()
    }
}
