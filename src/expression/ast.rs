//! Parsed expression tree.

use serde_json::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

/// A node in a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Implicit "the current value", produced by the parser for elided operands.
    Identity,
    /// Explicit `@`.
    Current,
    /// `$`, the document the whole expression is evaluated against.
    Root,
    /// `foo` or `"foo"`.
    Field(String),
    /// `` `{"a": 1}` `` or `'raw'`.
    Literal(Value),
    /// `[2]`, `[-1]`.
    Index(i64),
    /// `[start:stop:step]`.
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// `lhs.rhs`.
    Subexpression { lhs: Box<Node>, rhs: Box<Node> },
    /// `lhs[index]`.
    IndexExpression { lhs: Box<Node>, rhs: Box<Node> },
    /// `lhs <op> rhs`.
    Comparator {
        op: Comparator,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    /// `lhs || rhs`.
    Or { lhs: Box<Node>, rhs: Box<Node> },
    /// `lhs && rhs`.
    And { lhs: Box<Node>, rhs: Box<Node> },
    /// `!expr`.
    Not(Box<Node>),
    /// `lhs | rhs`.
    Pipe { lhs: Box<Node>, rhs: Box<Node> },
    /// `expr[]` without the projection wrapper.
    Flatten(Box<Node>),
    /// `lhs[*].rhs` / `lhs[].rhs`.
    Projection { lhs: Box<Node>, rhs: Box<Node> },
    /// `lhs.*.rhs`.
    ValueProjection { lhs: Box<Node>, rhs: Box<Node> },
    /// `lhs[?condition].rhs`.
    FilterProjection {
        lhs: Box<Node>,
        rhs: Box<Node>,
        condition: Box<Node>,
    },
    /// `[a, b]`.
    MultiSelectList(Vec<Node>),
    /// `{a: x, b: y}`.
    MultiSelectHash(Vec<KeyValuePair>),
    /// `name(args...)`.
    Function { name: String, args: Vec<Node> },
    /// `&expr`.
    Expref(Box<Node>),
}

/// One `key: value` entry of a multi-select hash.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Node,
}

impl KeyValuePair {
    pub fn node_type(&self) -> &'static str {
        "key_val_pair"
    }
}

impl Node {
    /// Grammar tag of this node.
    pub fn node_type(&self) -> &'static str {
        match self {
            Node::Identity => "identity",
            Node::Current => "current",
            Node::Root => "root",
            Node::Field(_) => "field",
            Node::Literal(_) => "literal",
            Node::Index(_) => "index",
            Node::Slice { .. } => "slice",
            Node::Subexpression { .. } => "subexpression",
            Node::IndexExpression { .. } => "index_expression",
            Node::Comparator { .. } => "comparator",
            Node::Or { .. } => "or_expression",
            Node::And { .. } => "and_expression",
            Node::Not(_) => "not_expression",
            Node::Pipe { .. } => "pipe",
            Node::Flatten(_) => "flatten",
            Node::Projection { .. } => "projection",
            Node::ValueProjection { .. } => "value_projection",
            Node::FilterProjection { .. } => "filter_projection",
            Node::MultiSelectList(_) => "multi_select_list",
            Node::MultiSelectHash(_) => "multi_select_dict",
            Node::Function { .. } => "function_expression",
            Node::Expref(_) => "expref",
        }
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Identity
            | Node::Current
            | Node::Root
            | Node::Field(_)
            | Node::Literal(_)
            | Node::Index(_)
            | Node::Slice { .. } => Vec::new(),
            Node::Subexpression { lhs, rhs }
            | Node::IndexExpression { lhs, rhs }
            | Node::Comparator { lhs, rhs, .. }
            | Node::Or { lhs, rhs }
            | Node::And { lhs, rhs }
            | Node::Pipe { lhs, rhs }
            | Node::Projection { lhs, rhs }
            | Node::ValueProjection { lhs, rhs } => vec![&**lhs, &**rhs],
            Node::FilterProjection {
                lhs,
                rhs,
                condition,
            } => vec![&**lhs, &**condition, &**rhs],
            Node::Not(inner) | Node::Flatten(inner) | Node::Expref(inner) => vec![&**inner],
            Node::MultiSelectList(items) | Node::Function { args: items, .. } => {
                items.iter().collect()
            }
            Node::MultiSelectHash(pairs) => pairs.iter().map(|pair| &pair.value).collect(),
        }
    }

    /// Height of the tree rooted here; a leaf has depth 1.
    ///
    /// Walks with an explicit stack, so it is safe on trees of any shape.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((node, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            pending.extend(node.children().into_iter().map(|child| (child, depth + 1)));
        }
        deepest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_counts_longest_path() {
        let leaf = Node::Field("a".into());
        assert_eq!(leaf.depth(), 1);

        let node = Node::Pipe {
            lhs: Box::new(Node::Not(Box::new(Node::Not(Box::new(leaf.clone()))))),
            rhs: Box::new(Node::MultiSelectList(vec![leaf.clone(), leaf])),
        };
        assert_eq!(node.depth(), 4);
        assert_eq!(node.children().len(), 2);
    }
}
