//! Tree-walking evaluation of compiled expressions.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::ast::{Comparator, Node};
use super::error::RuntimeError;
use super::functions;

/// Evaluates nodes against borrowed JSON, producing fresh values.
pub struct Interpreter<'a> {
    root: &'a Value,
}

impl<'a> Interpreter<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    pub fn visit(&self, node: &Node, value: &Value) -> Result<Value, RuntimeError> {
        match node {
            Node::Identity | Node::Current => Ok(value.clone()),
            Node::Root => Ok(self.root.clone()),
            Node::Field(name) => Ok(match value {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            Node::Literal(literal) => Ok(literal.clone()),
            Node::Index(index) => Ok(match value {
                Value::Array(items) => resolve_index(items.len(), *index)
                    .map(|i| items[i].clone())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            }),
            Node::Slice { start, stop, step } => match value {
                Value::Array(items) => slice(items, *start, *stop, *step).map(Value::Array),
                _ => Ok(Value::Null),
            },
            Node::Subexpression { lhs, rhs }
            | Node::IndexExpression { lhs, rhs }
            | Node::Pipe { lhs, rhs } => {
                let base = self.visit(lhs, value)?;
                self.visit(rhs, &base)
            }
            Node::Comparator { op, lhs, rhs } => {
                let left = self.visit(lhs, value)?;
                let right = self.visit(rhs, value)?;
                Ok(compare(*op, &left, &right))
            }
            Node::Or { lhs, rhs } => {
                let matched = self.visit(lhs, value)?;
                if is_false(&matched) {
                    self.visit(rhs, value)
                } else {
                    Ok(matched)
                }
            }
            Node::And { lhs, rhs } => {
                let matched = self.visit(lhs, value)?;
                if is_false(&matched) {
                    Ok(matched)
                } else {
                    self.visit(rhs, value)
                }
            }
            Node::Not(inner) => Ok(Value::Bool(is_false(&self.visit(inner, value)?))),
            Node::Flatten(inner) => Ok(match self.visit(inner, value)? {
                Value::Array(items) => {
                    let mut merged = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Array(nested) => merged.extend(nested),
                            other => merged.push(other),
                        }
                    }
                    Value::Array(merged)
                }
                _ => Value::Null,
            }),
            Node::Projection { lhs, rhs } => match self.visit(lhs, value)? {
                Value::Array(items) => self.project(items, rhs),
                _ => Ok(Value::Null),
            },
            Node::ValueProjection { lhs, rhs } => match self.visit(lhs, value)? {
                Value::Object(map) => self.project(map.into_iter().map(|(_, v)| v), rhs),
                _ => Ok(Value::Null),
            },
            Node::FilterProjection {
                lhs,
                rhs,
                condition,
            } => match self.visit(lhs, value)? {
                Value::Array(items) => {
                    let mut collected = Vec::new();
                    for item in &items {
                        if is_false(&self.visit(condition, item)?) {
                            continue;
                        }
                        let projected = self.visit(rhs, item)?;
                        if !projected.is_null() {
                            collected.push(projected);
                        }
                    }
                    Ok(Value::Array(collected))
                }
                _ => Ok(Value::Null),
            },
            Node::MultiSelectList(items) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                items
                    .iter()
                    .map(|item| self.visit(item, value))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Node::MultiSelectHash(pairs) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut collected = Map::new();
                for pair in pairs {
                    collected.insert(pair.key.clone(), self.visit(&pair.value, value)?);
                }
                Ok(Value::Object(collected))
            }
            Node::Function { name, args } => functions::call(self, name, args, value),
            Node::Expref(_) => Err(RuntimeError::BareExpref),
        }
    }

    /// Apply `rhs` to every element, dropping null results.
    fn project<I>(&self, items: I, rhs: &Node) -> Result<Value, RuntimeError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut collected = Vec::new();
        for item in items {
            let projected = self.visit(rhs, &item)?;
            if !projected.is_null() {
                collected.push(projected);
            }
        }
        Ok(Value::Array(collected))
    }
}

/// `""`, `[]`, `{}`, `null` and `false` are false; everything else is true.
pub fn is_false(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Deep equality where numbers compare by value regardless of representation.
pub fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => left == right,
    }
}

/// Order two values if they are both numbers or both strings.
pub fn json_ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Grammar name of a value's type.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compare(op: Comparator, left: &Value, right: &Value) -> Value {
    match op {
        Comparator::Equal => Value::Bool(json_equal(left, right)),
        Comparator::NotEqual => Value::Bool(!json_equal(left, right)),
        _ => match json_ordering(left, right) {
            Some(ordering) => Value::Bool(match op {
                Comparator::LessThan => ordering == Ordering::Less,
                Comparator::LessThanOrEqual => ordering != Ordering::Greater,
                Comparator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }),
            None => Value::Null,
        },
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

fn slice(
    items: &[Value],
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<Value>, RuntimeError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::ZeroSliceStep);
    }
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);

    let clamp = |bound: i64| -> i64 {
        let bound = if bound < 0 { bound + len } else { bound };
        if step > 0 {
            bound.clamp(0, len)
        } else {
            bound.clamp(-1, len - 1)
        }
    };

    let (default_start, default_stop) = if step > 0 { (0, len) } else { (len - 1, -1) };
    let start = start.map(clamp).unwrap_or(default_start);
    let stop = stop.map(clamp).unwrap_or(default_stop);

    let mut collected = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        if let Ok(index) = usize::try_from(i) {
            if let Some(item) = items.get(index) {
                collected.push(item.clone());
            }
        }
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse;
    use serde_json::json;

    fn search(expression: &str, data: Value) -> Value {
        let node = parse(expression).unwrap();
        Interpreter::new(&data).visit(&node, &data).unwrap()
    }

    #[test]
    fn test_field_access() {
        let data = json!({"a": {"b": {"c": 1}}, "list": [1]});
        assert_eq!(search("a.b.c", data.clone()), json!(1));
        assert_eq!(search("a.missing.c", data.clone()), Value::Null);
        assert_eq!(search("list.a", data), Value::Null);
    }

    #[test]
    fn test_index_and_slice() {
        let data = json!({"a": [0, 1, 2, 3, 4, 5]});
        assert_eq!(search("a[0]", data.clone()), json!(0));
        assert_eq!(search("a[-1]", data.clone()), json!(5));
        assert_eq!(search("a[10]", data.clone()), Value::Null);
        assert_eq!(search("a[1:3]", data.clone()), json!([1, 2]));
        assert_eq!(search("a[::2]", data.clone()), json!([0, 2, 4]));
        assert_eq!(search("a[::-1]", data.clone()), json!([5, 4, 3, 2, 1, 0]));
        assert_eq!(search("a[-2:]", data.clone()), json!([4, 5]));
        assert_eq!(search("a[4:1:-2]", data.clone()), json!([4, 2]));
        assert_eq!(search("a[100:]", data), json!([]));
    }

    #[test]
    fn test_slice_with_huge_step_stops_after_first_element() {
        let data = json!({"a": [0, 1, 2, 3]});
        assert_eq!(search("a[1::9223372036854775807]", data.clone()), json!([1]));
        assert_eq!(search("a[::9223372036854775807]", data.clone()), json!([0]));
        assert_eq!(search("a[::-9223372036854775807]", data), json!([3]));
    }

    #[test]
    fn test_zero_step_is_an_error() {
        let data = json!([1, 2]);
        let node = parse("[::0]").unwrap();
        assert_eq!(
            Interpreter::new(&data).visit(&node, &data),
            Err(RuntimeError::ZeroSliceStep)
        );
    }

    #[test]
    fn test_projections_drop_nulls() {
        let data = json!({"people": [{"name": "a"}, {"age": 1}, {"name": "b"}]});
        assert_eq!(search("people[*].name", data), json!(["a", "b"]));

        let data = json!({"ops": {"x": {"n": 1}, "y": {"n": 2}, "z": {}}});
        assert_eq!(search("ops.*.n", data), json!([1, 2]));
    }

    #[test]
    fn test_flatten() {
        let data = json!({"a": [[1, 2], 3, [4, [5]]]});
        assert_eq!(search("a[]", data.clone()), json!([1, 2, 3, 4, [5]]));
        assert_eq!(search("a[][]", data), json!([1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_filters_and_comparators() {
        let data = json!({"items": [
            {"name": "a", "price": 5, "tag": "x"},
            {"name": "b", "price": 15, "tag": "y"},
            {"name": "c", "price": 25.0, "tag": "x"},
        ]});
        assert_eq!(
            search("items[?price > `10`].name", data.clone()),
            json!(["b", "c"])
        );
        assert_eq!(
            search("items[?tag == 'x' && price >= `25`].name", data.clone()),
            json!(["c"])
        );
        assert_eq!(search("items[?price == `25`].name", data.clone()), json!(["c"]));
        assert_eq!(search("items[?!tag].name", data), json!([]));
    }

    #[test]
    fn test_ordering_of_mismatched_types_is_null() {
        assert_eq!(search("a < b", json!({"a": 1, "b": "x"})), Value::Null);
        assert_eq!(search("a < b", json!({"a": "a", "b": "b"})), json!(true));
    }

    #[test]
    fn test_or_and_not() {
        let data = json!({"empty": [], "zero": 0, "name": "n"});
        assert_eq!(search("empty || name", data.clone()), json!("n"));
        assert_eq!(search("zero || name", data.clone()), json!(0));
        assert_eq!(search("empty && name", data.clone()), json!([]));
        assert_eq!(search("!empty", data.clone()), json!(true));
        assert_eq!(search("!zero", data), json!(false));
    }

    #[test]
    fn test_multi_select() {
        let data = json!({"a": 1, "b": {"c": 2}});
        assert_eq!(search("[a, b.c]", data.clone()), json!([1, 2]));
        assert_eq!(search("{x: a, y: b.c}", data.clone()), json!({"x": 1, "y": 2}));
        assert_eq!(search("missing.{x: a}", data), Value::Null);
    }

    #[test]
    fn test_pipe_stops_projection() {
        let data = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(search("a[*].b | [0]", data.clone()), json!(1));
        assert_eq!(search("a[*].b[0]", data), json!([]));
    }

    #[test]
    fn test_root_reference_inside_projection() {
        let data = json!({"items": [{"id": 1}, {"id": 2}], "tag": "t"});
        assert_eq!(
            search("items[*].{id: id, tag: $.tag}", data),
            json!([{"id": 1, "tag": "t"}, {"id": 2, "tag": "t"}])
        );
    }

    #[test]
    fn test_evaluation_leaves_input_untouched() {
        let data = json!({"a": [3, 1, 2]});
        let before = data.clone();
        let _ = search("sort(a)", data.clone());
        assert_eq!(data, before);
    }

    #[test]
    fn test_json_equal_is_numeric() {
        assert!(json_equal(&json!(1), &json!(1.0)));
        assert!(json_equal(&json!({"a": [1]}), &json!({"a": [1.0]})));
        assert!(!json_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!json_equal(&json!(true), &json!(1)));
    }
}
