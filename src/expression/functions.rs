//! Built-in function table.
//!
//! Every call goes through three checks before the body runs: arity,
//! argument resolution (expression references stay unevaluated) and
//! per-argument type validation.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::ast::Node;
use super::error::RuntimeError;
use super::interpreter::{json_equal, json_ordering, type_name, Interpreter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgType {
    Any,
    Number,
    String,
    Array,
    Object,
    ArrayNumber,
    ArrayString,
    Expref,
}

impl ArgType {
    fn name(self) -> &'static str {
        match self {
            ArgType::Any => "any",
            ArgType::Number => "number",
            ArgType::String => "string",
            ArgType::Array => "array",
            ArgType::Object => "object",
            ArgType::ArrayNumber => "array-number",
            ArgType::ArrayString => "array-string",
            ArgType::Expref => "expref",
        }
    }

    fn accepts(self, arg: &Arg<'_>) -> bool {
        match (self, arg) {
            (ArgType::Expref, Arg::Expref(_)) => true,
            (_, Arg::Expref(_)) | (ArgType::Expref, _) => false,
            (ArgType::Any, _) => true,
            (ArgType::Number, Arg::Value(v)) => v.is_number(),
            (ArgType::String, Arg::Value(v)) => v.is_string(),
            (ArgType::Array, Arg::Value(v)) => v.is_array(),
            (ArgType::Object, Arg::Value(v)) => v.is_object(),
            (ArgType::ArrayNumber, Arg::Value(Value::Array(items))) => {
                items.iter().all(Value::is_number)
            }
            (ArgType::ArrayString, Arg::Value(Value::Array(items))) => {
                items.iter().all(Value::is_string)
            }
            _ => false,
        }
    }
}

static NULL: Value = Value::Null;
static IDENTITY: Node = Node::Identity;

/// A resolved argument: either an evaluated value or an unevaluated reference.
enum Arg<'n> {
    Value(Value),
    Expref(&'n Node),
}

impl Arg<'_> {
    fn value(&self) -> &Value {
        match self {
            Arg::Value(v) => v,
            Arg::Expref(_) => &NULL,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Arg::Value(v) => v,
            Arg::Expref(_) => Value::Null,
        }
    }

    fn node(&self) -> &Node {
        match self {
            Arg::Expref(node) => node,
            Arg::Value(_) => &IDENTITY,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Arg::Value(v) => type_name(v),
            Arg::Expref(_) => "expref",
        }
    }

    fn describe(&self) -> String {
        match self {
            Arg::Value(v) => v.to_string(),
            Arg::Expref(_) => "<expref>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Abs,
    Avg,
    Ceil,
    Contains,
    EndsWith,
    Floor,
    Join,
    Keys,
    Length,
    Map,
    Max,
    MaxBy,
    Merge,
    Min,
    MinBy,
    NotNull,
    Reverse,
    Sort,
    SortBy,
    StartsWith,
    Sum,
    ToArray,
    ToNumber,
    ToString,
    Type,
    Values,
}

struct Signature {
    params: &'static [&'static [ArgType]],
    variadic: bool,
}

const NUMBER: &[ArgType] = &[ArgType::Number];
const STRING: &[ArgType] = &[ArgType::String];
const ANY: &[ArgType] = &[ArgType::Any];
const ARRAY: &[ArgType] = &[ArgType::Array];
const OBJECT: &[ArgType] = &[ArgType::Object];
const EXPREF: &[ArgType] = &[ArgType::Expref];
const ARRAY_NUMBER: &[ArgType] = &[ArgType::ArrayNumber];
const ARRAY_STRING: &[ArgType] = &[ArgType::ArrayString];
const SORTABLE: &[ArgType] = &[ArgType::ArrayNumber, ArgType::ArrayString];
const SEARCHABLE: &[ArgType] = &[ArgType::Array, ArgType::String];
const SIZED: &[ArgType] = &[ArgType::String, ArgType::Array, ArgType::Object];
const STRING_OR_ARRAY: &[ArgType] = &[ArgType::Array, ArgType::String];

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Function::Abs,
            "avg" => Function::Avg,
            "ceil" => Function::Ceil,
            "contains" => Function::Contains,
            "ends_with" => Function::EndsWith,
            "floor" => Function::Floor,
            "join" => Function::Join,
            "keys" => Function::Keys,
            "length" => Function::Length,
            "map" => Function::Map,
            "max" => Function::Max,
            "max_by" => Function::MaxBy,
            "merge" => Function::Merge,
            "min" => Function::Min,
            "min_by" => Function::MinBy,
            "not_null" => Function::NotNull,
            "reverse" => Function::Reverse,
            "sort" => Function::Sort,
            "sort_by" => Function::SortBy,
            "starts_with" => Function::StartsWith,
            "sum" => Function::Sum,
            "to_array" => Function::ToArray,
            "to_number" => Function::ToNumber,
            "to_string" => Function::ToString,
            "type" => Function::Type,
            "values" => Function::Values,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Avg => "avg",
            Function::Ceil => "ceil",
            Function::Contains => "contains",
            Function::EndsWith => "ends_with",
            Function::Floor => "floor",
            Function::Join => "join",
            Function::Keys => "keys",
            Function::Length => "length",
            Function::Map => "map",
            Function::Max => "max",
            Function::MaxBy => "max_by",
            Function::Merge => "merge",
            Function::Min => "min",
            Function::MinBy => "min_by",
            Function::NotNull => "not_null",
            Function::Reverse => "reverse",
            Function::Sort => "sort",
            Function::SortBy => "sort_by",
            Function::StartsWith => "starts_with",
            Function::Sum => "sum",
            Function::ToArray => "to_array",
            Function::ToNumber => "to_number",
            Function::ToString => "to_string",
            Function::Type => "type",
            Function::Values => "values",
        }
    }

    fn signature(self) -> Signature {
        let (params, variadic): (&'static [&'static [ArgType]], bool) = match self {
            Function::Abs | Function::Ceil | Function::Floor => (&[NUMBER], false),
            Function::Avg | Function::Sum => (&[ARRAY_NUMBER], false),
            Function::Contains => (&[SEARCHABLE, ANY], false),
            Function::EndsWith | Function::StartsWith => (&[STRING, STRING], false),
            Function::Join => (&[STRING, ARRAY_STRING], false),
            Function::Keys | Function::Values => (&[OBJECT], false),
            Function::Length => (&[SIZED], false),
            Function::Map => (&[EXPREF, ARRAY], false),
            Function::Max | Function::Min | Function::Sort => (&[SORTABLE], false),
            Function::MaxBy | Function::MinBy | Function::SortBy => (&[ARRAY, EXPREF], false),
            Function::Merge => (&[OBJECT], true),
            Function::NotNull => (&[ANY], true),
            Function::Reverse => (&[STRING_OR_ARRAY], false),
            Function::ToArray | Function::ToNumber | Function::ToString | Function::Type => {
                (&[ANY], false)
            }
        };
        Signature { params, variadic }
    }
}

/// Evaluate a function call node.
pub(crate) fn call(
    interpreter: &Interpreter<'_>,
    name: &str,
    args: &[Node],
    current: &Value,
) -> Result<Value, RuntimeError> {
    let function =
        Function::lookup(name).ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
    let signature = function.signature();
    check_arity(function, &signature, args.len())?;

    let mut resolved = Vec::with_capacity(args.len());
    for arg in args {
        resolved.push(match arg {
            Node::Expref(inner) => Arg::Expref(inner),
            other => Arg::Value(interpreter.visit(other, current)?),
        });
    }

    for (index, arg) in resolved.iter().enumerate() {
        // Variadic functions reuse the last parameter type for the tail.
        let allowed = signature
            .params
            .get(index)
            .or_else(|| signature.params.last())
            .copied()
            .unwrap_or(ANY);
        if !allowed.iter().any(|t| t.accepts(arg)) {
            return Err(RuntimeError::InvalidType {
                function: function.name(),
                value: arg.describe(),
                expected: allowed.iter().map(|t| t.name()).collect(),
                actual: arg.type_name(),
            });
        }
    }

    evaluate(interpreter, function, resolved)
}

/// Arity check for a call site; unknown names are left to evaluation.
pub(crate) fn check_call_arity(name: &str, actual: usize) -> Result<(), RuntimeError> {
    match Function::lookup(name) {
        Some(function) => check_arity(function, &function.signature(), actual),
        None => Ok(()),
    }
}

fn check_arity(function: Function, signature: &Signature, actual: usize) -> Result<(), RuntimeError> {
    let expected = signature.params.len();
    if signature.variadic {
        if actual < expected {
            return Err(RuntimeError::VariadicArity {
                function: function.name(),
                expected,
                actual,
            });
        }
    } else if actual != expected {
        return Err(RuntimeError::Arity {
            function: function.name(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn evaluate(
    interpreter: &Interpreter<'_>,
    function: Function,
    mut args: Vec<Arg<'_>>,
) -> Result<Value, RuntimeError> {
    let first = args.first().map(Arg::value).cloned().unwrap_or(Value::Null);

    Ok(match function {
        Function::Abs => match first.as_i64().and_then(i64::checked_abs) {
            Some(n) => Value::from(n),
            None if first.is_u64() => first,
            None => float(first.as_f64().unwrap_or_default().abs()),
        },
        Function::Avg => {
            let items = as_array(&first);
            if items.is_empty() {
                Value::Null
            } else {
                let total: f64 = items.iter().filter_map(Value::as_f64).sum();
                float(total / items.len() as f64)
            }
        }
        Function::Ceil => round(&first, f64::ceil),
        Function::Floor => round(&first, f64::floor),
        Function::Contains => {
            let needle = args[1].value();
            match &first {
                Value::Array(items) => Value::Bool(items.iter().any(|i| json_equal(i, needle))),
                Value::String(haystack) => {
                    Value::Bool(needle.as_str().is_some_and(|n| haystack.contains(n)))
                }
                _ => Value::Bool(false),
            }
        }
        Function::EndsWith => Value::Bool(as_str(&first).ends_with(as_str(args[1].value()))),
        Function::StartsWith => {
            Value::Bool(as_str(&first).starts_with(as_str(args[1].value())))
        }
        Function::Join => {
            let parts: Vec<&str> = as_array(args[1].value()).iter().map(as_str).collect();
            Value::String(parts.join(as_str(&first)))
        }
        Function::Keys => Value::Array(
            as_object(&first)
                .keys()
                .map(|k| Value::String(k.clone()))
                .collect(),
        ),
        Function::Values => Value::Array(as_object(&first).values().cloned().collect()),
        Function::Length => Value::from(match &first {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => 0,
        }),
        Function::Map => {
            let node = args[0].node();
            let items = as_array(args[1].value());
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                mapped.push(interpreter.visit(node, item)?);
            }
            Value::Array(mapped)
        }
        Function::Max => extreme(as_array(&first), Ordering::Greater),
        Function::Min => extreme(as_array(&first), Ordering::Less),
        Function::MaxBy => extreme_by(interpreter, function, &args, Ordering::Greater)?,
        Function::MinBy => extreme_by(interpreter, function, &args, Ordering::Less)?,
        Function::Merge => {
            let mut merged = Map::new();
            for arg in args.drain(..) {
                if let Value::Object(map) = arg.into_value() {
                    merged.extend(map);
                }
            }
            Value::Object(merged)
        }
        Function::NotNull => args
            .drain(..)
            .map(Arg::into_value)
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null),
        Function::Reverse => match first {
            Value::String(s) => Value::String(s.chars().rev().collect()),
            Value::Array(mut items) => {
                items.reverse();
                Value::Array(items)
            }
            other => other,
        },
        Function::Sort => {
            let mut items = as_array(&first).to_vec();
            items.sort_by(|a, b| json_ordering(a, b).unwrap_or(Ordering::Equal));
            Value::Array(items)
        }
        Function::SortBy => {
            let mut keyed = keyed_items(interpreter, function, &args)?;
            keyed.sort_by(|(a, _), (b, _)| json_ordering(a, b).unwrap_or(Ordering::Equal));
            Value::Array(keyed.into_iter().map(|(_, item)| item).collect())
        }
        Function::Sum => sum(as_array(&first)),
        Function::ToArray => match first {
            Value::Array(items) => Value::Array(items),
            other => Value::Array(vec![other]),
        },
        Function::ToNumber => match first {
            Value::Number(n) => Value::Number(n),
            Value::String(s) => parse_number(&s),
            _ => Value::Null,
        },
        Function::ToString => match first {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        },
        Function::Type => Value::String(type_name(&first).to_string()),
    })
}

fn as_array(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn as_str(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn round(value: &Value, op: fn(f64) -> f64) -> Value {
    if let Some(n) = value.as_i64() {
        return Value::from(n);
    }
    let rounded = op(value.as_f64().unwrap_or_default());
    if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
        Value::from(rounded as i64)
    } else {
        float(rounded)
    }
}

fn sum(items: &[Value]) -> Value {
    let mut total: i64 = 0;
    let mut exact = true;
    for item in items {
        match item.as_i64().and_then(|n| total.checked_add(n)) {
            Some(next) if exact => total = next,
            _ => {
                exact = false;
                break;
            }
        }
    }
    if exact {
        Value::from(total)
    } else {
        float(items.iter().filter_map(Value::as_f64).sum())
    }
}

fn parse_number(text: &str) -> Value {
    if let Ok(n) = text.trim().parse::<i64>() {
        return Value::from(n);
    }
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(float)
        .unwrap_or(Value::Null)
}

fn extreme(items: &[Value], wanted: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for item in items {
        best = match best {
            Some(current) if json_ordering(item, current) != Some(wanted) => Some(current),
            _ => Some(item),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

/// Evaluate the key expression against each element, requiring uniform key types.
fn keyed_items(
    interpreter: &Interpreter<'_>,
    function: Function,
    args: &[Arg<'_>],
) -> Result<Vec<(Value, Value)>, RuntimeError> {
    let items = as_array(args[0].value());
    let node = args[1].node();
    let mut keyed = Vec::with_capacity(items.len());
    let mut key_type: Option<&'static str> = None;
    for item in items {
        let key = interpreter.visit(node, item)?;
        let actual = type_name(&key);
        let allowed = match key_type {
            Some(expected) => actual == expected,
            None => matches!(actual, "number" | "string"),
        };
        if !allowed {
            let expected = match key_type {
                Some(expected) => vec![expected],
                None => vec!["number", "string"],
            };
            return Err(RuntimeError::InvalidType {
                function: function.name(),
                value: key.to_string(),
                expected,
                actual,
            });
        }
        key_type = Some(actual);
        keyed.push((key, item.clone()));
    }
    Ok(keyed)
}

fn extreme_by(
    interpreter: &Interpreter<'_>,
    function: Function,
    args: &[Arg<'_>],
    wanted: Ordering,
) -> Result<Value, RuntimeError> {
    let mut best: Option<(Value, Value)> = None;
    for (key, item) in keyed_items(interpreter, function, args)? {
        best = match best {
            Some((best_key, best_item)) if json_ordering(&key, &best_key) != Some(wanted) => {
                Some((best_key, best_item))
            }
            _ => Some((key, item)),
        };
    }
    Ok(best.map(|(_, item)| item).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::check_call_arity;
    use crate::expression::parser::parse;
    use crate::expression::{Interpreter, RuntimeError};
    use serde_json::{json, Value};

    fn eval(expression: &str, data: Value) -> Result<Value, RuntimeError> {
        let node = parse(expression).unwrap();
        Interpreter::new(&data).visit(&node, &data)
    }

    fn search(expression: &str, data: Value) -> Value {
        eval(expression, data).unwrap()
    }

    #[test]
    fn test_numeric_functions() {
        let data = json!({"n": -3.5, "i": -2, "list": [1, 2, 3, 4]});
        assert_eq!(search("abs(i)", data.clone()), json!(2));
        assert_eq!(search("abs(n)", data.clone()), json!(3.5));
        assert_eq!(search("ceil(n)", data.clone()), json!(-3));
        assert_eq!(search("floor(n)", data.clone()), json!(-4));
        assert_eq!(search("sum(list)", data.clone()), json!(10));
        assert_eq!(search("avg(list)", data.clone()), json!(2.5));
        assert_eq!(search("max(list)", data.clone()), json!(4));
        assert_eq!(search("min(list)", data), json!(1));
        assert_eq!(search("avg(@)", json!([])), Value::Null);
    }

    #[test]
    fn test_abs_at_integer_limits() {
        let data = json!({"min": i64::MIN, "big": u64::MAX});
        assert_eq!(search("abs(min)", data.clone()), json!(9223372036854775808.0));
        assert_eq!(search("abs(big)", data), json!(u64::MAX));
    }

    #[test]
    fn test_string_functions() {
        let data = json!({"s": "hello", "parts": ["a", "b", "c"]});
        assert_eq!(search("length(s)", data.clone()), json!(5));
        assert_eq!(search("starts_with(s, 'he')", data.clone()), json!(true));
        assert_eq!(search("ends_with(s, 'lo')", data.clone()), json!(true));
        assert_eq!(search("contains(s, 'ell')", data.clone()), json!(true));
        assert_eq!(search("join('-', parts)", data.clone()), json!("a-b-c"));
        assert_eq!(search("reverse(s)", data), json!("olleh"));
    }

    #[test]
    fn test_object_functions() {
        let data = json!({"a": {"x": 1, "y": 2}, "b": {"y": 3, "z": 4}});
        assert_eq!(search("keys(a)", data.clone()), json!(["x", "y"]));
        assert_eq!(search("values(a)", data.clone()), json!([1, 2]));
        assert_eq!(
            search("merge(a, b)", data.clone()),
            json!({"x": 1, "y": 3, "z": 4})
        );
        assert_eq!(search("length(b)", data), json!(2));
    }

    #[test]
    fn test_expref_functions() {
        let data = json!({"people": [
            {"name": "b", "age": 30},
            {"name": "a", "age": 20},
            {"name": "c", "age": 40},
        ]});
        assert_eq!(
            search("sort_by(people, &age)[*].name", data.clone()),
            json!(["a", "b", "c"])
        );
        assert_eq!(search("max_by(people, &age).name", data.clone()), json!("c"));
        assert_eq!(search("min_by(people, &name).name", data.clone()), json!("a"));
        assert_eq!(
            search("map(&name, people)", data),
            json!(["b", "a", "c"])
        );
    }

    #[test]
    fn test_map_keeps_nulls() {
        let data = json!([{"a": 1}, {}]);
        assert_eq!(search("map(&a, @)", data), json!([1, null]));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(search("to_number('42')", json!({})), json!(42));
        assert_eq!(search("to_number('1.5')", json!({})), json!(1.5));
        assert_eq!(search("to_number('abc')", json!({})), Value::Null);
        assert_eq!(search("to_string(@)", json!([1, 2])), json!("[1,2]"));
        assert_eq!(search("to_string('x')", json!({})), json!("x"));
        assert_eq!(search("to_array(`1`)", json!({})), json!([1]));
        assert_eq!(search("type(@)", json!({"a": 1})), json!("object"));
        assert_eq!(search("not_null(a, b, 'c')", json!({"b": 2})), json!(2));
    }

    #[test]
    fn test_sort_is_stable_and_typed() {
        assert_eq!(search("sort(@)", json!([3, 1, 2])), json!([1, 2, 3]));
        assert_eq!(search("sort(@)", json!(["b", "a"])), json!(["a", "b"]));
        assert!(matches!(
            eval("sort(@)", json!([1, "a"])),
            Err(RuntimeError::InvalidType { function: "sort", .. })
        ));
    }

    #[test]
    fn test_call_errors() {
        assert_eq!(
            eval("nope(@)", json!({})),
            Err(RuntimeError::UnknownFunction("nope".into()))
        );
        assert!(matches!(
            eval("length(`1`)", json!({})),
            Err(RuntimeError::InvalidType { function: "length", actual: "number", .. })
        ));
        assert!(matches!(
            eval("sort_by(@, &a)", json!([{"a": 1}, {"a": "x"}])),
            Err(RuntimeError::InvalidType { function: "sort_by", .. })
        ));
    }

    #[test]
    fn test_call_site_arity() {
        assert_eq!(
            check_call_arity("abs", 2),
            Err(RuntimeError::Arity {
                function: "abs",
                expected: 1,
                actual: 2
            })
        );
        assert!(matches!(
            check_call_arity("merge", 0),
            Err(RuntimeError::VariadicArity { function: "merge", .. })
        ));
        assert!(check_call_arity("not_null", 3).is_ok());
        assert!(check_call_arity("nope", 7).is_ok());
    }
}
