//! Value resolution against the runtime environment.
//!
//! The environment only ever holds materialized values (`Literal`,
//! `Literals`, `Map`); everything else is resolved on demand by the
//! functions here. Lookups scan the environment back to front, so inner
//! bindings shadow outer ones.

use serde_json::Value as JsonValue;

use crate::code::{ComparisonOp, ConditionalNode, LogicalOp};
use crate::generator::{Binding, GenerateError};
use crate::value::{TrimSide, Value};

pub(super) fn lookup<'a>(env: &'a [Binding], name: &str) -> Option<&'a Value> {
    env.iter().rev().find(|b| b.name == name).map(|b| &b.value)
}

fn lookup_or_err<'a>(env: &'a [Binding], name: &str) -> Result<&'a Value, GenerateError> {
    lookup(env, name).ok_or_else(|| GenerateError::UndeclaredVariable {
        name: name.to_string(),
    })
}

/// Resolve a value to a single string.
pub(super) fn literal(env: &[Binding], value: &Value) -> Result<String, GenerateError> {
    match value {
        Value::Literal(text) => Ok(text.clone()),
        Value::AddString(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&literal(env, part)?);
            }
            Ok(out)
        }
        Value::TrimString { target, trim, side } => {
            let target = literal(env, target)?;
            let cutset = literal(env, trim)?;
            // The trim argument is a set of characters, not a prefix.
            let in_cutset = |c: char| cutset.contains(c);
            Ok(match side {
                TrimSide::Left => target.trim_start_matches(in_cutset).to_string(),
                TrimSide::Right => target.trim_end_matches(in_cutset).to_string(),
            })
        }
        Value::Ident(name) => match lookup_or_err(env, name)? {
            Value::Literal(text) => Ok(text.clone()),
            _ => Err(GenerateError::ShapeMismatch {
                name: name.clone(),
                expected: "a string",
            }),
        },
        Value::Element { name, index } => match lookup_or_err(env, name)? {
            Value::Literals(items) => {
                items
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| GenerateError::IndexOutOfBounds {
                        name: name.clone(),
                        index: *index,
                    })
            }
            _ => Err(GenerateError::ShapeMismatch {
                name: name.clone(),
                expected: "an array",
            }),
        },
        Value::MapValue { name, keys } => match map_node(env, name, keys)? {
            JsonValue::String(text) => Ok(text.clone()),
            _ => Err(GenerateError::ValueShape {
                expected: "a JSON string",
            }),
        },
        _ => Err(GenerateError::ValueShape {
            expected: "a string",
        }),
    }
}

/// Resolve a value to an array of strings.
pub(super) fn literals(env: &[Binding], value: &Value) -> Result<Vec<String>, GenerateError> {
    match value {
        Value::Literals(items) => Ok(items.clone()),
        Value::SplitString { target, sep } => {
            let target = literal(env, target)?;
            let sep = literal(env, sep)?;
            if sep.is_empty() {
                Ok(target.chars().map(String::from).collect())
            } else {
                Ok(target.split(&sep).map(str::to_string).collect())
            }
        }
        Value::MapKey { name } => match lookup_or_err(env, name)? {
            Value::Map(map) => {
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                Ok(keys)
            }
            _ => Err(GenerateError::ShapeMismatch {
                name: name.clone(),
                expected: "a map",
            }),
        },
        Value::Ident(name) => match lookup_or_err(env, name)? {
            Value::Literals(items) => Ok(items.clone()),
            _ => Err(GenerateError::ShapeMismatch {
                name: name.clone(),
                expected: "an array",
            }),
        },
        Value::MapValue { name, keys } => match map_node(env, name, keys)? {
            JsonValue::Array(items) => string_items(items),
            _ => Err(GenerateError::ValueShape {
                expected: "a JSON array",
            }),
        },
        _ => Err(GenerateError::ValueShape {
            expected: "an array",
        }),
    }
}

/// Resolve a value to its natural shape, ready to live in the environment.
pub(super) fn resolve_value(env: &[Binding], value: &Value) -> Result<Value, GenerateError> {
    match value {
        Value::Literal(_) | Value::Literals(_) | Value::Map(_) => Ok(value.clone()),
        Value::AddString(_) | Value::TrimString { .. } | Value::Element { .. } => {
            Ok(Value::Literal(literal(env, value)?))
        }
        Value::SplitString { .. } | Value::MapKey { .. } => {
            Ok(Value::Literals(literals(env, value)?))
        }
        Value::Ident(name) => lookup_or_err(env, name).cloned(),
        Value::MapValue { name, keys } => match map_node(env, name, keys)? {
            JsonValue::String(text) => Ok(Value::Literal(text.clone())),
            JsonValue::Array(items) => Ok(Value::Literals(string_items(items)?)),
            JsonValue::Object(fields) => Ok(Value::Map(fields.clone())),
            _ => Err(GenerateError::ValueShape {
                expected: "a JSON string, array or object",
            }),
        },
    }
}

/// Walk a `name[k1][k2]...` chain and return the final JSON node.
fn map_node<'a>(
    env: &'a [Binding],
    name: &str,
    keys: &[Value],
) -> Result<&'a JsonValue, GenerateError> {
    let object = match lookup_or_err(env, name)? {
        Value::Map(map) => map,
        _ => {
            return Err(GenerateError::ShapeMismatch {
                name: name.to_string(),
                expected: "a map",
            })
        }
    };

    let mut node: Option<&JsonValue> = None;
    for key in keys {
        let key = literal(env, key)?;
        let fields = match node {
            None => object,
            Some(JsonValue::Object(inner)) => inner,
            Some(_) => {
                return Err(GenerateError::ValueShape {
                    expected: "a JSON object",
                })
            }
        };
        node = Some(fields.get(&key).ok_or_else(|| GenerateError::MissingKey {
            name: name.to_string(),
            key: key.clone(),
        })?);
    }
    node.ok_or(GenerateError::ValueShape {
        expected: "a JSON object",
    })
}

fn string_items(items: &[JsonValue]) -> Result<Vec<String>, GenerateError> {
    items
        .iter()
        .map(|item| match item {
            JsonValue::String(text) => Ok(text.clone()),
            _ => Err(GenerateError::ValueShape {
                expected: "an array of JSON strings",
            }),
        })
        .collect()
}

/// Evaluate a condition tree. Both sides of a logical node are evaluated,
/// so a resolution error on either side surfaces even when the other side
/// would already decide the outcome.
pub(super) fn eval_condition(
    env: &[Binding],
    node: &ConditionalNode,
) -> Result<bool, GenerateError> {
    match node {
        ConditionalNode::Logical { op, left, right } => {
            let left = eval_condition(env, left)?;
            let right = eval_condition(env, right)?;
            Ok(match op {
                LogicalOp::And => left && right,
                LogicalOp::Or => left || right,
            })
        }
        ConditionalNode::Comparison {
            op,
            negated,
            left,
            right,
        } => {
            let left = literal(env, left)?;
            let right = literal(env, right)?;
            let result = match op {
                ComparisonOp::Equal => left == right,
                ComparisonOp::NotEqual => left != right,
                ComparisonOp::StartWith => left.starts_with(&right),
                ComparisonOp::EndWith => left.ends_with(&right),
            };
            Ok(result != *negated)
        }
    }
}
