//! Value variants shared by the parser and the generator.
//!
//! A `Value` is the result of parsing a Myriad expression. Some variants are
//! already materialized (`Literal`, `Literals`, `Map`); the rest refer to
//! variables by name and only take a concrete shape when resolved against the
//! environment at generation time.

use serde_json::{Map, Value as JsonValue};

/// Which end of the string `trimLeft` / `trimRight` strips from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSide {
    Left,
    Right,
}

/// A Myriad expression result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain string.
    Literal(String),
    /// An ordered list of strings.
    Literals(Vec<String>),
    /// A JSON object loaded with `JsonUnmarshal`.
    Map(Map<String, JsonValue>),
    /// An unresolved reference to a variable.
    Ident(String),
    /// `name[index]` into an array-shaped variable.
    Element { name: String, index: usize },
    /// `name.keys` of a map-shaped variable.
    MapKey { name: String },
    /// `name[key]...` lookup into a map-shaped variable.
    MapValue { name: String, keys: Vec<Value> },
    /// `a + b + ...` string concatenation, left to right.
    AddString(Vec<Value>),
    /// `target.split(sep)`.
    SplitString { target: Box<Value>, sep: Box<Value> },
    /// `target.trimLeft(set)` / `target.trimRight(set)`.
    TrimString {
        target: Box<Value>,
        trim: Box<Value>,
        side: TrimSide,
    },
}
