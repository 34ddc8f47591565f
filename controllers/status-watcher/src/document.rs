//! Path-based access to untyped object documents.
//!
//! Watched objects are handled as raw JSON. Lookups return a tagged result
//! so callers can tell a missing field apart from a field of the wrong shape
//! and decide per case whether to skip or fail.

use serde_json::Value;
use thiserror::Error;

/// A field exists but has an unexpected JSON type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path} is of type {actual}, expected {expected}")]
pub struct ShapeError {
    /// Dotted path of the offending field
    pub path: String,
    /// JSON type the caller asked for
    pub expected: &'static str,
    /// JSON type actually present
    pub actual: &'static str,
}

/// Result of a path lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Field present with the requested type
    Found(T),
    /// Field, or one of its parents, is absent or null
    NotFound,
    /// Field, or one of its parents, has the wrong type
    WrongType(ShapeError),
}

impl<T> Lookup<T> {
    /// The found value, discarding the reason for a miss
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::WrongType(_) => None,
        }
    }
}

/// JSON type name used in shape errors
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walks `path` through nested objects.
///
/// Null is treated like an absent field at any depth.
pub fn nested<'a>(root: &'a Value, path: &[&str]) -> Lookup<&'a Value> {
    let mut current = root;
    for (depth, field) in path.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            Value::Null => return Lookup::NotFound,
            other => {
                return Lookup::WrongType(ShapeError {
                    path: join(&path[..depth]),
                    expected: "object",
                    actual: type_name(other),
                });
            }
        };
        current = match map.get(*field) {
            Some(value) => value,
            None => return Lookup::NotFound,
        };
    }
    if current.is_null() { Lookup::NotFound } else { Lookup::Found(current) }
}

/// Array at `path`
pub fn nested_slice<'a>(root: &'a Value, path: &[&str]) -> Lookup<&'a [Value]> {
    match nested(root, path) {
        Lookup::Found(Value::Array(items)) => Lookup::Found(items.as_slice()),
        Lookup::Found(other) => Lookup::WrongType(ShapeError {
            path: join(path),
            expected: "array",
            actual: type_name(other),
        }),
        Lookup::NotFound => Lookup::NotFound,
        Lookup::WrongType(err) => Lookup::WrongType(err),
    }
}

/// String at `path`
pub fn nested_str<'a>(root: &'a Value, path: &[&str]) -> Lookup<&'a str> {
    match nested(root, path) {
        Lookup::Found(Value::String(s)) => Lookup::Found(s.as_str()),
        Lookup::Found(other) => Lookup::WrongType(ShapeError {
            path: join(path),
            expected: "string",
            actual: type_name(other),
        }),
        Lookup::NotFound => Lookup::NotFound,
        Lookup::WrongType(err) => Lookup::WrongType(err),
    }
}

fn join(path: &[&str]) -> String {
    if path.is_empty() { "<root>".to_string() } else { path.join(".") }
}
