//! Condition evaluation.
//!
//! Pure inspection of `status.conditions` on an untyped object. No logging
//! and no shared state, so evaluations for different objects can run
//! concurrently.

use crate::document::{Lookup, ShapeError, nested_slice, nested_str};
use serde_json::Value;
use thiserror::Error;

/// Path of the conditions list inside an object
pub const CONDITIONS_PATH: [&str; 2] = ["status", "conditions"];

/// The condition to look for and the status that counts as satisfied.
///
/// Both are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSpec {
    name: String,
    status: String,
}

impl ConditionSpec {
    /// Creates a condition spec
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
        }
    }

    /// `Ready=True`, the fixed policy of the watcher
    pub fn ready() -> Self {
        Self::new("Ready", "True")
    }

    /// Condition type to look for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status that satisfies the condition
    pub fn status(&self) -> &str {
        &self.status
    }
}

/// Outcome of a successful evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// Condition found with the expected status
    Satisfied,
    /// Condition found with another status
    Unsatisfied,
    /// Conditions present, none of a usable shape with a matching type
    NotFound,
    /// Object has no `status.conditions`
    NoConditions,
}

impl ConditionOutcome {
    /// True only for `Satisfied`
    pub fn is_satisfied(self) -> bool {
        matches!(self, ConditionOutcome::Satisfied)
    }
}

/// Evaluation failed because the conditions container is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// `status` or `status.conditions` has the wrong shape
    #[error("malformed status.conditions: {0}")]
    Malformed(#[from] ShapeError),
}

/// Evaluates `spec` against the object document `object`.
///
/// The first entry whose `type` matches decides the outcome. Entries that
/// are not objects, have no string `type`, or match but carry no string
/// `status` are skipped.
pub fn evaluate(object: &Value, spec: &ConditionSpec) -> Result<ConditionOutcome, ConditionError> {
    let conditions = match nested_slice(object, &CONDITIONS_PATH) {
        Lookup::Found(conditions) => conditions,
        Lookup::NotFound => return Ok(ConditionOutcome::NoConditions),
        Lookup::WrongType(err) => return Err(err.into()),
    };

    for entry in conditions {
        if !entry.is_object() {
            continue;
        }
        let Some(type_) = nested_str(entry, &["type"]).found() else {
            continue;
        };
        if !fold_eq(type_, spec.name()) {
            continue;
        }
        let Some(status) = nested_str(entry, &["status"]).found() else {
            continue;
        };

        return Ok(if fold_eq(status, spec.status()) {
            ConditionOutcome::Satisfied
        } else {
            ConditionOutcome::Unsatisfied
        });
    }

    Ok(ConditionOutcome::NotFound)
}

/// Case-insensitive equality under Unicode case folding
fn fold_eq(a: &str, b: &str) -> bool {
    a == b || a.chars().flat_map(char::to_lowercase).eq(b.chars().flat_map(char::to_lowercase))
}
