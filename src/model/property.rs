//! # Reactive properties
//!
//! Per-field state and the assignment pipeline:
//!
//! 1. coerce the incoming value to the field kind
//! 2. run the transform chain, stopping silently at the first rejection
//! 3. skip values identical to the current one
//! 4. wrap array values in a [`DynamicArray`] owned by the field
//! 5. store and report `{old, new}` to the throttle
//!
//! No lock is held while transforms run or nested models are built.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::observability::{Event, Logger};

use super::array::DynamicArray;
use super::definition::FieldKind;
use super::errors::{ModelError, ModelResult};
use super::model::Model;
use super::value::{Change, FieldValue, Item};

/// Why a transform refused a value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rejection {
    reason: Option<String>,
}

impl Rejection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "rejected: {}", reason),
            None => write!(f, "rejected"),
        }
    }
}

/// One step of a field's `before` chain
pub type Transform = Arc<dyn Fn(FieldValue) -> Result<FieldValue, Rejection> + Send + Sync>;

/// Outcome of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The value was stored and reported to the throttle
    Stored,
    /// The value was identical to the current one
    Unchanged,
    /// A transform refused the value; nothing was stored or reported
    Rejected,
}

/// State of one model field
#[derive(Clone)]
pub(crate) struct PropertyDefinition {
    pub kind: FieldKind,
    pub default: Value,
    pub current: FieldValue,
    pub chain: Vec<Transform>,
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("current", &self.current)
            .field("chain", &self.chain.len())
            .finish()
    }
}

enum Candidate {
    Accepted(FieldValue),
    Unchanged,
    Rejected,
}

/// Run the setter pipeline and store the result
pub(crate) fn assign(model: &Model, field: &str, value: FieldValue) -> ModelResult<Assignment> {
    let (kind, value) = match evaluate(model, field, value)? {
        (_, Candidate::Rejected) => return Ok(Assignment::Rejected),
        (_, Candidate::Unchanged) => return Ok(Assignment::Unchanged),
        (kind, Candidate::Accepted(value)) => (kind, value),
    };

    let stored = match (&kind, value) {
        (kind, FieldValue::List(items)) if kind.is_array() => FieldValue::Array(DynamicArray::new(
            field,
            kind.element_type().cloned(),
            model.throttle().clone(),
            model.downgrade(),
            items,
        )),
        (_, value) => value,
    };

    let old = model.replace_current(field, stored.clone())?;
    model.throttle().add(field, Change::new(old, stored));
    Ok(Assignment::Stored)
}

/// Run coercion and the transform chain without storing
pub(crate) fn dry_run(model: &Model, field: &str, value: FieldValue) -> ModelResult<bool> {
    Ok(!matches!(evaluate(model, field, value)?.1, Candidate::Rejected))
}

fn evaluate(model: &Model, field: &str, value: FieldValue) -> ModelResult<(FieldKind, Candidate)> {
    let (kind, chain, current) = model.property_snapshot(field)?;

    let mut candidate = coerce(model, field, &kind, &current, value)?;
    for transform in &chain {
        match transform(candidate) {
            Ok(next) => candidate = next,
            Err(rejection) => {
                Logger::trace(
                    Event::AssignmentRejected,
                    &[
                        ("model", model.type_name()),
                        ("field", field),
                        ("reason", rejection.reason().unwrap_or("")),
                    ],
                );
                return Ok((kind, Candidate::Rejected));
            }
        }
    }

    // transforms may hand back raw values for typed fields
    let candidate = coerce(model, field, &kind, &current, candidate)?;
    if candidate.is_same(&current) {
        return Ok((kind, Candidate::Unchanged));
    }

    Ok((kind, Candidate::Accepted(candidate)))
}

/// Bring `value` into the shape `kind` stores.
///
/// Array kinds yield a `List` of coerced elements, except that the field's
/// own array passes through untouched. Model kinds yield an instance of the
/// declared type. Scalar kinds yield plain values.
fn coerce(
    model: &Model,
    field: &str,
    kind: &FieldKind,
    current: &FieldValue,
    value: FieldValue,
) -> ModelResult<FieldValue> {
    match kind {
        FieldKind::PlainArray | FieldKind::ModelArray(_) => {
            let items = match value {
                FieldValue::Array(array) if current.is_same(&FieldValue::Array(array.clone())) => {
                    return Ok(FieldValue::Array(array));
                }
                FieldValue::Array(array) => array.to_vec(),
                FieldValue::List(items) => items,
                FieldValue::Scalar(Value::Array(values)) => {
                    values.into_iter().map(Item::Plain).collect()
                }
                other => {
                    return Err(ModelError::InvalidAssignment {
                        model: model.type_name().to_string(),
                        field: field.to_string(),
                        expected: kind.as_str(),
                        found: other.type_name(),
                    })
                }
            };
            Ok(FieldValue::List(DynamicArray::coerce_items(
                kind.element_type(),
                items,
            )?))
        }
        FieldKind::SingleModel(model_type) => {
            let item = match value {
                FieldValue::Model(nested) => Item::Model(nested),
                FieldValue::Scalar(raw) => Item::Plain(raw),
                other => {
                    return Err(ModelError::InvalidAssignment {
                        model: model.type_name().to_string(),
                        field: field.to_string(),
                        expected: kind.as_str(),
                        found: other.type_name(),
                    })
                }
            };
            Ok(FieldValue::Model(model_type.coerce(item)?))
        }
        FieldKind::Scalar => Ok(match value {
            FieldValue::Scalar(raw) => FieldValue::Scalar(raw),
            other => FieldValue::Scalar(other.to_plain()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display() {
        assert_eq!(Rejection::new().to_string(), "rejected");
        assert_eq!(Rejection::because("too long").to_string(), "rejected: too long");
    }
}
