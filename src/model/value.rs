//! # Field values
//!
//! What a model field holds, what an array element is, and the `{old, new}`
//! pair reported for every accepted change.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use super::array::DynamicArray;
use super::model::Model;

/// One element of an array field
#[derive(Clone)]
pub enum Item {
    /// Plain JSON value
    Plain(Value),
    /// Nested model instance
    Model(Model),
}

impl Item {
    /// Serialize to a plain value tree
    pub fn to_plain(&self) -> Value {
        match self {
            Item::Plain(value) => value.clone(),
            Item::Model(model) => model.out(),
        }
    }

    /// The nested model, if this element is one
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Item::Model(model) => Some(model),
            Item::Plain(_) => None,
        }
    }

    /// The plain value, if this element is one
    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Item::Plain(value) => Some(value),
            Item::Model(_) => None,
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Plain(a), Item::Plain(b)) => a == b,
            (Item::Model(a), Item::Model(b)) => a.is_same(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Plain(value) => write!(f, "Plain({})", value),
            Item::Model(model) => write!(f, "{:?}", model),
        }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Plain(value)
    }
}

impl From<Model> for Item {
    fn from(model: Model) -> Self {
        Item::Model(model)
    }
}

impl From<&Model> for Item {
    fn from(model: &Model) -> Self {
        Item::Model(model.clone())
    }
}

/// A value flowing into or out of a model field
#[derive(Clone)]
pub enum FieldValue {
    /// Plain JSON value
    Scalar(Value),
    /// Nested model instance
    Model(Model),
    /// Plain ordered sequence (snapshots, candidates for array fields)
    List(Vec<Item>),
    /// Live array owned by a model field
    Array(DynamicArray),
}

impl FieldValue {
    /// Serialize to a plain value tree
    pub fn to_plain(&self) -> Value {
        match self {
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Model(model) => model.out(),
            FieldValue::List(items) => Value::Array(items.iter().map(Item::to_plain).collect()),
            FieldValue::Array(array) => array.to_plain(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Value::as_i64)
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            FieldValue::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&DynamicArray> {
        match self {
            FieldValue::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Elements of a list or array value
    pub fn items(&self) -> Option<Vec<Item>> {
        match self {
            FieldValue::List(items) => Some(items.clone()),
            FieldValue::Array(array) => Some(array.to_vec()),
            _ => None,
        }
    }

    /// Referential identity: pointer identity for models and arrays,
    /// value equality for scalars.
    pub fn is_same(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a == b,
            (FieldValue::Model(a), FieldValue::Model(b)) => a.is_same(b),
            (FieldValue::Array(a), FieldValue::Array(b)) => a.is_same(b),
            _ => false,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Scalar(value) => json_type_name(value),
            FieldValue::Model(_) => "model",
            FieldValue::List(_) | FieldValue::Array(_) => "array",
        }
    }
}

impl PartialEq<Value> for FieldValue {
    fn eq(&self, other: &Value) -> bool {
        &self.to_plain() == other
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scalar(value) => write!(f, "Scalar({})", value),
            FieldValue::Model(model) => write!(f, "{:?}", model),
            FieldValue::List(items) => f.debug_list().entries(items).finish(),
            FieldValue::Array(array) => write!(f, "{:?}", array),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<Model> for FieldValue {
    fn from(model: Model) -> Self {
        FieldValue::Model(model)
    }
}

impl From<&Model> for FieldValue {
    fn from(model: &Model) -> Self {
        FieldValue::Model(model.clone())
    }
}

impl From<Vec<Item>> for FieldValue {
    fn from(items: Vec<Item>) -> Self {
        FieldValue::List(items)
    }
}

impl From<Vec<Model>> for FieldValue {
    fn from(models: Vec<Model>) -> Self {
        FieldValue::List(models.into_iter().map(Item::Model).collect())
    }
}

impl From<DynamicArray> for FieldValue {
    fn from(array: DynamicArray) -> Self {
        FieldValue::Array(array)
    }
}

/// `{old, new}` pair reported for one scope
#[derive(Debug, Clone)]
pub struct Change {
    pub old: FieldValue,
    pub new: FieldValue,
}

impl Change {
    pub fn new(old: FieldValue, new: FieldValue) -> Self {
        Self { old, new }
    }

    /// Plain `{"old": .., "new": ..}` object
    pub fn to_plain(&self) -> Value {
        serde_json::json!({
            "old": self.old.to_plain(),
            "new": self.new.to_plain(),
        })
    }
}

/// Every pending scope of one throttle window, in first-touched order
pub type ChangeSet = IndexMap<String, Change>;

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_identity_is_value_equality() {
        let a = FieldValue::from("yolo");
        let b = FieldValue::Scalar(json!("yolo"));
        assert!(a.is_same(&b));
        assert!(!a.is_same(&FieldValue::from(12i64)));
    }

    #[test]
    fn test_list_to_plain() {
        let list = FieldValue::List(vec![Item::from(json!(1)), Item::from(json!("two"))]);
        assert_eq!(list.to_plain(), json!([1, "two"]));
        assert!(list == json!([1, "two"]));
    }

    #[test]
    fn test_change_to_plain() {
        let change = Change::new(FieldValue::from(12i64), FieldValue::from("new value"));
        assert_eq!(change.to_plain(), json!({"old": 12, "new": "new value"}));
    }
}
