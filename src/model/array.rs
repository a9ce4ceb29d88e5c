//! # Dynamic arrays
//!
//! The live value of an array field. Every mutating operation coerces new
//! elements into the field's element type, reports a `{old, new}` snapshot
//! pair to the owning model's throttle under the field name, and writes the
//! array back into its field so the getter stays in sync.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;

use super::definition::ModelType;
use super::errors::{ModelError, ModelResult};
use super::model::{Model, ModelInner};
use super::throttle::ChangeThrottle;
use super::value::{Change, FieldValue, Item};

struct ArrayInner {
    field: String,
    element: Option<ModelType>,
    items: RwLock<Vec<Item>>,
    throttle: ChangeThrottle,
    owner: Weak<ModelInner>,
}

/// Array bound to one model field
#[derive(Clone)]
pub struct DynamicArray {
    inner: Arc<ArrayInner>,
}

impl fmt::Debug for DynamicArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicArray")
            .field("field", &self.inner.field)
            .field("items", &self.to_vec())
            .finish()
    }
}

impl DynamicArray {
    /// Only model fields mint arrays; `items` must already be coerced.
    pub(crate) fn new(
        field: &str,
        element: Option<ModelType>,
        throttle: ChangeThrottle,
        owner: Weak<ModelInner>,
        items: Vec<Item>,
    ) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                field: field.to_string(),
                element,
                items: RwLock::new(items),
                throttle,
                owner,
            }),
        }
    }

    /// Coerce candidate elements into `element`, when one is declared
    pub(crate) fn coerce_items(
        element: Option<&ModelType>,
        items: Vec<Item>,
    ) -> ModelResult<Vec<Item>> {
        match element {
            Some(model_type) => items
                .into_iter()
                .map(|item| model_type.coerce(item).map(Item::Model))
                .collect(),
            None => Ok(items),
        }
    }

    /// Name of the owning field
    pub fn field(&self) -> &str {
        &self.inner.field
    }

    /// Declared element type
    pub fn element_type(&self) -> Option<&ModelType> {
        self.inner.element.as_ref()
    }

    /// Append elements, returning the new length
    pub fn push(&self, items: Vec<Item>) -> ModelResult<usize> {
        let items = Self::coerce_items(self.element_type(), items)?;
        self.mutate(move |backing| {
            backing.extend(items);
            backing.len()
        })
    }

    /// Append one element, returning the new length
    pub fn push_one(&self, item: impl Into<Item>) -> ModelResult<usize> {
        self.push(vec![item.into()])
    }

    /// Remove the last element
    pub fn pop(&self) -> ModelResult<Option<Item>> {
        self.mutate(|backing| backing.pop())
    }

    /// Remove the first element
    pub fn shift(&self) -> ModelResult<Option<Item>> {
        self.mutate(|backing| {
            if backing.is_empty() {
                None
            } else {
                Some(backing.remove(0))
            }
        })
    }

    /// Prepend elements in order, returning the new length
    pub fn unshift(&self, items: Vec<Item>) -> ModelResult<usize> {
        let items = Self::coerce_items(self.element_type(), items)?;
        self.mutate(move |backing| {
            backing.splice(0..0, items);
            backing.len()
        })
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// Both bounds are clamped to the array. Returns the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Item>,
    ) -> ModelResult<Vec<Item>> {
        let items = Self::coerce_items(self.element_type(), items)?;
        self.mutate(move |backing| {
            let start = start.min(backing.len());
            let end = start.saturating_add(delete_count).min(backing.len());
            backing.splice(start..end, items).collect()
        })
    }

    /// A plain copy of this array followed by `items`. Neither array changes
    /// and no event is raised.
    pub fn concat(&self, items: Vec<Item>) -> Vec<Item> {
        let mut out = self.to_vec();
        out.extend(items);
        out
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Item> {
        self.inner
            .items
            .read()
            .ok()
            .and_then(|items| items.get(index).cloned())
    }

    /// Snapshot of the elements
    pub fn to_vec(&self) -> Vec<Item> {
        self.inner
            .items
            .read()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// Elements that are models, in order
    pub fn models(&self) -> Vec<Model> {
        self.to_vec()
            .into_iter()
            .filter_map(|item| match item {
                Item::Model(model) => Some(model),
                Item::Plain(_) => None,
            })
            .collect()
    }

    /// Serialize to a plain JSON array
    pub fn to_plain(&self) -> Value {
        Value::Array(self.to_vec().iter().map(Item::to_plain).collect())
    }

    /// Pointer identity
    pub fn is_same(&self, other: &DynamicArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Item>) -> R) -> ModelResult<R> {
        let (old, new, out) = {
            let mut backing = self
                .inner
                .items
                .write()
                .map_err(|_| ModelError::poisoned())?;
            let old = backing.clone();
            let out = op(&mut backing);
            (old, backing.clone(), out)
        };

        self.inner.throttle.add(
            &self.inner.field,
            Change::new(FieldValue::List(old), FieldValue::List(new)),
        );

        if let Some(owner) = self.inner.owner.upgrade() {
            Model::from_inner(owner).attach_array(&self.inner.field, self.clone())?;
        }

        Ok(out)
    }
}
