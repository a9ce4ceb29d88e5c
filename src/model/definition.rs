//! # Definitions
//!
//! Field tables and model types. A [`Definition`] is the explicit list of
//! fields a model starts with; a [`ModelType`] is a named factory that stands
//! in for a model constructor wherever nested models are declared.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::config::SymeConfig;
use crate::host::Scheduler;

use super::errors::{ModelError, ModelResult};
use super::model::Model;
use super::throttle::{ChangeThrottle, DEFAULT_WINDOW};
use super::value::{json_type_name, Item};

/// Identifiers that can never be data fields. Names starting with `_` are
/// reserved as well.
pub const RESERVED_FIELDS: &[&str] = &[
    "*",
    "constructor",
    "on_update",
    "onUpdate",
    "on_any_update",
    "fill",
    "out",
    "errors",
    "validate",
    "extend",
    "keys",
    "toString",
    "toLocaleString",
    "valueOf",
    "hasOwnProperty",
    "isPrototypeOf",
    "propertyIsEnumerable",
    "should",
    "before",
    "clear",
];

/// Scope that matches every field
pub const WILDCARD: &str = "*";

/// Whether `name` is reserved
pub fn is_reserved(name: &str) -> bool {
    name.starts_with('_') || RESERVED_FIELDS.contains(&name)
}

/// How a field stores and coerces its value
#[derive(Clone)]
pub enum FieldKind {
    /// Any plain value
    Scalar,
    /// Always an instance of the given model type
    SingleModel(ModelType),
    /// Array whose elements are always instances of the given model type
    ModelArray(ModelType),
    /// Array of plain values
    PlainArray,
}

impl FieldKind {
    pub fn is_array(&self) -> bool {
        matches!(self, FieldKind::ModelArray(_) | FieldKind::PlainArray)
    }

    /// Declared element type of an array field
    pub fn element_type(&self) -> Option<&ModelType> {
        match self {
            FieldKind::ModelArray(model_type) => Some(model_type),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::SingleModel(_) => "model",
            FieldKind::ModelArray(_) => "model array",
            FieldKind::PlainArray => "array",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar => write!(f, "Scalar"),
            FieldKind::SingleModel(t) => write!(f, "SingleModel({})", t.name()),
            FieldKind::ModelArray(t) => write!(f, "ModelArray({})", t.name()),
            FieldKind::PlainArray => write!(f, "PlainArray"),
        }
    }
}

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    /// Default for scalar fields; arrays default to empty, model fields to a
    /// fresh instance.
    pub default: Value,
}

/// Ordered field table used to build or extend a model
#[derive(Debug, Clone, Default)]
pub struct Definition {
    fields: IndexMap<String, FieldSpec>,
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a base table; later additions override base fields of the
    /// same name.
    pub fn inherit(base: &Definition) -> Self {
        base.clone()
    }

    /// Classify a plain JSON object: arrays become plain array fields,
    /// everything else a scalar field with that default.
    pub fn from_json(value: &Value) -> ModelResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ModelError::InvalidDefinition(json_type_name(value)))?;

        let mut definition = Self::new();
        for (name, default) in object {
            definition = match default {
                Value::Array(_) => definition.array(name),
                other => definition.scalar(name, other.clone()),
            };
        }
        Ok(definition)
    }

    pub fn scalar(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind: FieldKind::Scalar,
                default: default.into(),
            },
        );
        self
    }

    pub fn array(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind: FieldKind::PlainArray,
                default: Value::Array(Vec::new()),
            },
        );
        self
    }

    pub fn model(mut self, name: impl Into<String>, model_type: &ModelType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind: FieldKind::SingleModel(model_type.clone()),
                default: Value::Null,
            },
        );
        self
    }

    pub fn model_array(mut self, name: impl Into<String>, model_type: &ModelType) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind: FieldKind::ModelArray(model_type.clone()),
                default: Value::Array(Vec::new()),
            },
        );
        self
    }

    /// Copy every field of `other` into this table
    pub fn merge(mut self, other: &Definition) -> Self {
        for (name, spec) in &other.fields {
            self.fields.insert(name.clone(), spec.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

type Factory = dyn Fn() -> ModelResult<Model> + Send + Sync;

/// A named model constructor
#[derive(Clone)]
pub struct ModelType {
    name: Arc<str>,
    factory: Arc<Factory>,
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType").field("name", &self.name).finish()
    }
}

impl ModelType {
    /// Model type whose instances start from `definition` and batch changes
    /// on the default scheduler.
    pub fn new(name: impl Into<String>, definition: Definition) -> Self {
        let name: String = name.into();
        let type_name = name.clone();
        Self::with_factory(name, move || Model::new(type_name.clone(), definition.clone()))
    }

    /// Model type whose instances schedule their throttle windows on
    /// `scheduler`.
    pub fn with_scheduler(
        name: impl Into<String>,
        definition: Definition,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_window(name, definition, scheduler, DEFAULT_WINDOW)
    }

    /// Model type whose instances batch changes over the configured window
    pub fn from_config(
        name: impl Into<String>,
        definition: Definition,
        scheduler: Arc<dyn Scheduler>,
        config: &SymeConfig,
    ) -> Self {
        Self::with_window(name, definition, scheduler, config.throttle_window())
    }

    pub fn with_window(
        name: impl Into<String>,
        definition: Definition,
        scheduler: Arc<dyn Scheduler>,
        window: Duration,
    ) -> Self {
        let name: String = name.into();
        let type_name = name.clone();
        Self::with_factory(name, move || {
            Model::with_throttle(
                type_name.clone(),
                definition.clone(),
                ChangeThrottle::with_window(scheduler.clone(), window),
            )
        })
    }

    /// Model type built by a custom factory. The factory must produce
    /// models named `name`.
    pub fn with_factory<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ModelResult<Model> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A default instance
    pub fn create(&self) -> ModelResult<Model> {
        let model = (self.factory)()?;
        if !self.is_instance(&model) {
            return Err(ModelError::TypeMismatch {
                expected: self.name.to_string(),
                found: model.type_name().to_string(),
            });
        }
        Ok(model)
    }

    /// A default instance filled from `raw`
    pub fn construct(&self, raw: &Value) -> ModelResult<Model> {
        let model = self.create()?;
        model.fill(raw)?;
        Ok(model)
    }

    /// Instances pass through; anything else is constructed from its plain
    /// form.
    pub fn coerce(&self, item: Item) -> ModelResult<Model> {
        match item {
            Item::Model(model) if self.is_instance(&model) => Ok(model),
            Item::Model(model) => self.construct(&model.out()),
            Item::Plain(value) => self.construct(&value),
        }
    }

    pub fn is_instance(&self, model: &Model) -> bool {
        model.type_name() == &*self.name
    }
}
