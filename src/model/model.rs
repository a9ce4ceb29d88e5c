//! # Model
//!
//! An observable, typed record. A model owns an ordered field table and a
//! [`ChangeThrottle`]; every assignment goes through the reactive setter
//! pipeline and accepted changes are delivered to `on_update` subscribers
//! once per throttle window.
//!
//! `Model` is a handle: clones share the same fields and subscribers.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::SymeConfig;
use crate::host::Scheduler;
use crate::observability::{Event, Logger};

use super::array::DynamicArray;
use super::definition::{is_reserved, Definition, FieldKind};
use super::errors::{ModelError, ModelResult};
use super::property::{self, Assignment, PropertyDefinition, Rejection, Transform};
use super::throttle::ChangeThrottle;
use super::value::{json_type_name, Change, ChangeSet, FieldValue, Item};

pub(crate) struct ModelInner {
    type_name: Arc<str>,
    fields: RwLock<IndexMap<String, PropertyDefinition>>,
    throttle: ChangeThrottle,
}

/// Observable record with typed fields
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.inner.type_name, self.out())
    }
}

impl Model {
    /// Build a model of `type_name` from `definition`. Changes are batched on
    /// the tokio scheduler.
    pub fn new(type_name: impl Into<String>, definition: Definition) -> ModelResult<Self> {
        Self::with_throttle(type_name, definition, ChangeThrottle::new())
    }

    /// Build a model whose throttle windows run on `scheduler`
    pub fn with_scheduler(
        type_name: impl Into<String>,
        definition: Definition,
        scheduler: Arc<dyn Scheduler>,
    ) -> ModelResult<Self> {
        Self::with_throttle(type_name, definition, ChangeThrottle::with_scheduler(scheduler))
    }

    /// Build a model whose throttle window comes from `config`
    pub fn from_config(
        type_name: impl Into<String>,
        definition: Definition,
        scheduler: Arc<dyn Scheduler>,
        config: &SymeConfig,
    ) -> ModelResult<Self> {
        Self::with_throttle(
            type_name,
            definition,
            ChangeThrottle::from_config(scheduler, config),
        )
    }

    pub fn with_throttle(
        type_name: impl Into<String>,
        definition: Definition,
        throttle: ChangeThrottle,
    ) -> ModelResult<Self> {
        let model = Self {
            inner: Arc::new(ModelInner {
                type_name: Arc::from(type_name.into()),
                fields: RwLock::new(IndexMap::new()),
                throttle,
            }),
        };
        model.extend(&definition)?;
        Ok(model)
    }

    pub(crate) fn from_inner(inner: Arc<ModelInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn throttle(&self) -> &ChangeThrottle {
        &self.inner.throttle
    }

    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    /// Pointer identity
    pub fn is_same(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Add or redefine fields.
    ///
    /// Reserved names are skipped. Redefining a field replaces its kind,
    /// default, value and transform chain without raising an event.
    pub fn extend(&self, definition: &Definition) -> ModelResult<&Self> {
        for (name, spec) in definition.iter() {
            if is_reserved(name) {
                Logger::warn(
                    Event::ReservedFieldSkipped,
                    &[("model", self.type_name()), ("field", name)],
                );
                continue;
            }

            let (default, current) = match &spec.kind {
                FieldKind::Scalar => (spec.default.clone(), FieldValue::Scalar(spec.default.clone())),
                FieldKind::SingleModel(model_type) => {
                    let nested = match &spec.default {
                        Value::Null => model_type.create()?,
                        raw => model_type.construct(raw)?,
                    };
                    (Value::Null, FieldValue::Model(nested))
                }
                FieldKind::PlainArray | FieldKind::ModelArray(_) => {
                    let seed = match &spec.default {
                        Value::Array(values) => values.iter().cloned().map(Item::Plain).collect(),
                        _ => Vec::new(),
                    };
                    let items = DynamicArray::coerce_items(spec.kind.element_type(), seed)?;
                    let array = DynamicArray::new(
                        name,
                        spec.kind.element_type().cloned(),
                        self.inner.throttle.clone(),
                        self.downgrade(),
                        items,
                    );
                    (Value::Array(Vec::new()), FieldValue::Array(array))
                }
            };

            let mut fields = self.inner.fields.write().map_err(|_| ModelError::poisoned())?;
            fields.insert(
                name.clone(),
                PropertyDefinition {
                    kind: spec.kind.clone(),
                    default,
                    current,
                    chain: Vec::new(),
                },
            );
        }
        Ok(self)
    }

    /// Current value of `field`
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        let fields = self.inner.fields.read().ok()?;
        fields.get(field).map(|def| def.current.clone())
    }

    /// Assign through the reactive setter
    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> ModelResult<Assignment> {
        property::assign(self, field, value.into())
    }

    /// Whether `value` would be accepted by `field`, without storing it
    pub fn validate(&self, field: &str, value: impl Into<FieldValue>) -> ModelResult<bool> {
        property::dry_run(self, field, value.into())
    }

    /// Copy the defined keys of a plain object into this model.
    ///
    /// Unknown keys are ignored and `null` fills nothing.
    pub fn fill(&self, source: &Value) -> ModelResult<&Self> {
        let object = match source {
            Value::Null => return Ok(self),
            Value::Object(object) => object,
            other => {
                return Err(ModelError::InvalidSource {
                    model: self.type_name().to_string(),
                    found: json_type_name(other),
                })
            }
        };

        for (name, value) in object {
            if !self.has_field(name) {
                continue;
            }
            self.set(name, FieldValue::Scalar(value.clone()))?;
        }
        Ok(self)
    }

    /// Fill from another model's serialized form
    pub fn fill_from(&self, source: &Model) -> ModelResult<&Self> {
        self.fill(&source.out())
    }

    /// Reset every field to its default.
    ///
    /// Nested models are cleared in place; arrays and scalars go through the
    /// setter and raise events like any other assignment.
    pub fn clear(&self) -> ModelResult<&Self> {
        let snapshot: Vec<(String, FieldKind, Value, FieldValue)> = {
            let fields = self.inner.fields.read().map_err(|_| ModelError::poisoned())?;
            fields
                .iter()
                .map(|(name, def)| {
                    (
                        name.clone(),
                        def.kind.clone(),
                        def.default.clone(),
                        def.current.clone(),
                    )
                })
                .collect()
        };

        for (name, kind, default, current) in snapshot {
            if let FieldValue::Model(nested) = current {
                nested.clear()?;
            } else if kind.is_array() {
                self.set(&name, FieldValue::List(Vec::new()))?;
            } else {
                self.set(&name, FieldValue::Scalar(default))?;
            }
        }
        Ok(self)
    }

    /// Serialize to a plain value tree
    pub fn out(&self) -> Value {
        let current: Vec<(String, FieldValue)> = match self.inner.fields.read() {
            Ok(fields) => fields
                .iter()
                .map(|(name, def)| (name.clone(), def.current.clone()))
                .collect(),
            Err(_) => return Value::Object(Map::new()),
        };

        let mut out = Map::new();
        for (name, value) in current {
            out.insert(name, value.to_plain());
        }
        Value::Object(out)
    }

    /// Append a transform to `field`'s chain
    pub fn before<F>(&self, field: &str, transform: F) -> ModelResult<&Self>
    where
        F: Fn(FieldValue) -> Result<FieldValue, Rejection> + Send + Sync + 'static,
    {
        self.before_chain(field, vec![Arc::new(transform)])
    }

    /// Append an ordered list of transforms to `field`'s chain
    pub fn before_chain(&self, field: &str, chain: Vec<Transform>) -> ModelResult<&Self> {
        let mut fields = self.inner.fields.write().map_err(|_| ModelError::poisoned())?;
        let def = fields
            .get_mut(field)
            .ok_or_else(|| ModelError::MissingBeforeTarget {
                field: field.to_string(),
            })?;
        def.chain.extend(chain);
        Ok(self)
    }

    /// Subscribe to changes of one field.
    ///
    /// `"*"` is refused with [`ModelError::WildcardScope`]; every field's
    /// change arrives through [`Model::on_any_update`].
    pub fn on_update<F>(&self, field: &str, callback: F) -> ModelResult<&Self>
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.inner.throttle.on_fire(field, callback)?;
        Ok(self)
    }

    /// Subscribe to every window's full batch of changes
    pub fn on_any_update<F>(&self, callback: F) -> &Self
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        self.inner.throttle.on_fire_any(callback);
        self
    }

    /// Deliver pending changes now instead of at the end of the window
    pub fn flush(&self) {
        self.inner.throttle.fire();
    }

    /// Field names in definition order
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .fields
            .read()
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.inner
            .fields
            .read()
            .map(|fields| fields.contains_key(field))
            .unwrap_or(false)
    }

    /// Declared kind of `field`
    pub fn kind(&self, field: &str) -> Option<FieldKind> {
        let fields = self.inner.fields.read().ok()?;
        fields.get(field).map(|def| def.kind.clone())
    }

    pub(crate) fn property_snapshot(
        &self,
        field: &str,
    ) -> ModelResult<(FieldKind, Vec<Transform>, FieldValue)> {
        let fields = self.inner.fields.read().map_err(|_| ModelError::poisoned())?;
        let def = fields.get(field).ok_or_else(|| ModelError::UnknownField {
            model: self.type_name().to_string(),
            field: field.to_string(),
        })?;
        Ok((def.kind.clone(), def.chain.clone(), def.current.clone()))
    }

    pub(crate) fn replace_current(&self, field: &str, value: FieldValue) -> ModelResult<FieldValue> {
        let mut fields = self.inner.fields.write().map_err(|_| ModelError::poisoned())?;
        let def = fields.get_mut(field).ok_or_else(|| ModelError::UnknownField {
            model: self.type_name().to_string(),
            field: field.to_string(),
        })?;
        Ok(std::mem::replace(&mut def.current, value))
    }

    pub(crate) fn attach_array(&self, field: &str, array: DynamicArray) -> ModelResult<()> {
        let mut fields = self.inner.fields.write().map_err(|_| ModelError::poisoned())?;
        if let Some(def) = fields.get_mut(field) {
            if def.kind.is_array() {
                def.current = FieldValue::Array(array);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ManualClock, ManualScheduler};
    use crate::model::ModelType;
    use serde_json::json;
    use std::sync::Mutex;

    fn scheduler() -> ManualScheduler {
        ManualScheduler::new(ManualClock::default())
    }

    fn user(scheduler: &ManualScheduler) -> Model {
        Model::with_scheduler(
            "User",
            Definition::new().scalar("id", 12).scalar("name", ""),
            Arc::new(scheduler.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_burst_of_assignments_is_one_change() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        model.on_update("id", move |c| sink.lock().unwrap().push(c.to_plain())).unwrap();

        model.set("id", -37).unwrap();
        model.set("id", "yolo").unwrap();
        model.set("id", json!({})).unwrap();
        model.set("id", 13).unwrap();
        model.set("id", "new value").unwrap();
        scheduler.advance(10);

        assert_eq!(*seen.lock().unwrap(), vec![json!({"old": 12, "new": "new value"})]);
    }

    #[test]
    fn test_same_value_is_unchanged() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        model.on_update("id", |_| {}).unwrap();

        assert_eq!(model.set("id", 12).unwrap(), Assignment::Unchanged);
        assert!(!model.throttle().is_armed());
    }

    #[test]
    fn test_wildcard_update_is_refused() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        assert!(matches!(
            model.on_update("*", |_| {}),
            Err(ModelError::WildcardScope)
        ));
    }

    #[test]
    fn test_unknown_field() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        assert!(matches!(
            model.set("email", "a@b.c"),
            Err(ModelError::UnknownField { .. })
        ));
        assert!(model.get("email").is_none());
    }

    #[test]
    fn test_reserved_fields_are_skipped() {
        let model = Model::new(
            "Thing",
            Definition::new().scalar("fill", 1).scalar("_secret", 2).scalar("ok", 3),
        )
        .unwrap();
        assert_eq!(model.keys(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_before_on_missing_field() {
        let model = Model::new("Thing", Definition::new().scalar("name", "")).unwrap();
        let err = model.before("bean", Ok).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model: called before on a property (bean) that does not exist"
        );
    }

    #[test]
    fn test_rejected_assignment_is_silent() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        model.on_update("name", move |_| *counter.lock().unwrap() += 1).unwrap();
        model
            .before("name", |v| match v.as_str() {
                Some(s) if s.len() > 3 => Err(Rejection::because("too long")),
                _ => Ok(v),
            })
            .unwrap();

        assert_eq!(model.set("name", "abcdef").unwrap(), Assignment::Rejected);
        assert!(!model.validate("name", "abcdef").unwrap());
        assert!(model.validate("name", "abc").unwrap());
        scheduler.advance(10);

        assert_eq!(model.get("name").unwrap(), json!(""));
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn test_nested_model_is_coerced() {
        let address = ModelType::new("Address", Definition::new().scalar("city", ""));
        let model = Model::new("User", Definition::new().model("address", &address)).unwrap();

        model.set("address", json!({"city": "Oslo"})).unwrap();
        let nested = model.get("address").unwrap();
        let nested = nested.as_model().unwrap();
        assert!(address.is_instance(nested));
        assert_eq!(nested.get("city").unwrap(), json!("Oslo"));
    }

    #[test]
    fn test_fill_rejects_non_objects() {
        let model = Model::new("User", Definition::new().scalar("id", 0)).unwrap();
        assert!(model.fill(&Value::Null).is_ok());
        assert!(matches!(
            model.fill(&json!("nope")),
            Err(ModelError::InvalidSource { found: "string", .. })
        ));
    }

    #[test]
    fn test_flush_delivers_early() {
        let scheduler = scheduler();
        let model = user(&scheduler);
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        model.on_update("id", move |_| *counter.lock().unwrap() += 1).unwrap();

        model.set("id", 1).unwrap();
        model.flush();
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(scheduler.advance(10), 0);
    }
}
