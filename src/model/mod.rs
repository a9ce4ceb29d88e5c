//! # Models
//!
//! Observable records with typed fields.
//!
//! A [`Model`] is built from a [`Definition`], an ordered table of fields
//! that are either plain scalars, plain arrays, a nested model, or an array
//! of nested models. Nested types are named by a [`ModelType`], which plays
//! the part of a constructor.
//!
//! ```ignore
//! let address = ModelType::new("Address", Definition::new().scalar("city", ""));
//! let user = Model::new(
//!     "User",
//!     Definition::new()
//!         .scalar("name", "")
//!         .model("address", &address)
//!         .model_array("previous", &address),
//! )?;
//!
//! user.on_update("name", |change| println!("{}", change.to_plain()))?;
//! user.before("name", |v| Ok(v))?;
//! user.fill(&json!({"name": "rick", "address": {"city": "Oslo"}}))?;
//! ```
//!
//! Assignments are coerced to the field kind, run through the field's
//! `before` chain, and reported to the model's [`ChangeThrottle`], which
//! delivers one `{old, new}` per field per window.

mod array;
mod definition;
mod errors;
#[allow(clippy::module_inception)]
mod model;
mod property;
mod throttle;
mod value;

pub use array::DynamicArray;
pub use definition::{
    is_reserved, Definition, FieldKind, FieldSpec, ModelType, RESERVED_FIELDS, WILDCARD,
};
pub use errors::{ModelError, ModelResult};
pub use model::Model;
pub use property::{Assignment, Rejection, Transform};
pub use throttle::{BatchCallback, ChangeThrottle, ScopeCallback, DEFAULT_WINDOW};
pub use value::{Change, ChangeSet, FieldValue, Item};

pub(crate) use value::json_type_name;
