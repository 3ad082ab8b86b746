use seahash::SeaHasher;
use tracing::debug;

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use crate::error::{Result, SeedlingError};
use crate::model::{ObjectHandle, ObjectModel, Value};

type RefHasher = BuildHasherDefault<SeaHasher>;

/// Objects constructed or loaded during one run, by reference name.
/// A name is bound once and never rebound or evicted.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    objects: HashMap<String, ObjectHandle, RefHasher>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.objects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }
    pub fn get(&self, name: &str) -> Option<&ObjectHandle> {
        self.objects.get(name)
    }
    /// Binds `name`. Binding the same object again is a no-op, binding a
    /// different one is an error.
    pub fn bind(&mut self, name: &str, object: ObjectHandle) -> Result<()> {
        match self.objects.get(name) {
            Some(existing) if existing.ptr_eq(&object) => Ok(()),
            Some(_) => Err(SeedlingError::Invariant(format!(
                "reference '{name}' is already bound to another object"
            ))),
            None => {
                debug!(reference = name, "bound reference");
                self.objects.insert(name.to_string(), object);
                Ok(())
            }
        }
    }
    /// First write wins. Returns whether `object` was bound.
    pub fn bind_if_absent(&mut self, name: &str, object: ObjectHandle) -> bool {
        if self.contains(name) {
            false
        } else {
            self.objects.insert(name.to_string(), object);
            true
        }
    }
    /// Resolves `name` or `name.subproperty` for the property `property` of
    /// an entity of class `class`. Sub-properties are read through `model`.
    pub fn resolve(&self, raw: &str, class: &str, property: &str, model: &dyn ObjectModel) -> Result<Value> {
        let unresolved = || SeedlingError::UnresolvedReference {
            class: class.to_string(),
            property: property.to_string(),
            reference: raw.to_string(),
        };
        let (name, sub_property) = match raw.split_once('.') {
            Some((name, sub)) => (name, Some(sub)),
            None => (raw, None),
        };
        let object = self.objects.get(name.trim()).ok_or_else(unresolved)?;
        match sub_property {
            None => Ok(Value::Object(object.clone())),
            Some(sub) => model.get_property(object, sub.trim())?.ok_or_else(unresolved),
        }
    }
}
