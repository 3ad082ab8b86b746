//! Turning built entities into stored objects.
//!
//! The execution driver only knows the [`EntityConstructor`] capability.
//! [`StoreConstructor`] implements it on top of an [`ObjectModel`], which
//! binds values, and an [`ObjectStore`], which persists objects.

use serde::Deserialize;
use tracing::{debug, warn};

use std::sync::Arc;

use crate::datatype::TypedValue;
use crate::element::{Entity, Load};
use crate::error::{Result, SeedlingError};
use crate::model::{FieldType, Identity, ObjectHandle, ObjectModel, Value};
use crate::reference::ReferenceTable;

/// Capability that constructs and persists entities.
pub trait EntityConstructor {
    /// Called once before the first element of a run.
    fn begin_run(&mut self) -> Result<()> {
        Ok(())
    }
    /// Called once after the last element of a run, also when the run failed.
    fn end_run(&mut self) -> Result<()> {
        Ok(())
    }
    /// Creates or reuses the object of `entity`, binds its properties and
    /// persists it unless the entity opts out.
    fn construct_and_save(
        &mut self,
        entity: &Entity,
        references: &mut ReferenceTable,
    ) -> Result<ObjectHandle>;
    /// Binds the reference of `load` to the first object its query finds.
    /// Returns whether a new binding was made.
    fn add_reference(&mut self, load: &Load, references: &mut ReferenceTable) -> Result<bool>;
}

/// Persistence backend of a [`StoreConstructor`].
pub trait ObjectStore {
    fn open_session(&mut self) -> Result<()>;
    fn close_session(&mut self) -> Result<()>;
    /// Ends the session discarding what it wrote.
    fn abandon_session(&mut self) -> Result<()>;
    /// Inserts a new object and returns its identity. Either the object and
    /// all of its fields are written or nothing is; recording the identity
    /// on the object is left to the caller.
    fn save(&mut self, object: &ObjectHandle) -> Result<Identity>;
    fn update(&mut self, object: &ObjectHandle) -> Result<()>;
    fn query_first(&mut self, query: &str) -> Result<Option<ObjectHandle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// One session spans the whole run.
    #[default]
    PerRun,
    /// Every persisted entity and every load gets its own session.
    PerEntity,
}

pub struct StoreConstructor<M: ObjectModel, S: ObjectStore> {
    model: Arc<M>,
    store: S,
    mode: SessionMode,
    in_session: bool,
}

impl<M: ObjectModel, S: ObjectStore> StoreConstructor<M, S> {
    pub fn new(model: Arc<M>, store: S, mode: SessionMode) -> Self {
        Self {
            model,
            store,
            mode,
            in_session: false,
        }
    }
    pub fn model(&self) -> &Arc<M> {
        &self.model
    }
    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
    pub fn into_store(self) -> S {
        self.store
    }

    fn with_session<T>(&mut self, work: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        match self.mode {
            SessionMode::PerRun => {
                if !self.in_session {
                    self.store.open_session()?;
                    self.in_session = true;
                }
                work(&mut self.store)
            }
            SessionMode::PerEntity => {
                self.store.open_session()?;
                match work(&mut self.store) {
                    Ok(result) => {
                        self.store.close_session()?;
                        Ok(result)
                    }
                    Err(e) => {
                        if let Err(abandon) = self.store.abandon_session() {
                            warn!(error = %abandon, "could not abandon the session");
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    // a scalar bound to a collection field is appended to it
    fn bind_property(
        &self,
        object: &ObjectHandle,
        field_type: Option<&FieldType>,
        name: &str,
        value: Value,
    ) -> Result<()> {
        let collection = matches!(field_type, Some(FieldType::Collection { .. }));
        if collection && !matches!(value, Value::List(_)) {
            self.model.append_to_collection(object, name, value)
        } else {
            self.model.set_property(object, name, value)
        }
    }
}

impl<M: ObjectModel, S: ObjectStore> EntityConstructor for StoreConstructor<M, S> {
    fn begin_run(&mut self) -> Result<()> {
        if self.mode == SessionMode::PerRun && !self.in_session {
            self.store.open_session()?;
            self.in_session = true;
        }
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        if self.in_session {
            self.in_session = false;
            self.store.close_session()?;
        }
        Ok(())
    }

    fn construct_and_save(
        &mut self,
        entity: &Entity,
        references: &mut ReferenceTable,
    ) -> Result<ObjectHandle> {
        let (class_name, class) = entity.root().resolve_class(entity.class()).ok_or_else(|| {
            SeedlingError::TypeResolution {
                type_name: entity.class().to_string(),
                element: entity.render(),
            }
        })?;
        let reference = entity.reference();
        let existing = if reference.is_empty() {
            None
        } else {
            references.get(reference).cloned()
        };
        let object = match existing {
            Some(object) => {
                let existing_class = object.class_name()?;
                if existing_class != class_name {
                    return Err(SeedlingError::ReferenceTypeConflict {
                        reference: reference.to_string(),
                        existing: existing_class,
                        declared: class_name,
                    });
                }
                object
            }
            None => {
                let object = self.model.instantiate(&class_name, &class);
                if !reference.is_empty() {
                    references.bind(reference, object.clone())?;
                }
                object
            }
        };

        for property in entity.properties() {
            let value = match property.value() {
                TypedValue::Reference(raw) => {
                    references.resolve(raw, entity.class(), property.name(), self.model.as_ref())?
                },
                scalar => Value::Scalar(scalar.clone()),
            };
            self.bind_property(&object, class.field_type(property.name()), property.name(), value)?;
        }

        if !entity.save() {
            if let Some(identity) = class.identity() {
                let empty = class
                    .field_type(identity)
                    .map(FieldType::default_value)
                    .unwrap_or(Value::Null);
                self.model.set_property(&object, identity, empty)?;
            }
            debug!(class = %class_name, reference, "constructed entity without saving");
            return Ok(object);
        }

        let stored = object.stored()?;
        let persisted = self.with_session(|store| match stored {
            Some(identity) => store.update(&object).map(|_| identity),
            None => store.save(&object),
        });
        let identity = persisted.map_err(|e| SeedlingError::Persistence {
            class: entity.class().to_string(),
            reference: reference.to_string(),
            message: e.to_string(),
        })?;
        // only once the session is through
        if stored.is_none() {
            object.mark_stored(identity)?;
        }
        debug!(
            class = %class_name,
            reference,
            identity,
            updated = stored.is_some(),
            "constructed entity"
        );
        Ok(object)
    }

    fn add_reference(&mut self, load: &Load, references: &mut ReferenceTable) -> Result<bool> {
        let reference = load.reference();
        if references.contains(reference) {
            debug!(reference, "reference already bound, load skipped");
            return Ok(false);
        }
        let found = self
            .with_session(|store| store.query_first(load.query()))
            .map_err(|e| SeedlingError::Persistence {
                class: "load".into(),
                reference: reference.to_string(),
                message: e.to_string(),
            })?;
        match found {
            Some(object) => Ok(references.bind_if_absent(reference, object)),
            None => {
                warn!(reference, query = load.query(), "load matched nothing");
                Ok(false)
            }
        }
    }
}
