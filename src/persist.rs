// used for persistence
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params};
use tracing::trace;

use std::collections::HashMap;
use std::sync::Arc;

use crate::construct::ObjectStore;
use crate::datatype::{TypedValue, ValueKind};
use crate::error::{Result, SeedlingError};
use crate::model::{FieldType, Identity, ObjectHandle, Schema, TypeInfo, TypeResolver, Value};

// ValueType markers for rows that do not hold a scalar
const OBJECT_ROW: &str = "Object";
const NULL_ROW: &str = "Null";
// position of the row that marks a non-null collection, holding its length
const LIST_HEADER: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// Object store keeping every object as one `Object` row plus one `Field`
/// row per field value (per element for collections).
pub struct SqliteStore {
    connection: Connection,
    schema: Arc<Schema>,
    saved: usize,
}

impl SqliteStore {
    pub fn open(mode: &PersistenceMode, schema: Arc<Schema>) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // no STRICT, and Value has blob affinity so bound values are kept as they are
        connection.execute_batch(
            "
            create table if not exists Object (
                Object_Identity integer not null,
                Class text not null,
                constraint referenceable_Object_Identity primary key (
                    Object_Identity
                )
            );-- STRICT;
            create table if not exists Field (
                Object_Identity integer not null,
                Field text not null,
                Position integer not null,
                Value blob,
                ValueType text not null,
                constraint Field_of_Object foreign key (
                    Object_Identity
                ) references Object(Object_Identity),
                constraint unique_Field_Position primary key (
                    Object_Identity,
                    Field,
                    Position
                )
            );-- STRICT;
            ",
        )?;
        Ok(Self {
            connection,
            schema,
            saved: 0,
        })
    }
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
    /// Number of objects inserted through this store.
    pub fn saved_count(&self) -> usize {
        self.saved
    }

    fn load(&self, identity: Identity, loaded: &mut HashMap<Identity, ObjectHandle>) -> Result<ObjectHandle> {
        if let Some(object) = loaded.get(&identity) {
            return Ok(object.clone());
        }
        let class_name: String = self
            .connection
            .prepare_cached("select Class from Object where Object_Identity = ?")?
            .query_row(params![identity], |r| r.get(0))?;
        let class = match self.schema.resolve("", &class_name) {
            Some(TypeInfo::Class(class)) => class,
            _ => {
                return Err(SeedlingError::Store(format!(
                    "stored object {identity} has unknown class {class_name}"
                )));
            }
        };
        let object = ObjectHandle::new(Arc::clone(&class), class_name);
        object.mark_stored(identity)?;
        loaded.insert(identity, object.clone());

        let rows: Vec<(String, i64, SqlValue, String)> = {
            let mut statement = self.connection.prepare_cached(
                "select Field, Position, Value, ValueType from Field where Object_Identity = ? order by Field, Position",
            )?;
            statement
                .query_map(params![identity], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                .collect::<rusqlite::Result<_>>()?
        };
        let mut lists: HashMap<String, Vec<Value>> = HashMap::new();
        for (field, position, stored, value_type) in rows {
            if position == LIST_HEADER {
                lists.entry(field).or_default();
                continue;
            }
            let value = match value_type.as_str() {
                NULL_ROW => Value::Null,
                OBJECT_ROW => match stored {
                    SqlValue::Integer(referenced) => Value::Object(self.load(referenced, loaded)?),
                    other => {
                        return Err(SeedlingError::Store(format!(
                            "object reference in '{field}' is not an identity: {other:?}"
                        )));
                    }
                },
                type_name => {
                    let kind = ValueKind::from_type_name(type_name).ok_or_else(|| {
                        SeedlingError::Store(format!("unknown stored value type {type_name}"))
                    })?;
                    Value::Scalar(TypedValue::from_stored(&kind, ValueRef::from(&stored))?)
                }
            };
            match class.field_type(&field) {
                Some(FieldType::Collection { .. }) => lists.entry(field).or_default().push(value),
                _ => object.put(&field, value)?,
            }
        }
        for (field, items) in lists {
            object.put(&field, Value::List(items))?;
        }
        Ok(object)
    }
}

/// Writes the field rows of `object` under `identity`. The object need not
/// be marked stored yet: its identity field and references to itself are
/// written from `identity`.
fn write_fields(connection: &Connection, identity: Identity, object: &ObjectHandle) -> Result<()> {
    // snapshot first, referenced objects may be this very object
    let (fields, identity_field): (Vec<(String, Value)>, Option<String>) = {
        let guard = object.lock()?;
        let fields = guard
            .fields()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        (fields, guard.class().identity().map(str::to_string))
    };
    let mut insert = connection.prepare_cached(
        "insert into Field (Object_Identity, Field, Position, Value, ValueType) values (?, ?, ?, ?, ?)",
    )?;
    let mut write = |field: &str, position: i64, value: &Value| -> Result<()> {
        match value {
            Value::Null => insert.execute(params![identity, field, position, SqlValue::Null, NULL_ROW])?,
            Value::Scalar(scalar) => insert.execute(params![
                identity,
                field,
                position,
                scalar,
                scalar.kind().type_name()
            ])?,
            Value::Object(referenced) => {
                let referenced_identity = if referenced.ptr_eq(object) {
                    identity
                } else {
                    referenced.stored()?.ok_or_else(|| {
                        SeedlingError::Store(format!(
                            "field '{field}' references an object that was never saved: {referenced:?}"
                        ))
                    })?
                };
                insert.execute(params![identity, field, position, referenced_identity, OBJECT_ROW])?
            }
            Value::List(_) => {
                return Err(SeedlingError::Store(format!("nested collections are not supported in '{field}'")));
            }
        };
        Ok(())
    };
    for (field, value) in &fields {
        match value {
            Value::List(items) => {
                write(field, LIST_HEADER, &Value::Scalar(TypedValue::Int(items.len() as i64)))?;
                for (position, item) in items.iter().enumerate() {
                    write(field, position as i64, item)?;
                }
            }
            // nulls are restored from field defaults
            Value::Null => {}
            Value::Scalar(TypedValue::Int(_)) if identity_field.as_deref() == Some(field.as_str()) => {
                write(field, 0, &Value::Scalar(TypedValue::Int(identity)))?
            }
            Value::Scalar(TypedValue::String(_)) if identity_field.as_deref() == Some(field.as_str()) => {
                write(field, 0, &Value::Scalar(TypedValue::String(identity.to_string())))?
            }
            other => write(field, 0, other)?,
        }
    }
    Ok(())
}

impl ObjectStore for SqliteStore {
    fn open_session(&mut self) -> Result<()> {
        if self.connection.is_autocommit() {
            self.connection.execute_batch("begin")?;
        }
        Ok(())
    }
    fn close_session(&mut self) -> Result<()> {
        if !self.connection.is_autocommit() {
            self.connection.execute_batch("commit")?;
        }
        Ok(())
    }
    fn abandon_session(&mut self) -> Result<()> {
        if !self.connection.is_autocommit() {
            self.connection.execute_batch("rollback")?;
        }
        Ok(())
    }

    fn save(&mut self, object: &ObjectHandle) -> Result<Identity> {
        let class_name = object.class_name()?;
        // the object row and its fields land together or not at all
        let savepoint = self.connection.savepoint()?;
        savepoint
            .prepare_cached("insert into Object (Class) values (?)")?
            .execute(params![class_name])?;
        let identity = savepoint.last_insert_rowid();
        write_fields(&savepoint, identity, object)?;
        savepoint.commit()?;
        self.saved += 1;
        trace!(identity, class = %class_name, "saved object");
        Ok(identity)
    }

    fn update(&mut self, object: &ObjectHandle) -> Result<()> {
        let identity = object
            .stored()?
            .ok_or_else(|| SeedlingError::Store(format!("can not update unsaved object {object:?}")))?;
        let savepoint = self.connection.savepoint()?;
        savepoint
            .prepare_cached("delete from Field where Object_Identity = ?")?
            .execute(params![identity])?;
        write_fields(&savepoint, identity, object)?;
        savepoint.commit()?;
        trace!(identity, "updated object");
        Ok(())
    }

    fn query_first(&mut self, query: &str) -> Result<Option<ObjectHandle>> {
        let first: Option<Identity> = {
            let mut statement = self.connection.prepare(query)?;
            let mut rows = statement.query([])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };
        first
            .map(|identity| self.load(identity, &mut HashMap::new()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectModel;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::from_json(
                r#"{
                    "namespace": "Shop",
                    "classes": [
                        { "name": "Customer", "fields": { "Id": "Int32", "Name": "String", "Best": "Customer", "Tags": "List<String>", "Notes": "List<String>?" } }
                    ]
                }"#,
            )
            .unwrap(),
        )
    }

    fn customer(schema: &Schema, name: &str) -> ObjectHandle {
        let Some(TypeInfo::Class(class)) = schema.resolve("", "Shop.Customer") else {
            panic!("class missing")
        };
        let object = schema.instantiate("Shop.Customer", &class);
        schema
            .set_property(&object, "Name", Value::Scalar(TypedValue::String(name.into())))
            .unwrap();
        object
    }

    #[test]
    fn saved_objects_load_back_with_cycles() {
        let schema = schema();
        let mut store = SqliteStore::open(&PersistenceMode::InMemory, Arc::clone(&schema)).unwrap();
        let ann = customer(&schema, "Ann");
        schema
            .append_to_collection(&ann, "Tags", Value::Scalar(TypedValue::String("vip".into())))
            .unwrap();
        let identity = store.save(&ann).unwrap();
        assert_eq!(ann.stored().unwrap(), None);
        ann.mark_stored(identity).unwrap();
        schema.set_property(&ann, "Best", Value::Object(ann.clone())).unwrap();
        store.update(&ann).unwrap();
        assert_eq!(ann.get("Id").unwrap(), Some(Value::Scalar(TypedValue::Int(identity))));

        let loaded = store
            .query_first("select Object_Identity from Object where Class = 'Shop.Customer'")
            .unwrap()
            .unwrap();
        assert!(!loaded.ptr_eq(&ann));
        assert_eq!(loaded.stored().unwrap(), Some(identity));
        assert_eq!(loaded.get("Name").unwrap(), Some(Value::Scalar(TypedValue::String("Ann".into()))));
        assert_eq!(
            loaded.get("Tags").unwrap(),
            Some(Value::List(vec![Value::Scalar(TypedValue::String("vip".into()))]))
        );
        assert_eq!(loaded.get("Notes").unwrap(), Some(Value::Null));
        let best = loaded.get("Best").unwrap().unwrap();
        assert!(best.as_object().unwrap().ptr_eq(&loaded));
    }

    #[test]
    fn empty_queries_find_nothing() {
        let mut store = SqliteStore::open(&PersistenceMode::InMemory, schema()).unwrap();
        assert!(store.query_first("select Object_Identity from Object").unwrap().is_none());
        assert!(store.query_first("select nonsense").is_err());
    }

    #[test]
    fn abandoned_sessions_leave_nothing_behind() {
        let schema = schema();
        let mut store = SqliteStore::open(&PersistenceMode::InMemory, Arc::clone(&schema)).unwrap();
        store.open_session().unwrap();
        store.save(&customer(&schema, "Bob")).unwrap();
        store.abandon_session().unwrap();
        let count: i64 = store
            .connection()
            .query_row("select count(*) from Object", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn unsaved_references_are_rejected() {
        let schema = schema();
        let mut store = SqliteStore::open(&PersistenceMode::InMemory, Arc::clone(&schema)).unwrap();
        let ann = customer(&schema, "Ann");
        schema
            .set_property(&ann, "Best", Value::Object(customer(&schema, "Ghost")))
            .unwrap();
        assert!(matches!(store.save(&ann), Err(SeedlingError::Store(_))));
        assert_eq!(ann.stored().unwrap(), None);
        let count: i64 = store
            .connection()
            .query_row("select count(*) from Object", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn first_save_writes_self_references_and_identity() {
        let schema = schema();
        let mut store = SqliteStore::open(&PersistenceMode::InMemory, Arc::clone(&schema)).unwrap();
        let ann = customer(&schema, "Ann");
        schema.set_property(&ann, "Best", Value::Object(ann.clone())).unwrap();
        let identity = store.save(&ann).unwrap();

        let loaded = store
            .query_first("select Object_Identity from Object")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get("Id").unwrap(), Some(Value::Scalar(TypedValue::Int(identity))));
        let best = loaded.get("Best").unwrap().unwrap();
        assert!(best.as_object().unwrap().ptr_eq(&loaded));
    }
}
