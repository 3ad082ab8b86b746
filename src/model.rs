//! Object model the engine constructs into.
//!
//! The engine never depends on a concrete host object model. It talks to the
//! [`TypeResolver`] and [`ObjectModel`] capabilities; [`Schema`] is the
//! provided implementation, a registry of classes and enums loaded from JSON:
//!
//! ```json
//! {
//!   "namespace": "Shop",
//!   "classes": [
//!     { "name": "Customer", "fields": { "Id": "Int32", "Name": "String", "Orders": "List<Order>" } },
//!     { "name": "Order", "fields": { "Id": "Int32", "Customer": "Customer", "Status": "Enum.Status" } }
//!   ],
//!   "enums": [ { "name": "Status", "members": ["Open", "Closed"] } ]
//! }
//! ```

use indexmap::IndexMap;
use serde::Deserialize;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::datatype::{TypedValue, ValueKind};
use crate::error::{Result, SeedlingError};

pub type Identity = i64;

const DEFAULT_IDENTITY_FIELD: &str = "Id";

/// Declared type of a class field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ValueKind),
    /// Holds another constructed object of the named class.
    Object(String),
    /// `List<T>` starts empty, `List<T>?` starts null.
    Collection { element: Box<FieldType>, nullable: bool },
}

impl FieldType {
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Scalar(ValueKind::Int) => Value::Scalar(TypedValue::Int(0)),
            FieldType::Scalar(ValueKind::String) => Value::Scalar(TypedValue::String(String::new())),
            FieldType::Collection { nullable: false, .. } => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }
    /// Whether `value` may be stored in a field of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::Scalar(kind), Value::Scalar(v)) => *kind == v.kind(),
            (FieldType::Object(class), Value::Object(handle)) => handle
                .class_name()
                .map(|name| class_matches(class, &name))
                .unwrap_or(false),
            (FieldType::Collection { element, .. }, Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            _ => false,
        }
    }
}
impl FromStr for FieldType {
    type Err = SeedlingError;
    fn from_str(s: &str) -> Result<FieldType> {
        let s = s.trim();
        let (body, nullable) = match s.strip_suffix('?') {
            Some(body) => (body.trim(), true),
            None => (s, false),
        };
        if let Some(inner) = body.strip_prefix("List<").and_then(|b| b.strip_suffix('>')) {
            return Ok(FieldType::Collection {
                element: Box::new(inner.parse()?),
                nullable,
            });
        }
        if nullable || body.is_empty() {
            return Err(SeedlingError::Config(format!("invalid field type '{s}'")));
        }
        Ok(match ValueKind::from_type_name(body) {
            Some(ValueKind::Reference) | None => FieldType::Object(body.to_string()),
            Some(kind) => FieldType::Scalar(kind),
        })
    }
}
impl TryFrom<String> for FieldType {
    type Error = SeedlingError;
    fn try_from(s: String) -> Result<FieldType> {
        s.parse()
    }
}

// field types name classes without namespace, objects carry qualified names
fn class_matches(declared: &str, actual: &str) -> bool {
    declared == actual || actual.rsplit('.').next() == Some(declared)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassDef {
    name: String,
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, FieldTypeDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
struct FieldTypeDef(FieldType);
impl TryFrom<String> for FieldTypeDef {
    type Error = SeedlingError;
    fn try_from(s: String) -> Result<FieldTypeDef> {
        Ok(FieldTypeDef(s.parse()?))
    }
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: None,
            fields: IndexMap::new(),
        }
    }
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), FieldTypeDef(field_type));
        self
    }
    pub fn identity_field(mut self, name: impl Into<String>) -> Self {
        self.identity = Some(name.into());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name).map(|f| &f.0)
    }
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields.iter().map(|(name, f)| (name.as_str(), &f.0))
    }
    /// The declared identity field, or `Id` when the class has one.
    pub fn identity(&self) -> Option<&str> {
        match &self.identity {
            Some(name) => Some(name.as_str()),
            None if self.fields.contains_key(DEFAULT_IDENTITY_FIELD) => Some(DEFAULT_IDENTITY_FIELD),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnumDef {
    name: String,
    members: Vec<String>,
}
impl EnumDef {
    pub fn new<M: Into<String>>(name: impl Into<String>, members: impl IntoIterator<Item = M>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

#[derive(Debug, Clone)]
pub enum TypeInfo {
    Class(Arc<ClassDef>),
    Enum(Arc<EnumDef>),
}

/// Resolves type names declared in a document.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, assembly: &str, full_name: &str) -> Option<TypeInfo>;
}

/// Binds values onto constructed objects.
pub trait ObjectModel: TypeResolver {
    /// Creates a fresh object of `class`, known to the document as `class_name`.
    fn instantiate(&self, class_name: &str, class: &Arc<ClassDef>) -> ObjectHandle;
    fn get_property(&self, object: &ObjectHandle, name: &str) -> Result<Option<Value>>;
    fn set_property(&self, object: &ObjectHandle, name: &str, value: Value) -> Result<()>;
    /// Appends to a collection field whose current value must be a list.
    fn append_to_collection(&self, object: &ObjectHandle, name: &str, value: Value) -> Result<()>;
}

// ------------- Values and objects -------------
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Scalar(TypedValue),
    Object(ObjectHandle),
    List(Vec<Value>),
}
impl Value {
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Object(handle) => write!(f, "{handle:?}"),
            Value::List(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    class: Arc<ClassDef>,
    // fully qualified, as resolved from the document
    qualified_name: String,
    fields: IndexMap<String, Value>,
    stored: Option<Identity>,
}
impl Object {
    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
    /// Identity assigned by the store, if the object was persisted.
    pub fn stored(&self) -> Option<Identity> {
        self.stored
    }
}

/// Shared handle to a constructed or loaded object. Equality is identity.
#[derive(Clone)]
pub struct ObjectHandle(Arc<Mutex<Object>>);

impl ObjectHandle {
    pub fn new(class: Arc<ClassDef>, qualified_name: impl Into<String>) -> Self {
        let fields = class
            .fields()
            .map(|(name, field_type)| (name.to_string(), field_type.default_value()))
            .collect();
        Self(Arc::new(Mutex::new(Object {
            class,
            qualified_name: qualified_name.into(),
            fields,
            stored: None,
        })))
    }
    pub fn lock(&self) -> Result<MutexGuard<'_, Object>> {
        self.0.lock().map_err(|e| SeedlingError::Lock(e.to_string()))
    }
    pub fn class_name(&self) -> Result<String> {
        Ok(self.lock()?.qualified_name.clone())
    }
    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.fields.get(field).cloned())
    }
    pub fn stored(&self) -> Result<Option<Identity>> {
        Ok(self.lock()?.stored)
    }
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
    pub(crate) fn put(&self, field: &str, value: Value) -> Result<()> {
        self.lock()?.fields.insert(field.to_string(), value);
        Ok(())
    }
    /// Records the store identity and mirrors it into the identity field.
    pub(crate) fn mark_stored(&self, identity: Identity) -> Result<()> {
        let mut object = self.lock()?;
        object.stored = Some(identity);
        let identity_field = object
            .class
            .identity()
            .map(|name| (name.to_string(), object.class.field_type(name).cloned()));
        if let Some((name, Some(FieldType::Scalar(kind)))) = identity_field {
            let value = match kind {
                ValueKind::Int => Some(TypedValue::Int(identity)),
                ValueKind::String => Some(TypedValue::String(identity.to_string())),
                _ => None,
            };
            if let Some(value) = value {
                object.fields.insert(name, Value::Scalar(value));
            }
        }
        Ok(())
    }
}
impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
// objects may reference themselves, so never recurse into fields
impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.try_lock() {
            Ok(object) => write!(f, "{}#{:?}", object.qualified_name, object.stored),
            Err(_) => write!(f, "<locked object>"),
        }
    }
}

// ------------- Schema -------------
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    assembly: String,
    #[serde(default)]
    classes: Vec<ClassDef>,
    #[serde(default)]
    enums: Vec<EnumDef>,
}

/// Registry of the classes and enums a document may construct.
#[derive(Debug, Default)]
pub struct Schema {
    assembly: String,
    types: HashMap<String, TypeInfo>,
}

impl Schema {
    pub fn new(assembly: &str) -> Self {
        Self {
            assembly: assembly.to_string(),
            types: HashMap::new(),
        }
    }
    pub fn from_json(json: &str) -> Result<Schema> {
        let file: SchemaFile = serde_json::from_str(json)?;
        let mut schema = Schema::new(&file.assembly);
        for class in file.classes {
            schema.register_class(&file.namespace, class);
        }
        for def in file.enums {
            schema.register_enum(&file.namespace, def);
        }
        Ok(schema)
    }
    pub fn from_file(path: &Path) -> Result<Schema> {
        Schema::from_json(&std::fs::read_to_string(path)?)
    }
    pub fn register_class(&mut self, namespace: &str, class: ClassDef) -> &mut Self {
        let name = qualify(namespace, class.name());
        self.types.insert(name, TypeInfo::Class(Arc::new(class)));
        self
    }
    pub fn register_enum(&mut self, namespace: &str, def: EnumDef) -> &mut Self {
        let name = qualify(namespace, def.name());
        self.types.insert(name, TypeInfo::Enum(Arc::new(def)));
        self
    }

    fn class_of(&self, object: &ObjectHandle) -> Result<Arc<ClassDef>> {
        Ok(Arc::clone(object.lock()?.class()))
    }
    fn field_type(&self, object: &ObjectHandle, name: &str) -> Result<(Arc<ClassDef>, FieldType)> {
        let class = self.class_of(object)?;
        match class.field_type(name).cloned() {
            Some(field_type) => Ok((class, field_type)),
            None => Err(SeedlingError::Binding {
                class: class.name().to_string(),
                property: name.to_string(),
                message: format!("The property of the entity was not found: {name}"),
            }),
        }
    }
}

pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

impl TypeResolver for Schema {
    fn resolve(&self, assembly: &str, full_name: &str) -> Option<TypeInfo> {
        if !assembly.is_empty() && !self.assembly.is_empty() && assembly != self.assembly {
            return None;
        }
        self.types.get(full_name).cloned()
    }
}

impl ObjectModel for Schema {
    fn instantiate(&self, class_name: &str, class: &Arc<ClassDef>) -> ObjectHandle {
        ObjectHandle::new(Arc::clone(class), class_name)
    }
    fn get_property(&self, object: &ObjectHandle, name: &str) -> Result<Option<Value>> {
        object.get(name)
    }
    fn set_property(&self, object: &ObjectHandle, name: &str, value: Value) -> Result<()> {
        let (class, field_type) = self.field_type(object, name)?;
        if !field_type.accepts(&value) {
            return Err(SeedlingError::Binding {
                class: class.name().to_string(),
                property: name.to_string(),
                message: format!("Value '{value}' does not fit a field of type {field_type:?}"),
            });
        }
        object.put(name, value)
    }
    fn append_to_collection(&self, object: &ObjectHandle, name: &str, value: Value) -> Result<()> {
        let (class, field_type) = self.field_type(object, name)?;
        let binding_error = |message: String| SeedlingError::Binding {
            class: class.name().to_string(),
            property: name.to_string(),
            message,
        };
        let FieldType::Collection { element, .. } = &field_type else {
            return Err(binding_error("The property is not a collection".into()));
        };
        if !element.accepts(&value) {
            return Err(binding_error(format!("Value '{value}' does not fit the collection")));
        }
        let mut guard = object.lock()?;
        match guard.fields.get_mut(name) {
            Some(Value::List(items)) => {
                items.push(value);
                Ok(())
            }
            _ => Err(binding_error("The collection can not be null.".into())),
        }
    }
}
