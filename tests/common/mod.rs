#![allow(dead_code)]

use std::sync::Arc;

use seedling::construct::{ObjectStore, SessionMode, StoreConstructor};
use seedling::datatype::TypedValue;
use seedling::document::Node;
use seedling::element::RootConfig;
use seedling::error::{Result, SeedlingError};
use seedling::model::{Identity, ObjectHandle, Schema, Value};

pub const SHOP_SCHEMA: &str = r#"{
    "namespace": "Shop",
    "classes": [
        { "name": "Customer", "fields": {
            "Id": "Int32", "Name": "String", "Code": "String", "Age": "Int32",
            "Orders": "List<Order>", "Tags": "List<String>?" } },
        { "name": "Order", "fields": {
            "Id": "Int32", "Number": "String", "Customer": "Customer",
            "CustomerCode": "String", "Status": "Enum.Status", "Total": "Decimal" } },
        { "name": "Article", "fields": { "Id": "Int32", "Code": "String" } }
    ],
    "enums": [ { "name": "Status", "members": ["Open", "Closed"] } ]
}"#;

pub fn shop() -> Arc<Schema> {
    Arc::new(Schema::from_json(SHOP_SCHEMA).unwrap())
}

pub fn build(schema: &Arc<Schema>, text: &str) -> RootConfig {
    RootConfig::build(&Node::parse(text).unwrap(), schema.clone()).unwrap()
}

pub fn text(object: &ObjectHandle, field: &str) -> String {
    match object.get(field).unwrap() {
        Some(Value::Scalar(TypedValue::String(s))) => s,
        other => panic!("field {field} is not a string: {other:?}"),
    }
}

pub fn int(object: &ObjectHandle, field: &str) -> i64 {
    match object.get(field).unwrap() {
        Some(Value::Scalar(TypedValue::Int(i))) => i,
        other => panic!("field {field} is not an integer: {other:?}"),
    }
}

/// Store double recording every call.
#[derive(Default)]
pub struct RecordingStore {
    pub events: Vec<String>,
    pub saved: Vec<ObjectHandle>,
    /// Returned by every query.
    pub canned: Option<ObjectHandle>,
    /// Saving an object of this class fails.
    pub fail_class: Option<String>,
    next: Identity,
}

impl RecordingStore {
    pub fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| e.as_str() == event).count()
    }
}

impl ObjectStore for RecordingStore {
    fn open_session(&mut self) -> Result<()> {
        self.events.push("open".into());
        Ok(())
    }
    fn close_session(&mut self) -> Result<()> {
        self.events.push("close".into());
        Ok(())
    }
    fn abandon_session(&mut self) -> Result<()> {
        self.events.push("abandon".into());
        Ok(())
    }
    fn save(&mut self, object: &ObjectHandle) -> Result<Identity> {
        let class = object.class_name()?;
        if self.fail_class.as_deref() == Some(class.as_str()) {
            return Err(SeedlingError::Store("disk full".into()));
        }
        self.events.push(format!("save {class}"));
        self.next += 1;
        self.saved.push(object.clone());
        Ok(self.next)
    }
    fn update(&mut self, object: &ObjectHandle) -> Result<()> {
        self.events.push(format!("update {}", object.class_name()?));
        Ok(())
    }
    fn query_first(&mut self, query: &str) -> Result<Option<ObjectHandle>> {
        self.events.push(format!("query {query}"));
        Ok(self.canned.clone())
    }
}

pub fn recording(schema: &Arc<Schema>, mode: SessionMode) -> StoreConstructor<Schema, RecordingStore> {
    StoreConstructor::new(schema.clone(), RecordingStore::default(), mode)
}
