//! Seedling – a document-driven object graph seeder.
//!
//! A *data document* declares the objects to create, how they reference each
//! other and which parts repeat:
//! * An [`element::Entity`] describes one object of a class, with typed
//!   properties. A non-empty `ref` names the object for later use.
//! * A [`element::Sequence`] repeats its children for every counter in
//!   `[min, max]`, substituting counter and random-data tokens first.
//! * A [`element::Load`] names an object already present in the store.
//! * A [`element::Folder`] only groups.
//!
//! Reference properties (`name` or `name.subproperty`) resolve against the
//! objects named so far in the same run.
//!
//! ## Modules
//! * [`datatype`] – Declared value kinds and coercion of raw text into typed values.
//! * [`document`] – The canonical text form: parser (`document.pest`) and renderer.
//! * [`element`] – The element model built from a document.
//! * [`template`] – Token substitution and progress reporting for sequences.
//! * [`reference`] – The run-scoped table of named objects.
//! * [`model`] – Object model capabilities and the JSON schema registry.
//! * [`construct`] – The construction capability and its store-backed implementation.
//! * [`persist`] – SQLite object store.
//! * [`execute`] – The execution driver.
//! * [`settings`] – Settings of the binary.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use seedling::construct::{SessionMode, StoreConstructor};
//! use seedling::document::Node;
//! use seedling::element::RootConfig;
//! use seedling::execute::Runner;
//! use seedling::model::Schema;
//! use seedling::persist::{PersistenceMode, SqliteStore};
//!
//! let schema = Arc::new(Schema::from_json(
//!     r#"{ "namespace": "Shop", "classes": [ { "name": "Customer", "fields": { "Id": "Int32", "Name": "String" } } ] }"#,
//! ).unwrap());
//! let node = Node::parse(r#"
//!     <data-config namespace="Shop">
//!       <sequence min="1" max="3">
//!         <entity class="Customer"><property name="Name">[#RandomWord]-[$sequence]</property></entity>
//!       </sequence>
//!     </data-config>"#).unwrap();
//! let mut root = RootConfig::build(&node, schema.clone()).unwrap();
//! let store = SqliteStore::open(&PersistenceMode::InMemory, schema.clone()).unwrap();
//! let mut constructor = StoreConstructor::new(schema, store, SessionMode::PerRun);
//! let summary = Runner::new().attach(&mut constructor).run(&mut root).unwrap();
//! assert_eq!(summary.entities, 3);
//! assert_eq!(constructor.store().saved_count(), 3);
//! ```

pub mod construct;
pub mod datatype;
pub mod document;
pub mod element;
pub mod error;
pub mod execute;
pub mod model;
pub mod persist;
pub mod reference;
pub mod settings;
pub mod template;
