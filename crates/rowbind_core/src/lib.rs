//! # rowbind core
//!
//! Typed object binding over the rowbind storage engine.
//!
//! This crate provides:
//! - Layout-checked handles wrapping the engine's row, column, table and
//!   session types
//! - Dual-state properties: in-memory until added to a session, then backed
//!   by a row. Scalars, mixed values, lists, sets, dictionaries, links and
//!   embedded objects
//! - Sessions, results and deferred queries
//! - Schedulers confining a session to one thread
//! - Thread-safe references for moving objects between threads
//! - Change notifications delivered on the session's thread
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowbind_core::{Object, Persisted, Property, Session, SessionConfig};
//!
//! #[derive(Default)]
//! struct Person {
//!     name: Persisted<String>,
//!     age: Persisted<i64>,
//! }
//!
//! impl Object for Person {
//!     const NAME: &'static str = "Person";
//!
//!     fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
//!         vec![("name", &mut self.name), ("age", &mut self.age)]
//!     }
//! }
//!
//! let session = Session::open(SessionConfig::new("people").object::<Person>())?;
//! let ada = session.write(|| {
//!     let person = Person::default();
//!     person.name.write("Ada")?;
//!     session.add(person)
//! })?;
//!
//! let _token = ada.observe(|change| {
//!     for property in &change.property_changes {
//!         println!("{} changed", property.name);
//!     }
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
mod error;
mod handoff;
pub mod logger;
mod notifications;
mod object;
mod property;
mod query;
pub mod scheduler;
pub mod schema;
mod session;

pub use bridge::{
    Binary, CapsuleHandle, ColumnId, Decimal128, ObjectId, RowId, SessionHandle, TableId,
    Timestamp, Uuid,
};
pub use error::{CoreError, CoreResult};
pub use handoff::{Handoff, ThreadSafeReference};
pub use logger::{LogLevel, Logger};
pub use notifications::{
    CollectionChange, DictionaryChange, NotificationToken, ObjectChange, PropertyChange,
};
pub use object::{Managed, Object};
pub use property::{
    Embedded, EmbeddedList, Link, LinkList, ManagedSlot, Mixed, Persistable, Persisted,
    PersistedList, PersistedMap, PersistedSet, Property, PropertyValue,
};
pub use query::{Query, Rbool};
pub use scheduler::{Scheduler, SchedulerError};
pub use schema::{
    compile_schema, ObjectSchema, PrimitiveType, PropertyDescriptor, PropertyType, SchemaRegistry,
};
pub use session::{Results, Session, SessionConfig};
