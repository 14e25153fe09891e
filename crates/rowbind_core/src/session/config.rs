//! Session configuration.

use crate::object::Object;
use crate::scheduler::Scheduler;
use crate::schema::ObjectSchema;
use rowbind_engine::StorageEngine;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for opening a [`Session`](crate::Session).
#[derive(Clone)]
pub struct SessionConfig {
    /// Identity of the file. Sessions with the same path share data.
    pub path: PathBuf,

    /// Scheduler the session is confined to. `None` uses
    /// [`make_default`](crate::scheduler::make_default).
    pub scheduler: Option<Arc<dyn Scheduler>>,

    /// Object schemas. Empty means every schema in the global registry.
    pub schema: Vec<ObjectSchema>,

    /// Storage engine. `None` uses the process-wide memory engine.
    pub engine: Option<Arc<dyn StorageEngine>>,

    /// Persist committed versions to `path`.
    pub durable: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("default.rowbind"),
            scheduler: None,
            schema: Vec::new(),
            engine: None,
            durable: false,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration for `path` with default values.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the scheduler.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Replaces the object schemas.
    #[must_use]
    pub fn schema(mut self, schema: Vec<ObjectSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Adds the schema of `T`.
    #[must_use]
    pub fn object<T: Object>(mut self) -> Self {
        self.schema.push(T::schema());
        self
    }

    /// Sets the storage engine.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn StorageEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets whether committed versions are persisted.
    #[must_use]
    pub const fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("path", &self.path)
            .field("scheduler", &self.scheduler.as_ref().map(|s| s.id()))
            .field(
                "schema",
                &self.schema.iter().map(|s| s.name).collect::<Vec<_>>(),
            )
            .field("engine", &self.engine.is_some())
            .field("durable", &self.durable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PrimitiveType, PropertyDescriptor, PropertyType};

    #[test]
    fn builder() {
        let config = SessionConfig::new("people.rowbind")
            .schema(vec![ObjectSchema::new("Person").property(
                PropertyDescriptor::new("name", PropertyType::Primitive(PrimitiveType::String)),
            )])
            .durable(true);
        assert_eq!(config.path, PathBuf::from("people.rowbind"));
        assert_eq!(config.schema.len(), 1);
        assert!(config.durable);
        assert!(config.scheduler.is_none());
        assert!(format!("{config:?}").contains("Person"));
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert!(config.schema.is_empty());
        assert!(config.engine.is_none());
        assert!(!config.durable);
    }
}
