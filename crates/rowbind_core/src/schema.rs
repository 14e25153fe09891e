//! Object schemas and the process-wide schema registry.
//!
//! An [`ObjectSchema`] is plain data: a name and an ordered list of
//! [`PropertyDescriptor`]s. [`compile_schema`] turns a set of them into the
//! engine's table specs. The [`SchemaRegistry`] is append-only; schemas are
//! registered at startup, before the first session opens, and never change
//! afterwards.

use crate::error::{CoreError, CoreResult};
use crate::object::Object;
use parking_lot::Mutex;
use rowbind_engine::{ColumnSpec, TableSpec, ValueKind};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// Scalar property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// `bool`
    Bool,
    /// `i64` and narrower integers
    Int,
    /// `f64`
    Double,
    /// `String`
    String,
    /// [`Binary`](crate::Binary)
    Binary,
    /// [`Timestamp`](crate::Timestamp)
    Timestamp,
    /// [`Uuid`](crate::Uuid)
    Uuid,
    /// [`ObjectId`](crate::ObjectId)
    ObjectId,
    /// [`Decimal128`](crate::Decimal128)
    Decimal,
    /// [`Mixed`](crate::Mixed), any of the above per value. Always nullable.
    Mixed,
}

impl PrimitiveType {
    /// The engine value kind storing this type.
    #[must_use]
    pub const fn kind(self) -> ValueKind {
        match self {
            Self::Bool => ValueKind::Bool,
            Self::Int => ValueKind::Int,
            Self::Double => ValueKind::Double,
            Self::String => ValueKind::String,
            Self::Binary => ValueKind::Binary,
            Self::Timestamp => ValueKind::Timestamp,
            Self::Uuid => ValueKind::Uuid,
            Self::ObjectId => ValueKind::ObjectId,
            Self::Decimal => ValueKind::Decimal,
            Self::Mixed => ValueKind::Mixed,
        }
    }

    /// Lower-case type name used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::ObjectId => "object id",
            Self::Decimal => "decimal",
            Self::Mixed => "mixed",
        }
    }

    /// Whether a primary key may have this type.
    #[must_use]
    pub const fn is_primary_key_type(self) -> bool {
        matches!(self, Self::Int | Self::String | Self::Uuid | Self::ObjectId)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type tag of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Required scalar.
    Primitive(PrimitiveType),
    /// Nullable scalar.
    Optional(PrimitiveType),
    /// Ordered list of scalars.
    List {
        /// Element type.
        element: PrimitiveType,
        /// Whether elements may be null.
        nullable: bool,
    },
    /// Unordered set of distinct scalars.
    Set {
        /// Element type.
        element: PrimitiveType,
        /// Whether null is a member.
        nullable: bool,
    },
    /// Scalars keyed by string.
    Dictionary {
        /// Value type.
        element: PrimitiveType,
        /// Whether values may be null.
        nullable: bool,
    },
    /// Link to a top-level object of the named type.
    Link(&'static str),
    /// Owned embedded object of the named type.
    Embedded(&'static str),
    /// Ordered list of links to top-level objects of the named type.
    LinkList(&'static str),
    /// Ordered list of owned embedded objects of the named type.
    EmbeddedList(&'static str),
}

fn optional_mark(element: PrimitiveType, nullable: bool) -> &'static str {
    if nullable && element != PrimitiveType::Mixed {
        "?"
    } else {
        ""
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => write!(f, "{p}"),
            Self::Optional(p) => write!(f, "{p}?"),
            Self::List { element, nullable } => {
                write!(f, "list<{element}{}>", optional_mark(*element, *nullable))
            }
            Self::Set { element, nullable } => {
                write!(f, "set<{element}{}>", optional_mark(*element, *nullable))
            }
            Self::Dictionary { element, nullable } => {
                write!(f, "dictionary<{element}{}>", optional_mark(*element, *nullable))
            }
            Self::Link(target) => write!(f, "link<{target}>"),
            Self::Embedded(target) => write!(f, "embedded<{target}>"),
            Self::LinkList(target) => write!(f, "list<link<{target}>>"),
            Self::EmbeddedList(target) => write!(f, "list<embedded<{target}>>"),
        }
    }
}

/// One property of an object schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyDescriptor {
    /// Property name, unique within the schema.
    pub name: &'static str,
    /// Type tag.
    pub property_type: PropertyType,
    /// Whether this is the primary key.
    pub primary_key: bool,
}

impl PropertyDescriptor {
    /// Creates a non-key property.
    #[must_use]
    pub const fn new(name: &'static str, property_type: PropertyType) -> Self {
        Self {
            name,
            property_type,
            primary_key: false,
        }
    }

    /// Marks the property as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Schema of one object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    /// Object type name, unique within a session.
    pub name: &'static str,
    /// Properties in declaration order.
    pub properties: Vec<PropertyDescriptor>,
    /// Embedded objects only exist inside their owning object.
    pub embedded: bool,
}

impl ObjectSchema {
    /// Creates an empty top-level schema.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: Vec::new(),
            embedded: false,
        }
    }

    /// Creates an empty embedded schema.
    #[must_use]
    pub fn embedded(name: &'static str) -> Self {
        Self {
            embedded: true,
            ..Self::new(name)
        }
    }

    /// Appends a property.
    #[must_use]
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// The primary key property, if any.
    #[must_use]
    pub fn primary_key(&self) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.primary_key)
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property_named(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Scalar column, nullable on request. Mixed columns always are.
fn scalar_column(name: &str, element: PrimitiveType, nullable: bool) -> ColumnSpec {
    match element {
        PrimitiveType::Mixed => ColumnSpec::mixed(name),
        _ if nullable => ColumnSpec::new(name, element.kind()).nullable(),
        _ => ColumnSpec::new(name, element.kind()),
    }
}

fn column_for(property: &PropertyDescriptor) -> ColumnSpec {
    let name = property.name;
    let column = match property.property_type {
        PropertyType::Primitive(p) => scalar_column(name, p, false),
        PropertyType::Optional(p) => scalar_column(name, p, true),
        PropertyType::List { element, nullable } => scalar_column(name, element, nullable).list(),
        PropertyType::Set { element, nullable } => scalar_column(name, element, nullable).set(),
        PropertyType::Dictionary { element, nullable } => {
            scalar_column(name, element, nullable).dictionary()
        }
        PropertyType::Link(target) | PropertyType::Embedded(target) => {
            ColumnSpec::link(name, target)
        }
        PropertyType::LinkList(target) | PropertyType::EmbeddedList(target) => {
            ColumnSpec::link(name, target).list()
        }
    };
    if property.primary_key {
        column.primary_key()
    } else {
        column
    }
}

fn check_schema(schema: &ObjectSchema, all: &[ObjectSchema]) -> CoreResult<()> {
    let mut names = HashSet::new();
    for property in &schema.properties {
        if !names.insert(property.name) {
            return Err(CoreError::invalid_operation(format!(
                "duplicate property {} on {}",
                property.name, schema.name
            )));
        }
    }

    let keys: Vec<_> = schema.properties.iter().filter(|p| p.primary_key).collect();
    if keys.len() > 1 {
        return Err(CoreError::invalid_operation(format!(
            "{} declares more than one primary key",
            schema.name
        )));
    }
    if let Some(key) = keys.first() {
        if schema.embedded {
            return Err(CoreError::invalid_operation(format!(
                "embedded object {} cannot have a primary key",
                schema.name
            )));
        }
        let valid = match key.property_type {
            PropertyType::Primitive(p) | PropertyType::Optional(p) => p.is_primary_key_type(),
            _ => false,
        };
        if !valid {
            return Err(CoreError::invalid_operation(format!(
                "property {}.{} of type {} cannot be a primary key",
                schema.name, key.name, key.property_type
            )));
        }
    }

    for property in &schema.properties {
        let (target, embedded) = match property.property_type {
            PropertyType::Link(target) | PropertyType::LinkList(target) => (target, false),
            PropertyType::Embedded(target) | PropertyType::EmbeddedList(target) => (target, true),
            _ => continue,
        };
        let Some(target_schema) = all.iter().find(|s| s.name == target) else {
            return Err(CoreError::invalid_operation(format!(
                "property {}.{} links to unknown type {target}",
                schema.name, property.name
            )));
        };
        if target_schema.embedded != embedded {
            let expected = if embedded { "an embedded" } else { "a top-level" };
            return Err(CoreError::invalid_operation(format!(
                "property {}.{} must target {expected} object, {target} is not",
                schema.name, property.name
            )));
        }
    }
    Ok(())
}

/// Compiles object schemas into engine table specs.
///
/// Every link and embedded target must be part of `schemas`; a schema has
/// at most one primary key, of type int, string, uuid or object id, and
/// embedded schemas have none.
pub fn compile_schema(schemas: &[ObjectSchema]) -> CoreResult<Vec<TableSpec>> {
    let mut names = HashSet::new();
    for schema in schemas {
        if !names.insert(schema.name) {
            return Err(CoreError::invalid_operation(format!(
                "object type {} declared twice",
                schema.name
            )));
        }
    }

    schemas
        .iter()
        .map(|schema| {
            check_schema(schema, schemas)?;
            let table = if schema.embedded {
                TableSpec::embedded(schema.name)
            } else {
                TableSpec::new(schema.name)
            };
            Ok(schema
                .properties
                .iter()
                .fold(table, |table, property| table.column(column_for(property))))
        })
        .collect()
}

/// Append-only table of declared schemas.
///
/// # Example
///
/// ```rust,ignore
/// SchemaRegistry::global().register_object::<Person>()?;
/// SchemaRegistry::global().register_object::<Dog>()?;
/// let session = Session::open(SessionConfig::new("people"))?;
/// ```
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Mutex<Vec<ObjectSchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry consulted by sessions opened without an
    /// explicit schema.
    pub fn global() -> &'static SchemaRegistry {
        static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SchemaRegistry::new)
    }

    /// Registers a schema.
    ///
    /// Registering an identical schema again is a no-op; a different schema
    /// under an existing name is rejected.
    pub fn register(&self, schema: ObjectSchema) -> CoreResult<()> {
        let mut schemas = self.schemas.lock();
        if let Some(existing) = schemas.iter().find(|s| s.name == schema.name) {
            if *existing == schema {
                return Ok(());
            }
            return Err(CoreError::invalid_operation(format!(
                "a different schema named {} is already registered",
                schema.name
            )));
        }
        tracing::debug!(object = schema.name, properties = schema.properties.len(), "registered schema");
        schemas.push(schema);
        Ok(())
    }

    /// Registers the schema of `T`.
    pub fn register_object<T: Object>(&self) -> CoreResult<()> {
        self.register(T::schema())
    }

    /// Looks up a schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ObjectSchema> {
        self.schemas.lock().iter().find(|s| s.name == name).cloned()
    }

    /// All registered schemas in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<ObjectSchema> {
        self.schemas.lock().clone()
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.lock().is_empty()
    }
}
