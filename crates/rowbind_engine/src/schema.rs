//! Table and column descriptions handed to the engine when a file is opened.

use crate::keys::{ColKey, TableKey};
use crate::value::ValueKind;
use serde::{Deserialize, Serialize};

/// Shape of the values a column holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// One value per row.
    #[default]
    Single,
    /// Ordered elements, duplicates allowed.
    List,
    /// Distinct elements kept in value order.
    Set,
    /// Values keyed by string.
    Dictionary,
}

/// Description of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, unique within its table.
    pub name: String,
    /// Element kind.
    pub kind: ValueKind,
    /// Whether null is accepted.
    pub nullable: bool,
    /// Whether the column holds one value or a collection of `kind`.
    pub collection: CollectionKind,
    /// Target table for link columns.
    pub link_target: Option<String>,
    /// Whether this column is the table's primary key.
    pub primary_key: bool,
}

impl ColumnSpec {
    /// Creates a required scalar column.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            collection: CollectionKind::Single,
            link_target: None,
            primary_key: false,
        }
    }

    /// Creates a link column to `target`. Links are always nullable.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Link,
            nullable: true,
            collection: CollectionKind::Single,
            link_target: Some(target.into()),
            primary_key: false,
        }
    }

    /// Marks the column nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Creates a mixed column. Mixed columns always accept null.
    pub fn mixed(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Mixed).nullable()
    }

    /// Marks the column as a list.
    #[must_use]
    pub fn list(mut self) -> Self {
        self.collection = CollectionKind::List;
        self
    }

    /// Marks the column as a set.
    #[must_use]
    pub fn set(mut self) -> Self {
        self.collection = CollectionKind::Set;
        self
    }

    /// Marks the column as a dictionary.
    #[must_use]
    pub fn dictionary(mut self) -> Self {
        self.collection = CollectionKind::Dictionary;
        self
    }

    /// Returns true for list and set columns, which store an element vector.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self.collection, CollectionKind::List | CollectionKind::Set)
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Description of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnSpec>,
    /// Embedded tables hold rows owned by exactly one parent link.
    pub embedded: bool,
}

impl TableSpec {
    /// Creates a top-level table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            embedded: false,
        }
    }

    /// Creates an embedded table with no columns.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            embedded: true,
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Index of the primary key column, if any.
    #[must_use]
    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.primary_key)
    }

    /// Index of the named column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Resolved table metadata returned by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table key.
    pub key: TableKey,
    /// Table name.
    pub name: String,
    /// Whether rows are embedded.
    pub embedded: bool,
    /// Column names and keys in declaration order.
    pub columns: Vec<(String, ColKey)>,
    /// Primary key column, if any.
    pub primary_key: Option<ColKey>,
}

impl TableInfo {
    /// Looks up a column key by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<ColKey> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, key)| *key)
    }

    /// Looks up a column name by key.
    #[must_use]
    pub fn column_name(&self, key: ColKey) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(name, _)| name.as_str())
    }
}
