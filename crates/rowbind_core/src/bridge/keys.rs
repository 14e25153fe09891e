//! Row, column and table identifiers.

use crate::layout_check;
use rowbind_engine::{ColKey, ObjKey, TableKey};
use std::fmt;

/// Identifier of one persisted object within its table.
///
/// Any raw integer produces a `RowId`; negative values are recognizably
/// invalid and rejected when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RowId(ObjKey);

impl RowId {
    /// The invalid row id.
    pub const INVALID: RowId = RowId(ObjKey::NULL);

    /// Creates a row id from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(ObjKey::new(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0.value()
    }

    /// Returns true if the id could name a row.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.is_valid()
    }
}

impl From<ObjKey> for RowId {
    fn from(key: ObjKey) -> Self {
        Self(key)
    }
}

impl From<RowId> for ObjKey {
    fn from(id: RowId) -> Self {
        id.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0.value())
    }
}

/// Identifier of one column. Stable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ColumnId(ColKey);

impl ColumnId {
    /// The invalid column id.
    pub const INVALID: ColumnId = ColumnId(ColKey::NULL);

    /// Creates a column id from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(ColKey::new(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0.value()
    }

    /// Returns true unless this is [`ColumnId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.is_valid()
    }

    /// The table owning this column.
    #[must_use]
    pub const fn table(self) -> TableId {
        TableId(self.0.table())
    }
}

impl From<ColKey> for ColumnId {
    fn from(key: ColKey) -> Self {
        Self(key)
    }
}

impl From<ColumnId> for ColKey {
    fn from(id: ColumnId) -> Self {
        id.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TableId(TableKey);

impl TableId {
    /// Creates a table id from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(TableKey::new(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0.value()
    }
}

impl From<TableKey> for TableId {
    fn from(key: TableKey) -> Self {
        Self(key)
    }
}

impl From<TableId> for TableKey {
    fn from(id: TableId) -> Self {
        id.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(all(target_pointer_width = "64", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod pinned {
    use super::*;

    layout_check!(RowId, ObjKey, size = 8, align = 8);
    layout_check!(ColumnId, ColKey, size = 8, align = 8);
    layout_check!(TableId, TableKey, size = 4, align = 4);
}

layout_check!(RowId, ObjKey);
layout_check!(ColumnId, ColKey);
layout_check!(TableId, TableKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_ids_are_constructible() {
        let row = RowId::new(-5);
        assert!(!row.is_valid());
        assert!(!RowId::INVALID.is_valid());
        assert!(RowId::new(0).is_valid());
        assert!(!ColumnId::INVALID.is_valid());
    }

    #[test]
    fn conversions_round_trip() {
        let key = ColKey::from_parts(TableKey::new(4), 2);
        let id = ColumnId::from(key);
        assert_eq!(ColKey::from(id), key);
        assert_eq!(id.table(), TableId::new(4));
        assert_eq!(ObjKey::from(RowId::new(9)), ObjKey::new(9));
    }

    #[test]
    fn display() {
        assert_eq!(RowId::new(3).to_string(), "row:3");
        assert_eq!(TableId::new(1).to_string(), "tbl:1");
    }
}
