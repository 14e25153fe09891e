//! Engine key types.
//!
//! Keys are plain integers assigned by the engine. A key built from an
//! arbitrary raw integer is always constructible; invalid keys are detected
//! when they are used.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a row within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjKey(pub i64);

impl ObjKey {
    /// The null key. Never assigned to a row.
    pub const NULL: ObjKey = ObjKey(-1);

    /// Creates a row key from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true if the key could name a row.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Identifier of a table within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey(pub u32);

impl TableKey {
    /// Creates a table key.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tbl:{}", self.0)
    }
}

/// Identifier of a column.
///
/// The upper 32 bits hold the owning table key and the lower 32 bits the
/// column index, so a column key used against the wrong table is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColKey(pub i64);

impl ColKey {
    /// The null key.
    pub const NULL: ColKey = ColKey(-1);

    /// Builds the key of column `index` in `table`.
    #[must_use]
    pub const fn from_parts(table: TableKey, index: u32) -> Self {
        Self(((table.0 as i64) << 32) | index as i64)
    }

    /// Creates a column key from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true unless this is the null key.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The table this column belongs to.
    #[must_use]
    pub const fn table(self) -> TableKey {
        TableKey((self.0 >> 32) as u32)
    }

    /// Position of the column within its table.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }
}

impl fmt::Display for ColKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}.{}", self.table().0, self.index())
    }
}

/// Monotonic version of a file. Every commit produces the next version.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionId(pub u64);

impl VersionId {
    /// Creates a version id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the version following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identity of one open storage file inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u64);

/// Handle to an observer registered on an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);
