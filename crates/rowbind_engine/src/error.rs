//! Error types for the storage engine.

use crate::keys::{ObjKey, TableKey};
use crate::value::ValueKind;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by an engine session.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error while persisting or loading a file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No table with the given name exists in the file.
    #[error("table not found: {name}")]
    TableNotFound {
        /// Name of the table.
        name: String,
    },

    /// The table key does not belong to this file.
    #[error("unknown table key {table}")]
    UnknownTable {
        /// The key that was looked up.
        table: TableKey,
    },

    /// The column key is invalid for the table it was used with.
    #[error("column {column} not found in table {table}")]
    ColumnNotFound {
        /// Table the column was looked up in.
        table: String,
        /// Column name or raw key.
        column: String,
    },

    /// The row does not exist (never existed or was deleted).
    #[error("row {row} not found in table {table}")]
    RowNotFound {
        /// Table the row was looked up in.
        table: TableKey,
        /// The missing row.
        row: ObjKey,
    },

    /// A mutation was attempted outside a write transaction.
    #[error("not in a write transaction")]
    NotInWriteTransaction,

    /// `begin_write` was called while a write was already active on this session.
    #[error("a write transaction is already active")]
    AlreadyInWriteTransaction,

    /// The session is pinned to a frozen version.
    #[error("session is frozen")]
    FrozenSession,

    /// The session has been closed.
    #[error("session is closed")]
    SessionClosed,

    /// A value of the wrong type was stored into a column.
    #[error("type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Column type.
        expected: ValueKind,
        /// Type of the supplied value (`None` for null/list).
        actual: Option<ValueKind>,
    },

    /// Null was stored into a required column.
    #[error("column {column} is not nullable")]
    NullNotAllowed {
        /// Column name.
        column: String,
    },

    /// A row with the same primary key already exists.
    #[error("duplicate primary key {key} in table {table}")]
    DuplicatePrimaryKey {
        /// Table name.
        table: String,
        /// Rendered primary key value.
        key: String,
    },

    /// Primary key columns cannot be changed after row creation.
    #[error("primary key of table {table} cannot be modified")]
    PrimaryKeyImmutable {
        /// Table name.
        table: String,
    },

    /// A list index was outside the list bounds.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The list length.
        len: usize,
    },

    /// An exported reference was imported into a session of another file.
    #[error("reference belongs to a different file")]
    FileMismatch,

    /// The requested schema conflicts with the schema stored in the file.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the conflict.
        message: String,
    },

    /// Operation not permitted in the current session state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the operation is not allowed.
        message: String,
    },

    /// Encoding a snapshot failed.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// Decoding a snapshot failed.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a schema mismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns true if the error means the referenced row no longer exists.
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, Self::RowNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EngineError::RowNotFound {
            table: TableKey::new(2),
            row: ObjKey::new(7),
        };
        assert_eq!(err.to_string(), "row obj:7 not found in table tbl:2");
        assert!(err.is_row_not_found());
    }

    #[test]
    fn type_mismatch_display() {
        let err = EngineError::TypeMismatch {
            expected: ValueKind::Int,
            actual: Some(ValueKind::String),
        };
        assert_eq!(err.to_string(), "type mismatch: expected Int, got Some(String)");
    }
}
