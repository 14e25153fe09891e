//! Error types for the binding layer.

use crate::scheduler::SchedulerError;
use rowbind_engine::{EngineError, ObjKey, TableKey};
use thiserror::Error;

/// Result type for binding operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced to application code.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Engine failure with no more specific translation.
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// Scheduler rejected work.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The row behind a managed object was deleted.
    #[error("object {row} in table {table} is no longer valid")]
    StaleRow {
        /// Table of the row.
        table: TableKey,
        /// The deleted row.
        row: ObjKey,
    },

    /// The session has been closed.
    #[error("session is closed")]
    SessionClosed,

    /// A managed value was written outside a write transaction.
    #[error("cannot modify managed objects outside of a write transaction")]
    NotInWriteTransaction,

    /// A write transaction is already active.
    #[error("the session is already in a write transaction")]
    AlreadyInWriteTransaction,

    /// The session is frozen.
    #[error("frozen sessions cannot be modified")]
    FrozenSession,

    /// A session or managed value was used off its confined thread.
    #[error("session accessed from incorrect thread")]
    WrongThread,

    /// A capsule was resolved against a session of another file.
    #[error("incompatible session: {message}")]
    IncompatibleSession {
        /// Why the session cannot resolve the capsule.
        message: String,
    },

    /// A capsule was resolved a second time.
    #[error("thread safe reference has already been resolved")]
    CapsuleAlreadyResolved,

    /// The object type is not part of the session schema.
    #[error("object type {name} is not part of the schema")]
    SchemaNotFound {
        /// Object type name.
        name: String,
    },

    /// The property does not exist on the object type.
    #[error("property {property} not found on {object}")]
    PropertyNotFound {
        /// Object type name.
        object: String,
        /// Property name.
        property: String,
    },

    /// A stored value could not be converted into the requested type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Requested type.
        expected: String,
        /// Stored value description.
        actual: String,
    },

    /// An object with the same primary key exists.
    #[error("object of type {object} with primary key {key} already exists")]
    DuplicatePrimaryKey {
        /// Object type name.
        object: String,
        /// Rendered key.
        key: String,
    },

    /// A live value was requested from a property in a query context.
    #[error("property values are not available while building a query")]
    QueryContext,

    /// A list index was outside the list bounds.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Collection length.
        len: usize,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a schema not found error.
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::SchemaNotFound { name: name.into() }
    }

    /// Creates a property not found error.
    pub fn property_not_found(object: impl Into<String>, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            object: object.into(),
            property: property.into(),
        }
    }

    /// Returns true for errors caused by a deleted row or closed session.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRow { .. } | Self::SessionClosed)
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::RowNotFound { table, row } => Self::StaleRow { table, row },
            EngineError::SessionClosed => Self::SessionClosed,
            EngineError::NotInWriteTransaction => Self::NotInWriteTransaction,
            EngineError::AlreadyInWriteTransaction => Self::AlreadyInWriteTransaction,
            EngineError::FrozenSession => Self::FrozenSession,
            EngineError::DuplicatePrimaryKey { table, key } => Self::DuplicatePrimaryKey {
                object: table,
                key,
            },
            EngineError::IndexOutOfBounds { index, len } => Self::IndexOutOfBounds { index, len },
            EngineError::FileMismatch => Self::IncompatibleSession {
                message: "the reference belongs to a different file".to_string(),
            },
            other => Self::Engine(other),
        }
    }
}
