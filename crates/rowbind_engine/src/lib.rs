//! # rowbind engine
//!
//! Untyped storage collaborator used by the rowbind binding layer.
//!
//! This crate provides:
//! - Raw row, column and table keys
//! - Column values and table descriptions
//! - The [`StorageEngine`] / [`EngineSession`] traits
//! - [`MemoryEngine`], a versioned in-process reference engine
//! - Raw change sets between versions for observers, including per-key
//!   changes for dictionaries

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod engine;
mod error;
mod keys;
mod log;
mod memory;
mod predicate;
mod schema;
mod snapshot;
mod value;

pub use changes::{
    dictionary_changes, list_changes, row_changes, table_changes, IndexSet, RawChangeSet,
};
pub use engine::{
    ChangeCallback, CommitListener, EngineLogLevel, EngineLogSink, EngineSession, ExportedRef,
    ObserveTarget, OpenOptions, StorageEngine,
};
pub use error::{EngineError, EngineResult};
pub use keys::{ColKey, FileId, ObjKey, ObserverId, TableKey, VersionId};
pub use memory::{MemoryEngine, MemorySession};
pub use predicate::{CompareOp, Predicate, SortSpec, TextOp};
pub use schema::{CollectionKind, ColumnSpec, TableInfo, TableSpec};
pub use snapshot::{default_value, Snapshot, Table};
pub use value::{EngineDecimal, EngineObjectId, EngineTimestamp, EngineUuid, EngineValue, ValueKind};
