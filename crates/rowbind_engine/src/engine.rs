//! The engine collaborator surface.
//!
//! The binding layer only ever talks to storage through these traits. The
//! crate ships [`MemoryEngine`](crate::MemoryEngine) as the reference
//! implementation.

use crate::changes::RawChangeSet;
use crate::error::EngineResult;
use crate::keys::{ColKey, FileId, ObjKey, ObserverId, TableKey, VersionId};
use crate::predicate::{Predicate, SortSpec};
use crate::schema::{TableInfo, TableSpec};
use crate::value::EngineValue;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Callback receiving raw change sets for one observer.
pub type ChangeCallback = Box<dyn FnMut(&RawChangeSet) + Send>;

/// Called after any session of the same file commits.
pub type CommitListener = Arc<dyn Fn(VersionId) + Send + Sync>;

/// Severity of an engine log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineLogLevel {
    /// Very verbose tracing.
    Trace,
    /// Debugging output.
    Debug,
    /// Detailed operational output.
    Detail,
    /// Informational.
    Info,
    /// Warnings.
    Warn,
    /// Errors.
    Error,
    /// Unrecoverable errors.
    Fatal,
}

/// Sink receiving engine log lines.
pub type EngineLogSink = Arc<dyn Fn(EngineLogLevel, &str) + Send + Sync>;

/// What an observer or exported reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserveTarget {
    /// A single row.
    Row {
        /// Table of the row.
        table: TableKey,
        /// The row.
        row: ObjKey,
    },
    /// The rows of a table, optionally filtered and sorted.
    Table {
        /// The table.
        table: TableKey,
        /// Row filter.
        predicate: Option<Predicate>,
        /// Row order.
        sort: Option<SortSpec>,
    },
    /// A list or set column of one row.
    List {
        /// Table of the owning row.
        table: TableKey,
        /// Owning row.
        row: ObjKey,
        /// The list or set column.
        column: ColKey,
    },
    /// A dictionary column of one row.
    Dictionary {
        /// Table of the owning row.
        table: TableKey,
        /// Owning row.
        row: ObjKey,
        /// The dictionary column.
        column: ColKey,
    },
}

/// A reference detached from its session so it can cross threads.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedRef {
    /// File the reference was taken from.
    pub file: FileId,
    /// Version the exporting session was at.
    pub version: VersionId,
    /// The referenced entity.
    pub target: ObserveTarget,
}

/// Options for opening a file.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Identity of the file. Sessions opened with the same path share data.
    pub path: PathBuf,
    /// Tables that must exist after opening.
    pub tables: Vec<TableSpec>,
    /// Persist committed versions to `path`.
    pub durable: bool,
}

impl OpenOptions {
    /// Creates in-memory options for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tables: Vec::new(),
            durable: false,
        }
    }

    /// Sets the table specs.
    #[must_use]
    pub fn tables(mut self, tables: Vec<TableSpec>) -> Self {
        self.tables = tables;
        self
    }

    /// Enables persistence.
    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }
}

/// A storage engine able to open sessions on files.
pub trait StorageEngine: Send + Sync {
    /// Opens a new session on the file named by `options.path`.
    fn open(&self, options: &OpenOptions) -> EngineResult<Arc<dyn EngineSession>>;

    /// Installs or removes the log sink.
    fn set_log_sink(&self, sink: Option<EngineLogSink>);
}

/// One open session on a file.
///
/// A session reads from a pinned version until it is refreshed, begins a
/// write, or commits. Writes are visible to the session immediately and to
/// other sessions after commit and their own refresh.
pub trait EngineSession: Send + Sync {
    /// Identity of the underlying file.
    fn file_id(&self) -> FileId;
    /// Version the session currently reads.
    fn version(&self) -> VersionId;
    /// Latest committed version of the file.
    fn latest_version(&self) -> VersionId;

    /// Returns true while a write transaction is active.
    fn is_in_write(&self) -> bool;
    /// Starts a write transaction, waiting for other writers on the file.
    fn begin_write(&self) -> EngineResult<()>;
    /// Commits the active write and returns the new version.
    fn commit_write(&self) -> EngineResult<VersionId>;
    /// Discards the active write.
    fn cancel_write(&self) -> EngineResult<()>;
    /// Advances to the latest version. Returns true if the version changed.
    fn refresh(&self) -> EngineResult<bool>;

    /// Returns a read-only session pinned to the current version.
    fn freeze(&self) -> EngineResult<Arc<dyn EngineSession>>;
    /// Returns true for frozen sessions.
    fn is_frozen(&self) -> bool;
    /// Closes the session. Idempotent.
    fn close(&self);
    /// Returns true once closed.
    fn is_closed(&self) -> bool;

    /// Looks up a table by name.
    fn table(&self, name: &str) -> EngineResult<TableInfo>;
    /// Creates a row.
    fn create_row(&self, table: TableKey, primary_key: Option<EngineValue>) -> EngineResult<ObjKey>;
    /// Deletes a row.
    fn delete_row(&self, table: TableKey, row: ObjKey) -> EngineResult<()>;
    /// Returns true if the row exists in the current version.
    fn row_exists(&self, table: TableKey, row: ObjKey) -> EngineResult<bool>;
    /// Finds a row by primary key.
    fn find_by_primary_key(&self, table: TableKey, key: &EngineValue) -> EngineResult<Option<ObjKey>>;
    /// Reads a column.
    fn get_value(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<EngineValue>;
    /// Writes a column.
    fn set_value(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: EngineValue,
    ) -> EngineResult<()>;
    /// Adds to an integer column.
    fn add_int(&self, table: TableKey, row: ObjKey, column: ColKey, delta: i64) -> EngineResult<i64>;

    /// Length of a list column.
    fn list_len(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<usize>;
    /// Reads a list element.
    fn list_get(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue>;
    /// Replaces a list element.
    fn list_set(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()>;
    /// Inserts a list element.
    fn list_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()>;
    /// Removes a list element.
    fn list_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue>;
    /// Clears a list or set.
    fn list_clear(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<()>;

    /// Position of a value in a set column.
    fn set_find(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>>;
    /// Adds a value to a set. Returns its position and whether it was new.
    fn set_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: EngineValue,
    ) -> EngineResult<(usize, bool)>;
    /// Removes a value from a set and returns its former position.
    fn set_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>>;

    /// Number of entries in a dictionary column.
    fn dictionary_len(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<usize>;
    /// Keys of a dictionary in ascending order.
    fn dictionary_keys(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<Vec<String>>;
    /// Reads one dictionary entry.
    fn dictionary_get(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>>;
    /// Writes one dictionary entry and returns the value it replaced.
    fn dictionary_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: String,
        value: EngineValue,
    ) -> EngineResult<Option<EngineValue>>;
    /// Removes one dictionary entry.
    fn dictionary_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>>;
    /// Removes every dictionary entry.
    fn dictionary_clear(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<()>;

    /// Rows of a table in the current version.
    fn rows(
        &self,
        table: TableKey,
        predicate: Option<&Predicate>,
        sort: Option<&SortSpec>,
    ) -> EngineResult<Vec<ObjKey>>;

    /// Detaches a reference from this session.
    fn export(&self, target: ObserveTarget) -> EngineResult<ExportedRef>;
    /// Re-attaches an exported reference, advancing to its version if needed.
    fn import(&self, exported: &ExportedRef) -> EngineResult<ObserveTarget>;

    /// Registers an observer. Its baseline is the session's current version.
    fn add_observer(&self, target: ObserveTarget, callback: ChangeCallback) -> EngineResult<ObserverId>;
    /// Removes an observer. Unknown ids are ignored.
    fn remove_observer(&self, id: ObserverId);
    /// Delivers changes between each observer's baseline and the current
    /// version. Returns the number of callbacks invoked.
    fn deliver_pending(&self) -> usize;
    /// Installs the listener called after commits on this file.
    fn set_commit_listener(&self, listener: Option<CommitListener>);
}

impl fmt::Debug for dyn EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession")
            .field("file", &self.file_id())
            .field("version", &self.version())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
