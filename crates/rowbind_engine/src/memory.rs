//! In-process reference engine.
//!
//! Every path names one shared file. Sessions on the same file read
//! immutable [`Snapshot`]s and serialize their writes through a per-file
//! writer lock. Durable files are persisted as CBOR on every commit.

use crate::changes::{dictionary_changes, list_changes, row_changes, table_changes, RawChangeSet};
use crate::engine::{
    ChangeCallback, CommitListener, EngineLogLevel, EngineLogSink, EngineSession, ExportedRef,
    ObserveTarget, OpenOptions, StorageEngine,
};
use crate::error::{EngineError, EngineResult};
use crate::keys::{ColKey, FileId, ObjKey, ObserverId, TableKey, VersionId};
use crate::log::LogHub;
use crate::predicate::{Predicate, SortSpec};
use crate::schema::{TableInfo, TableSpec};
use crate::snapshot::Snapshot;
use crate::value::EngineValue;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// The reference storage engine.
///
/// # Example
///
/// ```rust,ignore
/// use rowbind_engine::{MemoryEngine, OpenOptions, StorageEngine};
///
/// let engine = MemoryEngine::new();
/// let session = engine.open(&OpenOptions::new("people"))?;
/// session.begin_write()?;
/// session.commit_write()?;
/// ```
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

#[derive(Default)]
struct EngineInner {
    files: Mutex<HashMap<PathBuf, Arc<SharedFile>>>,
    next_file: AtomicU64,
    next_session: AtomicU64,
    log: LogHub,
}

struct SharedFile {
    id: FileId,
    path: PathBuf,
    durable: bool,
    latest: RwLock<Arc<Snapshot>>,
    writer: Mutex<Option<u64>>,
    writer_released: Condvar,
    listeners: Mutex<Vec<(u64, CommitListener)>>,
    sessions: Mutex<usize>,
}

impl SharedFile {
    fn lock_writer(&self, session: u64) {
        let mut writer = self.writer.lock();
        while writer.is_some() {
            self.writer_released.wait(&mut writer);
        }
        *writer = Some(session);
    }

    fn unlock_writer(&self, session: u64) {
        let mut writer = self.writer.lock();
        if *writer == Some(session) {
            *writer = None;
            self.writer_released.notify_all();
        }
    }

    fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Persists (if durable) and publishes a new version.
    fn publish(&self, snapshot: Snapshot) -> EngineResult<Arc<Snapshot>> {
        if self.durable {
            snapshot.save(&self.path)?;
        }
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    fn apply_schema(&self, session: u64, tables: &[TableSpec]) -> EngineResult<()> {
        self.lock_writer(session);
        let mut next = (*self.latest()).clone();
        let result = next.apply_schema(tables).and_then(|changed| {
            if changed {
                next.version = next.version.next();
                self.publish(next).map(|_| ())
            } else {
                Ok(())
            }
        });
        self.unlock_writer(session);
        result
    }

    fn notify(&self, version: VersionId) {
        let listeners: Vec<CommitListener> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(version);
        }
    }
}

impl MemoryEngine {
    /// Creates an engine with no open files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide engine.
    pub fn shared() -> Arc<MemoryEngine> {
        static SHARED: OnceLock<Arc<MemoryEngine>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(MemoryEngine::new())))
    }

    /// Number of files with at least one open session.
    #[must_use]
    pub fn open_file_count(&self) -> usize {
        self.inner.files.lock().len()
    }

    fn attach(&self, options: &OpenOptions) -> EngineResult<Arc<SharedFile>> {
        let mut files = self.inner.files.lock();
        if let Some(file) = files.get(&options.path) {
            *file.sessions.lock() += 1;
            return Ok(Arc::clone(file));
        }
        let initial = if options.durable {
            Snapshot::load(&options.path)?.unwrap_or_default()
        } else {
            Snapshot::new()
        };
        let file = Arc::new(SharedFile {
            id: FileId(self.inner.next_file.fetch_add(1, Ordering::Relaxed)),
            path: options.path.clone(),
            durable: options.durable,
            latest: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            sessions: Mutex::new(1),
        });
        files.insert(options.path.clone(), Arc::clone(&file));
        self.inner.log.emit(EngineLogLevel::Detail, || {
            format!("opened file {} at {}", file.id.0, options.path.display())
        });
        Ok(file)
    }

    fn detach(inner: &EngineInner, file: &Arc<SharedFile>) {
        let mut files = inner.files.lock();
        let mut sessions = file.sessions.lock();
        *sessions = sessions.saturating_sub(1);
        if *sessions == 0 {
            if let Some(current) = files.get(&file.path) {
                if Arc::ptr_eq(current, file) {
                    files.remove(&file.path);
                    inner.log.emit(EngineLogLevel::Detail, || {
                        format!("closed file {} at {}", file.id.0, file.path.display())
                    });
                }
            }
        }
    }

    fn new_session(&self, file: Arc<SharedFile>, current: Arc<Snapshot>, frozen: bool) -> Arc<MemorySession> {
        Arc::new(MemorySession {
            id: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
            engine: self.clone(),
            file,
            frozen,
            state: Mutex::new(SessionState {
                current,
                write: None,
                closed: false,
                observers: BTreeMap::new(),
                next_observer: 0,
            }),
        })
    }
}

impl StorageEngine for MemoryEngine {
    fn open(&self, options: &OpenOptions) -> EngineResult<Arc<dyn EngineSession>> {
        let file = self.attach(options)?;
        let session_id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = file.apply_schema(session_id, &options.tables) {
            Self::detach(&self.inner, &file);
            return Err(err);
        }
        let current = file.latest();
        Ok(self.new_session(file, current, false))
    }

    fn set_log_sink(&self, sink: Option<EngineLogSink>) {
        self.inner.log.set(sink);
    }
}

struct Observer {
    target: ObserveTarget,
    baseline: Arc<Snapshot>,
    callback: Arc<Mutex<ChangeCallback>>,
}

struct SessionState {
    current: Arc<Snapshot>,
    write: Option<Snapshot>,
    closed: bool,
    observers: BTreeMap<u64, Observer>,
    next_observer: u64,
}

impl SessionState {
    fn reading(&self) -> &Snapshot {
        self.write.as_ref().unwrap_or(self.current.as_ref())
    }
}

/// A session opened by [`MemoryEngine`].
pub struct MemorySession {
    id: u64,
    engine: MemoryEngine,
    file: Arc<SharedFile>,
    frozen: bool,
    state: Mutex<SessionState>,
}

impl MemorySession {
    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> EngineResult<R>) -> EngineResult<R> {
        let state = self.state.lock();
        if state.closed {
            return Err(EngineError::SessionClosed);
        }
        f(state.reading())
    }

    fn write<R>(&self, f: impl FnOnce(&mut Snapshot) -> EngineResult<R>) -> EngineResult<R> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EngineError::SessionClosed);
        }
        if self.frozen {
            return Err(EngineError::FrozenSession);
        }
        match state.write.as_mut() {
            Some(snapshot) => f(snapshot),
            None => Err(EngineError::NotInWriteTransaction),
        }
    }

    fn check_target(snapshot: &Snapshot, target: &ObserveTarget) -> EngineResult<()> {
        match target {
            ObserveTarget::Row { table, row }
            | ObserveTarget::List { table, row, .. }
            | ObserveTarget::Dictionary { table, row, .. } => {
                if snapshot.row_exists(*table, *row) {
                    Ok(())
                } else {
                    Err(EngineError::RowNotFound {
                        table: *table,
                        row: *row,
                    })
                }
            }
            ObserveTarget::Table { table, .. } => snapshot.table(*table).map(|_| ()),
        }
    }
}

fn diff(old: &Snapshot, new: &Snapshot, target: &ObserveTarget) -> RawChangeSet {
    match target {
        ObserveTarget::Row { table, row } => row_changes(old, new, *table, *row),
        ObserveTarget::Table {
            table,
            predicate,
            sort,
        } => table_changes(old, new, *table, predicate.as_ref(), sort.as_ref()),
        ObserveTarget::List { table, row, column } => list_changes(old, new, *table, *row, *column),
        ObserveTarget::Dictionary { table, row, column } => {
            dictionary_changes(old, new, *table, *row, *column)
        }
    }
}

impl EngineSession for MemorySession {
    fn file_id(&self) -> FileId {
        self.file.id
    }

    fn version(&self) -> VersionId {
        self.state.lock().current.version
    }

    fn latest_version(&self) -> VersionId {
        self.file.latest().version
    }

    fn is_in_write(&self) -> bool {
        self.state.lock().write.is_some()
    }

    fn begin_write(&self) -> EngineResult<()> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(EngineError::SessionClosed);
            }
            if self.frozen {
                return Err(EngineError::FrozenSession);
            }
            if state.write.is_some() {
                return Err(EngineError::AlreadyInWriteTransaction);
            }
        }
        self.file.lock_writer(self.id);
        let latest = self.file.latest();
        let mut state = self.state.lock();
        if state.closed {
            self.file.unlock_writer(self.id);
            return Err(EngineError::SessionClosed);
        }
        state.write = Some((*latest).clone());
        state.current = latest;
        Ok(())
    }

    fn commit_write(&self) -> EngineResult<VersionId> {
        let version = {
            let mut state = self.state.lock();
            let Some(mut snapshot) = state.write.take() else {
                return Err(EngineError::NotInWriteTransaction);
            };
            let version = self.file.latest().version.next();
            snapshot.version = version;
            let published = self.file.publish(snapshot);
            self.file.unlock_writer(self.id);
            state.current = published?;
            version
        };
        self.engine.inner.log.emit(EngineLogLevel::Debug, || {
            format!("committed {version} on file {}", self.file.id.0)
        });
        self.file.notify(version);
        Ok(version)
    }

    fn cancel_write(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.write.take().is_none() {
            return Err(EngineError::NotInWriteTransaction);
        }
        self.file.unlock_writer(self.id);
        Ok(())
    }

    fn refresh(&self) -> EngineResult<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EngineError::SessionClosed);
        }
        if self.frozen || state.write.is_some() {
            return Ok(false);
        }
        let latest = self.file.latest();
        if latest.version == state.current.version {
            return Ok(false);
        }
        state.current = latest;
        Ok(true)
    }

    fn freeze(&self) -> EngineResult<Arc<dyn EngineSession>> {
        let current = {
            let state = self.state.lock();
            if state.closed {
                return Err(EngineError::SessionClosed);
            }
            if state.write.is_some() {
                return Err(EngineError::invalid_state(
                    "cannot freeze inside a write transaction",
                ));
            }
            Arc::clone(&state.current)
        };
        *self.file.sessions.lock() += 1;
        Ok(self.engine.new_session(Arc::clone(&self.file), current, true))
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn close(&self) {
        let had_write = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.observers.clear();
            state.write.take().is_some()
        };
        if had_write {
            self.file.unlock_writer(self.id);
        }
        self.file.listeners.lock().retain(|(id, _)| *id != self.id);
        MemoryEngine::detach(&self.engine.inner, &self.file);
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn table(&self, name: &str) -> EngineResult<TableInfo> {
        self.read(|s| {
            let key = s.table_key(name).ok_or_else(|| EngineError::TableNotFound {
                name: name.to_string(),
            })?;
            Ok(s.table(key)?.info())
        })
    }

    fn create_row(&self, table: TableKey, primary_key: Option<EngineValue>) -> EngineResult<ObjKey> {
        self.write(|s| s.create_row(table, primary_key))
    }

    fn delete_row(&self, table: TableKey, row: ObjKey) -> EngineResult<()> {
        self.write(|s| s.delete_row(table, row))
    }

    fn row_exists(&self, table: TableKey, row: ObjKey) -> EngineResult<bool> {
        self.read(|s| Ok(s.row_exists(table, row)))
    }

    fn find_by_primary_key(&self, table: TableKey, key: &EngineValue) -> EngineResult<Option<ObjKey>> {
        self.read(|s| s.find_by_primary_key(table, key))
    }

    fn get_value(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<EngineValue> {
        self.read(|s| s.get_value(table, row, column))
    }

    fn set_value(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: EngineValue,
    ) -> EngineResult<()> {
        self.write(|s| s.set_value(table, row, column, value))
    }

    fn add_int(&self, table: TableKey, row: ObjKey, column: ColKey, delta: i64) -> EngineResult<i64> {
        self.write(|s| s.add_int(table, row, column, delta))
    }

    fn list_len(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<usize> {
        self.read(|s| s.list_len(table, row, column))
    }

    fn list_get(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue> {
        self.read(|s| s.list_get(table, row, column, index))
    }

    fn list_set(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()> {
        self.write(|s| s.list_set(table, row, column, index, value))
    }

    fn list_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()> {
        self.write(|s| s.list_insert(table, row, column, index, value))
    }

    fn list_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue> {
        self.write(|s| s.list_remove(table, row, column, index))
    }

    fn list_clear(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<()> {
        self.write(|s| s.list_clear(table, row, column))
    }

    fn set_find(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>> {
        self.read(|s| s.set_find(table, row, column, value))
    }

    fn set_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: EngineValue,
    ) -> EngineResult<(usize, bool)> {
        self.write(|s| s.set_insert(table, row, column, value))
    }

    fn set_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>> {
        self.write(|s| s.set_remove(table, row, column, value))
    }

    fn dictionary_len(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<usize> {
        self.read(|s| s.dictionary_len(table, row, column))
    }

    fn dictionary_keys(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<Vec<String>> {
        self.read(|s| s.dictionary_keys(table, row, column))
    }

    fn dictionary_get(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>> {
        self.read(|s| s.dictionary_get(table, row, column, key))
    }

    fn dictionary_insert(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: String,
        value: EngineValue,
    ) -> EngineResult<Option<EngineValue>> {
        self.write(|s| s.dictionary_insert(table, row, column, key, value))
    }

    fn dictionary_remove(
        &self,
        table: TableKey,
        row: ObjKey,
        column: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>> {
        self.write(|s| s.dictionary_remove(table, row, column, key))
    }

    fn dictionary_clear(&self, table: TableKey, row: ObjKey, column: ColKey) -> EngineResult<()> {
        self.write(|s| s.dictionary_clear(table, row, column))
    }

    fn rows(
        &self,
        table: TableKey,
        predicate: Option<&Predicate>,
        sort: Option<&SortSpec>,
    ) -> EngineResult<Vec<ObjKey>> {
        self.read(|s| s.rows(table, predicate, sort))
    }

    fn export(&self, target: ObserveTarget) -> EngineResult<ExportedRef> {
        let state = self.state.lock();
        if state.closed {
            return Err(EngineError::SessionClosed);
        }
        if state.write.is_some() {
            return Err(EngineError::invalid_state(
                "cannot export a reference inside a write transaction",
            ));
        }
        Self::check_target(&state.current, &target)?;
        Ok(ExportedRef {
            file: self.file.id,
            version: state.current.version,
            target,
        })
    }

    fn import(&self, exported: &ExportedRef) -> EngineResult<ObserveTarget> {
        if exported.file != self.file.id {
            return Err(EngineError::FileMismatch);
        }
        let behind = self.read(|s| Ok(s.version < exported.version))?;
        if behind {
            if self.frozen {
                return Err(EngineError::invalid_state(
                    "frozen session is older than the exported reference",
                ));
            }
            self.refresh()?;
        }
        self.read(|s| Self::check_target(s, &exported.target))?;
        Ok(exported.target.clone())
    }

    fn add_observer(&self, target: ObserveTarget, callback: ChangeCallback) -> EngineResult<ObserverId> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(EngineError::SessionClosed);
        }
        Self::check_target(&state.current, &target)?;
        let id = state.next_observer;
        state.next_observer += 1;
        let baseline = Arc::clone(&state.current);
        state.observers.insert(
            id,
            Observer {
                target,
                baseline,
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        Ok(ObserverId(id))
    }

    fn remove_observer(&self, id: ObserverId) {
        self.state.lock().observers.remove(&id.0);
    }

    fn deliver_pending(&self) -> usize {
        let (current, due) = {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            let current = Arc::clone(&state.current);
            let mut due = Vec::new();
            for observer in state.observers.values_mut() {
                if observer.baseline.version != current.version {
                    let baseline = std::mem::replace(&mut observer.baseline, Arc::clone(&current));
                    due.push((baseline, observer.target.clone(), Arc::clone(&observer.callback)));
                }
            }
            (current, due)
        };

        let mut delivered = 0;
        for (baseline, target, callback) in due {
            let changes = diff(&baseline, &current, &target);
            if changes.is_empty() {
                continue;
            }
            let mut callback = callback.lock();
            (&mut **callback)(&changes);
            delivered += 1;
        }
        delivered
    }

    fn set_commit_listener(&self, listener: Option<CommitListener>) {
        let mut listeners = self.file.listeners.lock();
        listeners.retain(|(id, _)| *id != self.id);
        if let Some(listener) = listener {
            listeners.push((self.id, listener));
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}
