//! Sessions: an open file confined to one scheduler.

mod config;
mod results;
mod shared;

pub use config::SessionConfig;
pub use results::Results;

pub(crate) use shared::{EmbeddedPlacement, SessionShared, TableBinding};

use crate::bridge::SessionHandle;
use crate::error::{CoreError, CoreResult};
use crate::handoff::{Handoff, ThreadSafeReference};
use crate::logger::engine_log_sink;
use crate::object::{Managed, Object};
use crate::property::Persistable;
use crate::scheduler::{self, Scheduler};
use crate::schema::{compile_schema, SchemaRegistry};
use rowbind_engine::{MemoryEngine, OpenOptions, StorageEngine, VersionId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open session on one file.
///
/// A session is confined to the thread of its scheduler. It reads from a
/// pinned version which advances on refresh, on `begin_write`, and when the
/// scheduler runs a notification pass after another session commits.
///
/// # Example
///
/// ```rust,ignore
/// let session = Session::open(SessionConfig::new("people").object::<Person>())?;
///
/// let ada = session.write(|| {
///     let person = Person::default();
///     person.name.write("Ada")?;
///     session.add(person)
/// })?;
///
/// assert_eq!(ada.name.read()?, "Ada");
/// ```
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
    _confined: PhantomData<*const ()>,
}

impl Session {
    /// Opens a session.
    ///
    /// Must be called on the scheduler's thread; otherwise fails with
    /// [`CoreError::WrongThread`].
    pub fn open(config: SessionConfig) -> CoreResult<Session> {
        let scheduler = config.scheduler.clone().unwrap_or_else(scheduler::make_default);
        if !scheduler.is_on_thread() {
            return Err(CoreError::WrongThread);
        }

        let schema = if config.schema.is_empty() {
            SchemaRegistry::global().all()
        } else {
            config.schema.clone()
        };
        let tables = compile_schema(&schema)?;

        let engine: Arc<dyn StorageEngine> = match &config.engine {
            Some(engine) => Arc::clone(engine),
            None => MemoryEngine::shared() as Arc<dyn StorageEngine>,
        };
        engine.set_log_sink(Some(engine_log_sink()));
        let options = OpenOptions::new(config.path.clone())
            .tables(tables)
            .durable(config.durable);
        let handle = SessionHandle::new(engine.open(&options)?);

        let mut bindings = HashMap::with_capacity(schema.len());
        for object in &schema {
            let info = handle.table(object.name)?;
            bindings.insert(
                object.name,
                Arc::new(TableBinding {
                    info,
                    schema: object.clone(),
                }),
            );
        }

        let config = SessionConfig {
            scheduler: Some(Arc::clone(&scheduler)),
            schema,
            engine: Some(engine),
            ..config
        };
        let shared = Arc::new(SessionShared::new(handle, scheduler, bindings, config, false));

        let weak = Arc::downgrade(&shared);
        shared
            .engine
            .set_commit_listener(Some(Arc::new(move |_: VersionId| {
                if let Some(shared) = weak.upgrade() {
                    shared.schedule_notify();
                }
            })));

        info!(
            path = %shared.config.path.display(),
            scheduler = %shared.scheduler.id(),
            version = %shared.engine.version(),
            "opened session"
        );
        Ok(Self::from_shared(shared))
    }

    pub(crate) fn from_shared(shared: Arc<SessionShared>) -> Self {
        Self {
            shared,
            _confined: PhantomData,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// The effective configuration, with scheduler, schema and engine
    /// filled in.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.config.path
    }

    /// Scheduler the session is confined to.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.shared.scheduler
    }

    /// Version the session currently reads.
    #[must_use]
    pub fn version(&self) -> VersionId {
        self.shared.engine.version()
    }

    /// Starts a write transaction, advancing to the latest version.
    pub fn begin_write(&self) -> CoreResult<()> {
        self.shared.verify_thread()?;
        if self.shared.frozen {
            return Err(CoreError::FrozenSession);
        }
        Ok(self.shared.engine.begin_write()?)
    }

    /// Commits the active write transaction.
    ///
    /// Observers of this and other sessions on the file are notified
    /// through their schedulers, never from inside this call.
    pub fn commit_write(&self) -> CoreResult<()> {
        self.shared.verify_thread()?;
        let version = self.shared.engine.commit_write()?;
        debug!(%version, "committed write");
        Ok(())
    }

    /// Discards the active write transaction.
    pub fn cancel_write(&self) -> CoreResult<()> {
        self.shared.verify_thread()?;
        Ok(self.shared.engine.cancel_write()?)
    }

    /// Returns true while a write transaction is active.
    #[must_use]
    pub fn is_in_write(&self) -> bool {
        self.shared.engine.is_in_write()
    }

    /// Runs `f` inside a write transaction. Commits if `f` succeeds and
    /// cancels if it fails.
    pub fn write<R>(&self, f: impl FnOnce() -> CoreResult<R>) -> CoreResult<R> {
        self.begin_write()?;
        match f() {
            Ok(value) => {
                self.commit_write()?;
                Ok(value)
            }
            Err(err) => {
                if self.is_in_write() {
                    if let Err(cancel) = self.cancel_write() {
                        warn!(error = %cancel, "failed to cancel write after error");
                    }
                }
                Err(err)
            }
        }
    }

    /// Adds an unmanaged object, returning its managed form.
    ///
    /// Requires a write transaction. Objects with a primary key fail with
    /// `DuplicatePrimaryKey` if the key is taken.
    pub fn add<T: Object>(&self, object: T) -> CoreResult<Managed<T>> {
        self.shared.add_object(object)
    }

    /// Adds every object in order.
    pub fn insert_all<T: Object>(
        &self,
        objects: impl IntoIterator<Item = T>,
    ) -> CoreResult<Vec<Managed<T>>> {
        objects.into_iter().map(|object| self.add(object)).collect()
    }

    /// Deletes the object's row. Requires a write transaction.
    pub fn remove<T: Object>(&self, object: &Managed<T>) -> CoreResult<()> {
        self.shared.verify_thread()?;
        if object.shared().engine.file_id() != self.shared.engine.file_id() {
            return Err(CoreError::IncompatibleSession {
                message: "object belongs to a different file".to_string(),
            });
        }
        self.shared
            .engine
            .delete_row(object.table_id().into(), object.row_id().into())?;
        Ok(())
    }

    /// Every object of type `T`.
    pub fn objects<T: Object>(&self) -> CoreResult<Results<T>> {
        self.shared.verify_thread()?;
        let binding = self.shared.binding(T::NAME)?;
        if binding.info.embedded {
            return Err(CoreError::invalid_operation(format!(
                "embedded type {} cannot be queried directly",
                T::NAME
            )));
        }
        Ok(Results::new(Arc::clone(&self.shared), binding))
    }

    /// The object of type `T` with primary key `key`.
    pub fn object_for_primary_key<T: Object, K: Persistable>(
        &self,
        key: K,
    ) -> CoreResult<Option<Managed<T>>> {
        self.shared.verify_thread()?;
        let binding = self.shared.binding(T::NAME)?;
        if binding.info.primary_key.is_none() {
            return Err(CoreError::invalid_operation(format!(
                "{} has no primary key",
                T::NAME
            )));
        }
        match self
            .shared
            .engine
            .find_by_primary_key(binding.info.key, &key.serialize())?
        {
            Some(row) => self.shared.bind_object::<T>(row.into()).map(Some),
            None => Ok(None),
        }
    }

    /// Advances to the latest version and delivers due notifications.
    /// Returns true if the version changed.
    pub fn refresh(&self) -> CoreResult<bool> {
        self.shared.verify_thread()?;
        let changed = self.shared.engine.refresh()?;
        self.shared.engine.deliver_pending();
        Ok(changed)
    }

    /// Closes the session. Objects bound to it fail with `SessionClosed`
    /// afterwards. Idempotent.
    pub fn close(&self) {
        if !self.shared.engine.is_closed() {
            self.shared.engine.set_commit_listener(None);
            self.shared.engine.close();
            debug!(path = %self.shared.config.path.display(), "closed session");
        }
    }

    /// Returns true once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.engine.is_closed()
    }

    /// Returns a read-only session pinned to the current version.
    ///
    /// Frozen sessions are not confined to a thread and never deliver
    /// notifications.
    pub fn freeze(&self) -> CoreResult<Session> {
        if self.shared.frozen {
            return Ok(self.clone());
        }
        self.shared.verify_thread()?;
        let frozen = self.shared.engine.freeze()?;
        let shared = SessionShared::new(
            SessionHandle::new(frozen),
            Arc::clone(&self.shared.scheduler),
            self.shared.bindings.clone(),
            self.shared.config.clone(),
            true,
        );
        Ok(Self::from_shared(Arc::new(shared)))
    }

    /// Returns a live session on the same file and scheduler.
    pub fn thaw(&self) -> CoreResult<Session> {
        if !self.shared.frozen {
            return Ok(self.clone());
        }
        Session::open(self.shared.config.clone())
    }

    /// Returns true for frozen sessions.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.shared.frozen
    }

    /// Resolves a thread-safe reference in this session, consuming it.
    pub fn resolve<T: Handoff>(&self, mut reference: ThreadSafeReference<T>) -> CoreResult<T> {
        reference.resolve(self)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.shared.config.path)
            .field("version", &self.shared.engine.version())
            .field("frozen", &self.shared.frozen)
            .field("closed", &self.shared.engine.is_closed())
            .finish()
    }
}
