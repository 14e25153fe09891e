//! State shared by a session and everything bound to it.

use super::config::SessionConfig;
use crate::bridge::{ColumnId, RowId, SessionHandle, TableId};
use crate::error::{CoreError, CoreResult};
use crate::object::{Managed, Object};
use crate::property::ManagedSlot;
use crate::scheduler::Scheduler;
use crate::schema::ObjectSchema;
use rowbind_engine::{EngineValue, TableInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A table resolved against an open session, with the schema it was
/// declared from.
#[derive(Debug)]
pub(crate) struct TableBinding {
    pub(crate) info: TableInfo,
    pub(crate) schema: ObjectSchema,
}

impl TableBinding {
    pub(crate) fn table(&self) -> TableId {
        self.info.key.into()
    }

    pub(crate) fn column(&self, name: &str) -> CoreResult<ColumnId> {
        self.info
            .column(name)
            .map(ColumnId::from)
            .ok_or_else(|| CoreError::property_not_found(self.schema.name, name))
    }

    pub(crate) fn slot(
        &self,
        shared: &Arc<SessionShared>,
        row: RowId,
        name: &str,
        in_query: bool,
    ) -> ManagedSlot {
        ManagedSlot {
            shared: Arc::clone(shared),
            table: self.table(),
            row,
            column: self.info.column(name).map_or(ColumnId::INVALID, ColumnId::from),
            in_query,
        }
    }

    /// Builds an instance of `T` whose properties are all bound to `row`.
    pub(crate) fn bind<T: Object>(&self, shared: &Arc<SessionShared>, row: RowId, in_query: bool) -> T {
        let mut object = T::default();
        for (name, property) in object.properties() {
            property.bind(self.slot(shared, row, name, in_query));
        }
        object
    }
}

/// Where a new embedded row is linked from its parent.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EmbeddedPlacement {
    /// The parent's single-object column.
    Column,
    /// A new element of the parent's list, at this index.
    Insert(usize),
    /// Replaces the list element at this index.
    Replace(usize),
}

/// Shared state of one open session.
///
/// Properties, results and notification tokens hold an `Arc` to this; the
/// engine's commit listener holds only a weak reference.
pub(crate) struct SessionShared {
    pub(crate) engine: SessionHandle,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) bindings: HashMap<&'static str, Arc<TableBinding>>,
    pub(crate) config: SessionConfig,
    pub(crate) frozen: bool,
    notify_scheduled: AtomicBool,
}

impl SessionShared {
    pub(crate) fn new(
        engine: SessionHandle,
        scheduler: Arc<dyn Scheduler>,
        bindings: HashMap<&'static str, Arc<TableBinding>>,
        config: SessionConfig,
        frozen: bool,
    ) -> Self {
        Self {
            engine,
            scheduler,
            bindings,
            config,
            frozen,
            notify_scheduled: AtomicBool::new(false),
        }
    }

    /// Frozen sessions may be read from any thread; live ones only from
    /// their scheduler's thread.
    pub(crate) fn verify_thread(&self) -> CoreResult<()> {
        if self.frozen || self.scheduler.is_on_thread() {
            Ok(())
        } else {
            Err(CoreError::WrongThread)
        }
    }

    pub(crate) fn binding(&self, name: &str) -> CoreResult<Arc<TableBinding>> {
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::schema_not_found(name))
    }

    pub(crate) fn bind_object<T: Object>(self: &Arc<Self>, row: RowId) -> CoreResult<Managed<T>> {
        self.verify_thread()?;
        let binding = self.binding(T::NAME)?;
        if !self.engine.row_exists(binding.info.key, row.into())? {
            return Err(CoreError::StaleRow {
                table: binding.info.key,
                row: row.into(),
            });
        }
        let object = binding.bind::<T>(self, row, false);
        Ok(Managed::new(object, Arc::clone(self), binding, row))
    }

    /// Template instance whose comparisons build deferred queries.
    pub(crate) fn bind_query<T: Object>(self: &Arc<Self>, binding: &TableBinding) -> T {
        binding.bind::<T>(self, RowId::INVALID, true)
    }

    /// Creates a row for `value` and moves its properties into it.
    ///
    /// The primary key is written when the row is created; every other
    /// property copies its in-memory value into its column.
    pub(crate) fn add_object<T: Object>(self: &Arc<Self>, mut value: T) -> CoreResult<Managed<T>> {
        self.verify_thread()?;
        if self.frozen {
            return Err(CoreError::FrozenSession);
        }
        if !self.engine.is_in_write() {
            return Err(CoreError::NotInWriteTransaction);
        }
        if T::EMBEDDED {
            return Err(CoreError::invalid_operation(format!(
                "{} is embedded and can only be assigned to an embedded property",
                T::NAME
            )));
        }
        let binding = self.binding(T::NAME)?;

        let properties = value.properties();
        if properties.iter().any(|(_, p)| p.is_managed()) {
            return Err(CoreError::invalid_operation(format!(
                "{} is already managed by a session",
                T::NAME
            )));
        }
        let primary_key = match T::PRIMARY_KEY {
            Some(key) => Some(
                properties
                    .iter()
                    .find(|(name, _)| *name == key)
                    .and_then(|(_, p)| p.unmanaged_value())
                    .ok_or_else(|| CoreError::property_not_found(T::NAME, key))?,
            ),
            None => None,
        };

        let row: RowId = self.engine.create_row(binding.info.key, primary_key)?.into();
        for (name, property) in properties {
            let slot = binding.slot(self, row, name, false);
            if T::PRIMARY_KEY == Some(name) {
                property.bind(slot);
            } else {
                property.attach(slot)?;
            }
        }
        debug!(object = T::NAME, %row, "added object");
        Ok(Managed::new(value, Arc::clone(self), binding, row))
    }

    /// Creates an embedded row owned by `parent` and copies `value` into it.
    pub(crate) fn create_embedded<T: Object>(
        self: &Arc<Self>,
        parent: &ManagedSlot,
        placement: EmbeddedPlacement,
        mut value: T,
    ) -> CoreResult<RowId> {
        parent.check()?;
        let binding = self.binding(T::NAME)?;
        if !binding.info.embedded {
            return Err(CoreError::invalid_operation(format!(
                "{} is not an embedded object type",
                T::NAME
            )));
        }
        let row: RowId = self.engine.create_row(binding.info.key, None)?.into();
        let link = EngineValue::Link(row.into());
        match placement {
            EmbeddedPlacement::Column => parent.set(link)?,
            EmbeddedPlacement::Insert(index) => parent.list_insert(index, link)?,
            EmbeddedPlacement::Replace(index) => parent.list_set(index, link)?,
        }
        for (name, property) in value.properties() {
            property.attach(binding.slot(self, row, name, false))?;
        }
        Ok(row)
    }

    /// Advances to the latest version and runs due observers. Skipped while
    /// a write is active; the commit that ends it schedules another pass.
    pub(crate) fn advance_and_notify(&self) {
        if self.engine.is_closed() || self.engine.is_in_write() {
            return;
        }
        if let Err(err) = self.engine.refresh() {
            debug!(error = %err, "refresh before notification failed");
            return;
        }
        let delivered = self.engine.deliver_pending();
        if delivered > 0 {
            debug!(delivered, version = %self.engine.version(), "delivered notifications");
        }
    }

    /// Queues one notification pass on the scheduler. Calls made while a
    /// pass is already queued coalesce into it.
    pub(crate) fn schedule_notify(self: &Arc<Self>) {
        if self.frozen || self.notify_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = Arc::downgrade(self);
        let result = self.scheduler.invoke(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.notify_scheduled.store(false, Ordering::Release);
                shared.advance_and_notify();
            }
        }));
        if let Err(err) = result {
            warn!(error = %err, scheduler = %self.scheduler.id(), "could not schedule notifications");
            self.notify_scheduled.store(false, Ordering::Release);
        }
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        self.engine.set_commit_listener(None);
        self.engine.close();
    }
}
