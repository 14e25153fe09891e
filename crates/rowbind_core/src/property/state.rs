//! Managed storage locations and the property state machine.

use crate::bridge::{ColumnId, RowId, TableId};
use crate::error::{CoreError, CoreResult};
use crate::schema::PropertyType;
use crate::session::SessionShared;
use parking_lot::Mutex;
use rowbind_engine::{EngineValue, ObserveTarget};
use std::fmt;
use std::sync::Arc;

/// Where a managed property lives: one column of one row of a session.
///
/// A slot created for query building carries `in_query`; it names a column
/// but no row, and every value access through it fails with
/// [`CoreError::QueryContext`].
#[derive(Clone)]
pub struct ManagedSlot {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) table: TableId,
    pub(crate) row: RowId,
    pub(crate) column: ColumnId,
    pub(crate) in_query: bool,
}

impl ManagedSlot {
    /// Rejects query templates and access from outside the session thread.
    pub(crate) fn check(&self) -> CoreResult<()> {
        if self.in_query {
            return Err(CoreError::QueryContext);
        }
        self.shared.verify_thread()
    }

    pub(crate) fn get(&self) -> CoreResult<EngineValue> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .get_value(self.table.into(), self.row.into(), self.column.into())?)
    }

    pub(crate) fn set(&self, value: EngineValue) -> CoreResult<()> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .set_value(self.table.into(), self.row.into(), self.column.into(), value)?)
    }

    pub(crate) fn add_int(&self, delta: i64) -> CoreResult<i64> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .add_int(self.table.into(), self.row.into(), self.column.into(), delta)?)
    }

    pub(crate) fn list_len(&self) -> CoreResult<usize> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .list_len(self.table.into(), self.row.into(), self.column.into())?)
    }

    pub(crate) fn list_get(&self, index: usize) -> CoreResult<EngineValue> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .list_get(self.table.into(), self.row.into(), self.column.into(), index)?)
    }

    pub(crate) fn list_set(&self, index: usize, value: EngineValue) -> CoreResult<()> {
        self.check()?;
        Ok(self.shared.engine.list_set(
            self.table.into(),
            self.row.into(),
            self.column.into(),
            index,
            value,
        )?)
    }

    pub(crate) fn list_insert(&self, index: usize, value: EngineValue) -> CoreResult<()> {
        self.check()?;
        Ok(self.shared.engine.list_insert(
            self.table.into(),
            self.row.into(),
            self.column.into(),
            index,
            value,
        )?)
    }

    pub(crate) fn list_remove(&self, index: usize) -> CoreResult<EngineValue> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .list_remove(self.table.into(), self.row.into(), self.column.into(), index)?)
    }

    pub(crate) fn list_clear(&self) -> CoreResult<()> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .list_clear(self.table.into(), self.row.into(), self.column.into())?)
    }

    pub(crate) fn set_find(&self, value: &EngineValue) -> CoreResult<Option<usize>> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .set_find(self.table.into(), self.row.into(), self.column.into(), value)?)
    }

    pub(crate) fn set_insert(&self, value: EngineValue) -> CoreResult<bool> {
        self.check()?;
        let (_, inserted) =
            self.shared
                .engine
                .set_insert(self.table.into(), self.row.into(), self.column.into(), value)?;
        Ok(inserted)
    }

    pub(crate) fn set_remove(&self, value: &EngineValue) -> CoreResult<bool> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .set_remove(self.table.into(), self.row.into(), self.column.into(), value)?
            .is_some())
    }

    pub(crate) fn dictionary_len(&self) -> CoreResult<usize> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .dictionary_len(self.table.into(), self.row.into(), self.column.into())?)
    }

    pub(crate) fn dictionary_keys(&self) -> CoreResult<Vec<String>> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .dictionary_keys(self.table.into(), self.row.into(), self.column.into())?)
    }

    pub(crate) fn dictionary_get(&self, key: &str) -> CoreResult<Option<EngineValue>> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .dictionary_get(self.table.into(), self.row.into(), self.column.into(), key)?)
    }

    pub(crate) fn dictionary_insert(&self, key: String, value: EngineValue) -> CoreResult<Option<EngineValue>> {
        self.check()?;
        Ok(self.shared.engine.dictionary_insert(
            self.table.into(),
            self.row.into(),
            self.column.into(),
            key,
            value,
        )?)
    }

    pub(crate) fn dictionary_remove(&self, key: &str) -> CoreResult<Option<EngineValue>> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .dictionary_remove(self.table.into(), self.row.into(), self.column.into(), key)?)
    }

    pub(crate) fn dictionary_clear(&self) -> CoreResult<()> {
        self.check()?;
        Ok(self
            .shared
            .engine
            .dictionary_clear(self.table.into(), self.row.into(), self.column.into())?)
    }

    /// Engine target observing this slot as a list or set.
    pub(crate) fn list_target(&self) -> ObserveTarget {
        ObserveTarget::List {
            table: self.table.into(),
            row: self.row.into(),
            column: self.column.into(),
        }
    }

    /// Engine target observing this slot as a dictionary.
    pub(crate) fn dictionary_target(&self) -> ObserveTarget {
        ObserveTarget::Dictionary {
            table: self.table.into(),
            row: self.row.into(),
            column: self.column.into(),
        }
    }
}

impl fmt::Debug for ManagedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedSlot")
            .field("table", &self.table)
            .field("row", &self.row)
            .field("column", &self.column)
            .field("in_query", &self.in_query)
            .finish()
    }
}

/// State of one property: an in-memory value, or a managed slot.
///
/// The only transition is `Unmanaged` to `Managed`, and it needs `&mut`
/// access to the property. Every value operation works through `&self`, so
/// a [`Managed`](crate::Managed) object never hands out the `&mut` that
/// could swap a managed property for an unmanaged one.
pub(crate) enum PropertyState<T> {
    Unmanaged(Mutex<T>),
    Managed(ManagedSlot),
}

impl<T> PropertyState<T> {
    pub(crate) fn unmanaged(value: T) -> Self {
        Self::Unmanaged(Mutex::new(value))
    }

    pub(crate) fn is_managed(&self) -> bool {
        matches!(self, Self::Managed(_))
    }

    pub(crate) fn slot(&self) -> Option<&ManagedSlot> {
        match self {
            Self::Managed(slot) => Some(slot),
            Self::Unmanaged(_) => None,
        }
    }

    /// Query slot, if this property is a query template.
    pub(crate) fn query_slot(&self) -> Option<&ManagedSlot> {
        self.slot().filter(|slot| slot.in_query)
    }
}

impl<T: fmt::Debug> fmt::Debug for PropertyState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmanaged(value) => f.debug_tuple("Unmanaged").field(&*value.lock()).finish(),
            Self::Managed(slot) => f.debug_tuple("Managed").field(slot).finish(),
        }
    }
}

pub(crate) fn already_managed() -> CoreError {
    CoreError::invalid_operation("property is already managed by a session")
}

/// A field of an [`Object`](crate::Object) as seen by the session.
///
/// Implemented by [`Persisted`](crate::Persisted), the collection types
/// ([`PersistedList`](crate::PersistedList), [`PersistedSet`](crate::PersistedSet),
/// [`PersistedMap`](crate::PersistedMap), [`LinkList`](crate::LinkList),
/// [`EmbeddedList`](crate::EmbeddedList)), [`Link`](crate::Link) and
/// [`Embedded`](crate::Embedded).
pub trait Property {
    /// Schema type of the property.
    fn property_type(&self) -> PropertyType;

    /// Returns true once the property is backed by a session row.
    fn is_managed(&self) -> bool;

    /// Writes the in-memory value into `slot` and becomes managed.
    ///
    /// Fails if the property is already managed.
    #[doc(hidden)]
    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()>;

    /// Becomes managed by `slot` without writing anything.
    #[doc(hidden)]
    fn bind(&mut self, slot: ManagedSlot);

    /// Engine form of the in-memory value, if unmanaged. Used for primary
    /// keys, which are written when the row is created.
    #[doc(hidden)]
    fn unmanaged_value(&self) -> Option<EngineValue>;
}
