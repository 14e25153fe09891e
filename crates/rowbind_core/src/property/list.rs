//! List properties.

use super::persistable::Persistable;
use super::state::{already_managed, ManagedSlot, Property, PropertyState};
use crate::error::{CoreError, CoreResult};
use crate::notifications::{CollectionChange, NotificationToken};
use crate::schema::PropertyType;
use rowbind_engine::EngineValue;
use std::fmt;

/// An ordered list of scalars.
///
/// Managed lists issue one engine primitive per element operation and never
/// materialize the whole list to change one element.
pub struct PersistedList<T: Persistable> {
    state: PropertyState<Vec<T>>,
}

fn out_of_bounds(index: usize, len: usize) -> CoreError {
    CoreError::IndexOutOfBounds { index, len }
}

impl<T: Persistable> PersistedList<T> {
    /// Creates an unmanaged list.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            state: PropertyState::unmanaged(items),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> CoreResult<usize> {
        match &self.state {
            PropertyState::Unmanaged(items) => Ok(items.lock().len()),
            PropertyState::Managed(slot) => slot.list_len(),
        }
    }

    /// Returns true if the list has no elements.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> CoreResult<T> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let items = items.lock();
                items
                    .get(index)
                    .cloned()
                    .ok_or_else(|| out_of_bounds(index, items.len()))
            }
            PropertyState::Managed(slot) => T::deserialize(slot.list_get(index)?),
        }
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<T>) -> CoreResult<()> {
        let value = value.into();
        match &self.state {
            PropertyState::Unmanaged(items) => {
                items.lock().push(value);
                Ok(())
            }
            PropertyState::Managed(slot) => {
                let len = slot.list_len()?;
                slot.list_insert(len, value.serialize())
            }
        }
    }

    /// Inserts an element at `index`, shifting later elements.
    pub fn insert(&self, index: usize, value: impl Into<T>) -> CoreResult<()> {
        let value = value.into();
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index > items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                items.insert(index, value);
                Ok(())
            }
            PropertyState::Managed(slot) => slot.list_insert(index, value.serialize()),
        }
    }

    /// Replaces the element at `index`.
    pub fn set(&self, index: usize, value: impl Into<T>) -> CoreResult<()> {
        let value = value.into();
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                let len = items.len();
                let item = items.get_mut(index).ok_or_else(|| out_of_bounds(index, len))?;
                *item = value;
                Ok(())
            }
            PropertyState::Managed(slot) => slot.list_set(index, value.serialize()),
        }
    }

    /// Removes and returns the element at `index`.
    pub fn remove(&self, index: usize) -> CoreResult<T> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index >= items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                Ok(items.remove(index))
            }
            PropertyState::Managed(slot) => T::deserialize(slot.list_remove(index)?),
        }
    }

    /// Removes every element.
    pub fn clear(&self) -> CoreResult<()> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                items.lock().clear();
                Ok(())
            }
            PropertyState::Managed(slot) => slot.list_clear(),
        }
    }

    /// Copies the elements out.
    pub fn to_vec(&self) -> CoreResult<Vec<T>> {
        match &self.state {
            PropertyState::Unmanaged(items) => Ok(items.lock().clone()),
            PropertyState::Managed(slot) => match slot.get()? {
                EngineValue::List(items) => items.into_iter().map(T::deserialize).collect(),
                other => Err(CoreError::type_mismatch("list", other.to_string())),
            },
        }
    }

    /// Index of the first element equal to `value`.
    pub fn find(&self, value: &T) -> CoreResult<Option<usize>> {
        let needle = value.serialize();
        match &self.state {
            PropertyState::Unmanaged(items) => Ok(items
                .lock()
                .iter()
                .position(|item| item.serialize().equals(&needle))),
            PropertyState::Managed(slot) => {
                for index in 0..slot.list_len()? {
                    if slot.list_get(index)?.equals(&needle) {
                        return Ok(Some(index));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Observes the list.
    ///
    /// The first delivery is the initial, empty change. Later deliveries
    /// carry the indices deleted, inserted and modified by each version.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(CollectionChange) + Send + 'static,
    {
        match &self.state {
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "only managed lists can be observed",
            )),
            PropertyState::Managed(slot) => {
                slot.check()?;
                crate::notifications::observe_collection::<CollectionChange, _>(
                    &slot.shared,
                    slot.list_target(),
                    callback,
                )
            }
        }
    }
}

impl<T: Persistable> Property for PersistedList<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::List {
            element: T::TYPE,
            nullable: T::NULLABLE,
        }
    }

    fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let PropertyState::Unmanaged(items) = &self.state else {
            return Err(already_managed());
        };
        slot.set(EngineValue::List(items.lock().iter().map(Persistable::serialize).collect()))?;
        self.state = PropertyState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = PropertyState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        match &self.state {
            PropertyState::Unmanaged(items) => Some(EngineValue::List(
                items.lock().iter().map(Persistable::serialize).collect(),
            )),
            PropertyState::Managed(_) => None,
        }
    }
}

impl<T: Persistable> Default for PersistedList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Persistable> From<Vec<T>> for PersistedList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: Persistable + fmt::Debug> fmt::Debug for PersistedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state, f)
    }
}
