//! Set properties.

use super::persistable::Persistable;
use super::state::{already_managed, ManagedSlot, Property, PropertyState};
use crate::error::{CoreError, CoreResult};
use crate::notifications::{CollectionChange, NotificationToken};
use crate::schema::PropertyType;
use rowbind_engine::EngineValue;
use std::cmp::Ordering;
use std::fmt;

/// An unordered collection of distinct scalars.
///
/// Elements are kept sorted by value, so indices are stable between
/// versions that do not change the set and [`PersistedSet::get`] walks the
/// set in order. Inserting a value already present does nothing.
///
/// # Example
///
/// ```rust,ignore
/// session.write(|| {
///     person.tags.insert("admin")?;
///     person.tags.insert("admin")
/// })?;
/// assert_eq!(person.tags.len()?, 1);
/// ```
pub struct PersistedSet<T: Persistable> {
    state: PropertyState<Vec<T>>,
}

fn order<T: Persistable>(a: &T, b: &T) -> Ordering {
    a.serialize().total_cmp(&b.serialize())
}

fn search<T: Persistable>(items: &[T], value: &T) -> Result<usize, usize> {
    let needle = value.serialize();
    items.binary_search_by(|item| item.serialize().total_cmp(&needle))
}

impl<T: Persistable> PersistedSet<T> {
    /// Creates an unmanaged set. Duplicates in `items` are dropped.
    #[must_use]
    pub fn new(mut items: Vec<T>) -> Self {
        items.sort_by(order);
        items.dedup_by(|a, b| order(a, b) == Ordering::Equal);
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

    /// Returns true if the set has no elements.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Element at `index` in sorted order.
    pub fn get(&self, index: usize) -> CoreResult<T> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let items = items.lock();
                items
                    .get(index)
                    .cloned()
                    .ok_or(CoreError::IndexOutOfBounds {
                        index,
                        len: items.len(),
                    })
            }
            PropertyState::Managed(slot) => T::deserialize(slot.list_get(index)?),
        }
    }

    /// Returns true if `value` is a member.
    pub fn contains(&self, value: &T) -> CoreResult<bool> {
        self.find(value).map(|index| index.is_some())
    }

    /// Sorted position of `value`, if it is a member.
    pub fn find(&self, value: &T) -> CoreResult<Option<usize>> {
        match &self.state {
            PropertyState::Unmanaged(items) => Ok(search(&items.lock(), value).ok()),
            PropertyState::Managed(slot) => slot.set_find(&value.serialize()),
        }
    }

    /// Adds `value`. Returns false if it was already a member.
    pub fn insert(&self, value: impl Into<T>) -> CoreResult<bool> {
        let value = value.into();
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                match search(&items, &value) {
                    Ok(_) => Ok(false),
                    Err(index) => {
                        items.insert(index, value);
                        Ok(true)
                    }
                }
            }
            PropertyState::Managed(slot) => slot.set_insert(value.serialize()),
        }
    }

    /// Removes `value`. Returns false if it was not a member.
    pub fn remove(&self, value: &T) -> CoreResult<bool> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                match search(&items, value) {
                    Ok(index) => {
                        items.remove(index);
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            }
            PropertyState::Managed(slot) => slot.set_remove(&value.serialize()),
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

    /// Copies the elements out in sorted order.
    pub fn to_vec(&self) -> CoreResult<Vec<T>> {
        match &self.state {
            PropertyState::Unmanaged(items) => Ok(items.lock().clone()),
            PropertyState::Managed(slot) => match slot.get()? {
                EngineValue::List(items) => items.into_iter().map(T::deserialize).collect(),
                other => Err(CoreError::type_mismatch("set", other.to_string())),
            },
        }
    }

    /// Returns true if every element of `other` is a member.
    pub fn is_superset(&self, other: &[T]) -> CoreResult<bool> {
        for value in other {
            if !self.contains(value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns true if any element of `other` is a member.
    pub fn intersects(&self, other: &[T]) -> CoreResult<bool> {
        for value in other {
            if self.contains(value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Observes the set.
    ///
    /// Indices refer to sorted positions. The first delivery is the initial,
    /// empty change.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(CollectionChange) + Send + 'static,
    {
        match &self.state {
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "only managed sets can be observed",
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

impl<T: Persistable> Property for PersistedSet<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::Set {
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

impl<T: Persistable> Default for PersistedSet<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Persistable> FromIterator<T> for PersistedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: Persistable + fmt::Debug> fmt::Debug for PersistedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state, f)
    }
}
