//! Dictionary properties.

use super::persistable::Persistable;
use super::state::{already_managed, ManagedSlot, Property, PropertyState};
use crate::error::{CoreError, CoreResult};
use crate::notifications::{DictionaryChange, NotificationToken};
use crate::schema::PropertyType;
use rowbind_engine::EngineValue;
use std::collections::BTreeMap;
use std::fmt;

/// Scalars keyed by string.
///
/// Managed dictionaries read and write one key at a time; only
/// [`PersistedMap::to_map`] copies the whole dictionary.
pub struct PersistedMap<T: Persistable> {
    state: PropertyState<BTreeMap<String, T>>,
}

fn serialize_all<T: Persistable>(entries: &BTreeMap<String, T>) -> EngineValue {
    EngineValue::Map(
        entries
            .iter()
            .map(|(key, value)| (key.clone(), value.serialize()))
            .collect(),
    )
}

impl<T: Persistable> PersistedMap<T> {
    /// Creates an unmanaged dictionary.
    #[must_use]
    pub fn new(entries: BTreeMap<String, T>) -> Self {
        Self {
            state: PropertyState::unmanaged(entries),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> CoreResult<usize> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().len()),
            PropertyState::Managed(slot) => slot.dictionary_len(),
        }
    }

    /// Returns true if the dictionary has no entries.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> CoreResult<Option<T>> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().get(key).cloned()),
            PropertyState::Managed(slot) => slot
                .dictionary_get(key)?
                .map(T::deserialize)
                .transpose(),
        }
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> CoreResult<bool> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().contains_key(key)),
            PropertyState::Managed(slot) => Ok(slot.dictionary_get(key)?.is_some()),
        }
    }

    /// Stores `value` under `key` and returns the value it replaced.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<T>) -> CoreResult<Option<T>> {
        let (key, value) = (key.into(), value.into());
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().insert(key, value)),
            PropertyState::Managed(slot) => slot
                .dictionary_insert(key, value.serialize())?
                .map(T::deserialize)
                .transpose(),
        }
    }

    /// Removes `key` and returns its value.
    pub fn remove(&self, key: &str) -> CoreResult<Option<T>> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().remove(key)),
            PropertyState::Managed(slot) => {
                slot.dictionary_remove(key)?.map(T::deserialize).transpose()
            }
        }
    }

    /// Removes every entry.
    pub fn clear(&self) -> CoreResult<()> {
        match &self.state {
            PropertyState::Unmanaged(entries) => {
                entries.lock().clear();
                Ok(())
            }
            PropertyState::Managed(slot) => slot.dictionary_clear(),
        }
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().keys().cloned().collect()),
            PropertyState::Managed(slot) => slot.dictionary_keys(),
        }
    }

    /// Copies the entries out.
    pub fn to_map(&self) -> CoreResult<BTreeMap<String, T>> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Ok(entries.lock().clone()),
            PropertyState::Managed(slot) => match slot.get()? {
                EngineValue::Map(entries) => entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, T::deserialize(value)?)))
                    .collect(),
                other => Err(CoreError::type_mismatch("dictionary", other.to_string())),
            },
        }
    }

    /// Observes the dictionary.
    ///
    /// The first delivery is the initial, empty change. Later deliveries
    /// name the keys deleted, inserted and modified by each version.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(DictionaryChange) + Send + 'static,
    {
        match &self.state {
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "only managed dictionaries can be observed",
            )),
            PropertyState::Managed(slot) => {
                slot.check()?;
                crate::notifications::observe_collection::<DictionaryChange, _>(
                    &slot.shared,
                    slot.dictionary_target(),
                    callback,
                )
            }
        }
    }
}

impl<T: Persistable> Property for PersistedMap<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::Dictionary {
            element: T::TYPE,
            nullable: T::NULLABLE,
        }
    }

    fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let PropertyState::Unmanaged(entries) = &self.state else {
            return Err(already_managed());
        };
        slot.set(serialize_all(&entries.lock()))?;
        self.state = PropertyState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = PropertyState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        match &self.state {
            PropertyState::Unmanaged(entries) => Some(serialize_all(&entries.lock())),
            PropertyState::Managed(_) => None,
        }
    }
}

impl<T: Persistable> Default for PersistedMap<T> {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl<T: Persistable> From<BTreeMap<String, T>> for PersistedMap<T> {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Self::new(entries)
    }
}

impl<T: Persistable + fmt::Debug> fmt::Debug for PersistedMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state, f)
    }
}
