//! Lists of links and lists of embedded objects.

use super::link::{assert_unmanaged, check_same_file, LinkTarget};
use super::state::{already_managed, ManagedSlot, Property, PropertyState};
use crate::error::{CoreError, CoreResult};
use crate::notifications::{CollectionChange, NotificationToken};
use crate::object::{Managed, Object};
use crate::schema::PropertyType;
use crate::session::EmbeddedPlacement;
use parking_lot::{MappedMutexGuard, MutexGuard};
use rowbind_engine::EngineValue;
use std::fmt;
use std::sync::Arc;

fn out_of_bounds(index: usize, len: usize) -> CoreError {
    CoreError::IndexOutOfBounds { index, len }
}

fn bind_element<T: Object>(slot: &ManagedSlot, value: EngineValue) -> CoreResult<Managed<T>> {
    match value {
        EngineValue::Link(row) => slot.shared.bind_object::<T>(row.into()),
        other => Err(CoreError::type_mismatch("link", other.to_string())),
    }
}

fn observe_list<F>(slot: &ManagedSlot, callback: F) -> CoreResult<NotificationToken>
where
    F: FnMut(CollectionChange) + Send + 'static,
{
    slot.check()?;
    crate::notifications::observe_collection::<CollectionChange, _>(
        &slot.shared,
        slot.list_target(),
        callback,
    )
}

/// An ordered list of links to top-level objects.
///
/// Elements may repeat. Deleting a linked object removes it from every
/// list that links to it.
///
/// # Example
///
/// ```rust,ignore
/// session.write(|| {
///     owner.dogs.push(&rex)?;
///     owner.dogs.push_object(Dog::named("Fido"))
/// })?;
/// assert_eq!(owner.dogs.get(1)?.name.read()?, "Fido");
/// ```
pub struct LinkList<T: Object> {
    state: PropertyState<Vec<LinkTarget<T>>>,
}

impl<T: Object> LinkList<T> {
    /// Creates an unmanaged list of unmanaged objects. They are added to
    /// the session together with the owner.
    #[must_use]
    pub fn new(objects: Vec<T>) -> Self {
        Self {
            state: PropertyState::unmanaged(
                objects
                    .into_iter()
                    .map(|object| LinkTarget::Object(Box::new(object)))
                    .collect(),
            ),
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

    /// The object linked at `index`, bound to the session.
    ///
    /// An unmanaged list holding an unmanaged object at `index` fails with
    /// `InvalidOperation`; see [`LinkList::unmanaged`].
    pub fn get(&self, index: usize) -> CoreResult<Managed<T>> {
        match &self.state {
            PropertyState::Managed(slot) => bind_element(slot, slot.list_get(index)?),
            PropertyState::Unmanaged(items) => {
                let bound = {
                    let items = items.lock();
                    match items.get(index) {
                        Some(LinkTarget::Row(shared, row)) => (Arc::clone(shared), *row),
                        Some(LinkTarget::Object(_)) => {
                            return Err(CoreError::invalid_operation(format!(
                                "element {index} is an unmanaged {}",
                                T::NAME
                            )))
                        }
                        None => return Err(out_of_bounds(index, items.len())),
                    }
                };
                bound.0.bind_object::<T>(bound.1)
            }
        }
    }

    /// The unmanaged object at `index` of an unmanaged list.
    #[must_use]
    pub fn unmanaged(&self, index: usize) -> Option<MappedMutexGuard<'_, T>> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                MutexGuard::try_map(items.lock(), |items| match items.get_mut(index) {
                    Some(LinkTarget::Object(object)) => Some(&mut **object),
                    _ => None,
                })
                .ok()
            }
            PropertyState::Managed(_) => None,
        }
    }

    fn link_to(slot: &ManagedSlot, target: &Managed<T>) -> CoreResult<EngineValue> {
        check_same_file(&slot.shared, target.shared())?;
        Ok(EngineValue::Link(target.row_id().into()))
    }

    /// Appends a link to `target`.
    pub fn push(&self, target: &Managed<T>) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => {
                let link = Self::link_to(slot, target)?;
                slot.list_insert(slot.list_len()?, link)
            }
            PropertyState::Unmanaged(items) => {
                items
                    .lock()
                    .push(LinkTarget::Row(Arc::clone(target.shared()), target.row_id()));
                Ok(())
            }
        }
    }

    /// Appends an unmanaged object. On a managed list the object is added
    /// to the session first.
    pub fn push_object(&self, target: T) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => {
                let len = slot.list_len()?;
                let added = slot.shared.add_object(target)?;
                slot.list_insert(len, EngineValue::Link(added.row_id().into()))
            }
            PropertyState::Unmanaged(items) => {
                items.lock().push(LinkTarget::Object(Box::new(target)));
                Ok(())
            }
        }
    }

    /// Inserts a link to `target` at `index`.
    pub fn insert(&self, index: usize, target: &Managed<T>) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_insert(index, Self::link_to(slot, target)?),
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index > items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                items.insert(
                    index,
                    LinkTarget::Row(Arc::clone(target.shared()), target.row_id()),
                );
                Ok(())
            }
        }
    }

    /// Points the element at `index` at `target`.
    pub fn set(&self, index: usize, target: &Managed<T>) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_set(index, Self::link_to(slot, target)?),
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                let len = items.len();
                let item = items.get_mut(index).ok_or_else(|| out_of_bounds(index, len))?;
                *item = LinkTarget::Row(Arc::clone(target.shared()), target.row_id());
                Ok(())
            }
        }
    }

    /// Removes the element at `index`. The linked object is not deleted.
    pub fn remove(&self, index: usize) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_remove(index).map(|_| ()),
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index >= items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                items.remove(index);
                Ok(())
            }
        }
    }

    /// Removes every element.
    pub fn clear(&self) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_clear(),
            PropertyState::Unmanaged(items) => {
                items.lock().clear();
                Ok(())
            }
        }
    }

    /// Index of the first link to `target`.
    pub fn find(&self, target: &Managed<T>) -> CoreResult<Option<usize>> {
        let row = target.row_id();
        match &self.state {
            PropertyState::Managed(slot) => {
                let needle = EngineValue::Link(row.into());
                for index in 0..slot.list_len()? {
                    if slot.list_get(index)?.equals(&needle) {
                        return Ok(Some(index));
                    }
                }
                Ok(None)
            }
            PropertyState::Unmanaged(items) => Ok(items.lock().iter().position(|item| {
                matches!(item, LinkTarget::Row(shared, r) if *r == row && Arc::ptr_eq(shared, target.shared()))
            })),
        }
    }

    /// Observes the list. The first delivery is the initial, empty change.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(CollectionChange) + Send + 'static,
    {
        match &self.state {
            PropertyState::Managed(slot) => observe_list(slot, callback),
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "only managed lists can be observed",
            )),
        }
    }
}

impl<T: Object> Property for LinkList<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::LinkList(T::NAME)
    }

    fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let PropertyState::Unmanaged(items) = &mut self.state else {
            return Err(already_managed());
        };
        let mut links = Vec::new();
        for item in std::mem::take(items.get_mut()) {
            let row = match item {
                LinkTarget::Object(object) => slot.shared.add_object(*object)?.row_id(),
                LinkTarget::Row(shared, row) => {
                    check_same_file(&slot.shared, &shared)?;
                    row
                }
            };
            links.push(EngineValue::Link(row.into()));
        }
        slot.set(EngineValue::List(links))?;
        self.state = PropertyState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = PropertyState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        None
    }
}

impl<T: Object> Default for LinkList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Object> fmt::Debug for LinkList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            PropertyState::Managed(slot) => f.debug_tuple("LinkList").field(slot).finish(),
            PropertyState::Unmanaged(items) => {
                write!(f, "LinkList({} x{})", T::NAME, items.lock().len())
            }
        }
    }
}

/// An ordered list of owned embedded objects.
///
/// Each element is its own embedded row. Removing or replacing an element
/// deletes its row, and deleting the owner deletes them all.
pub struct EmbeddedList<T: Object> {
    state: PropertyState<Vec<T>>,
}

impl<T: Object> EmbeddedList<T> {
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

    /// The embedded object at `index`, bound to the session.
    pub fn get(&self, index: usize) -> CoreResult<Managed<T>> {
        match &self.state {
            PropertyState::Managed(slot) => bind_element(slot, slot.list_get(index)?),
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "elements of an unmanaged embedded list are not bound to a session",
            )),
        }
    }

    /// The in-memory object at `index` of an unmanaged list.
    #[must_use]
    pub fn unmanaged(&self, index: usize) -> Option<MappedMutexGuard<'_, T>> {
        match &self.state {
            PropertyState::Unmanaged(items) => {
                MutexGuard::try_map(items.lock(), |items| items.get_mut(index)).ok()
            }
            PropertyState::Managed(_) => None,
        }
    }

    fn place(slot: &ManagedSlot, placement: EmbeddedPlacement, value: T) -> CoreResult<()> {
        let value = assert_unmanaged(value);
        slot.shared
            .create_embedded(slot, placement, value)
            .map(|_| ())
    }

    /// Appends a copy of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` has managed properties.
    pub fn push(&self, value: T) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => {
                let len = slot.list_len()?;
                Self::place(slot, EmbeddedPlacement::Insert(len), value)
            }
            PropertyState::Unmanaged(items) => {
                items.lock().push(value);
                Ok(())
            }
        }
    }

    /// Inserts a copy of `value` at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `value` has managed properties.
    pub fn insert(&self, index: usize, value: T) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => {
                let len = slot.list_len()?;
                if index > len {
                    return Err(out_of_bounds(index, len));
                }
                Self::place(slot, EmbeddedPlacement::Insert(index), value)
            }
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index > items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                items.insert(index, value);
                Ok(())
            }
        }
    }

    /// Replaces the element at `index` with a copy of `value`. The old
    /// embedded row is deleted.
    ///
    /// # Panics
    ///
    /// Panics if `value` has managed properties.
    pub fn set(&self, index: usize, value: T) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => {
                let len = slot.list_len()?;
                if index >= len {
                    return Err(out_of_bounds(index, len));
                }
                Self::place(slot, EmbeddedPlacement::Replace(index), value)
            }
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                let len = items.len();
                let item = items.get_mut(index).ok_or_else(|| out_of_bounds(index, len))?;
                *item = value;
                Ok(())
            }
        }
    }

    /// Removes the element at `index` and deletes its embedded row.
    pub fn remove(&self, index: usize) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_remove(index).map(|_| ()),
            PropertyState::Unmanaged(items) => {
                let mut items = items.lock();
                if index >= items.len() {
                    return Err(out_of_bounds(index, items.len()));
                }
                items.remove(index);
                Ok(())
            }
        }
    }

    /// Removes every element.
    pub fn clear(&self) -> CoreResult<()> {
        match &self.state {
            PropertyState::Managed(slot) => slot.list_clear(),
            PropertyState::Unmanaged(items) => {
                items.lock().clear();
                Ok(())
            }
        }
    }

    /// Observes the list. Changes inside an element's own row are not
    /// reported; observe the element for those.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(CollectionChange) + Send + 'static,
    {
        match &self.state {
            PropertyState::Managed(slot) => observe_list(slot, callback),
            PropertyState::Unmanaged(_) => Err(CoreError::invalid_operation(
                "only managed lists can be observed",
            )),
        }
    }
}

impl<T: Object> Property for EmbeddedList<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::EmbeddedList(T::NAME)
    }

    fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let PropertyState::Unmanaged(items) = &mut self.state else {
            return Err(already_managed());
        };
        let items = std::mem::take(items.get_mut());
        slot.set(EngineValue::List(Vec::new()))?;
        for (index, value) in items.into_iter().enumerate() {
            Self::place(&slot, EmbeddedPlacement::Insert(index), value)?;
        }
        self.state = PropertyState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = PropertyState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        None
    }
}

impl<T: Object> Default for EmbeddedList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Object + fmt::Debug> fmt::Debug for EmbeddedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Persisted;

    #[derive(Debug, Default)]
    struct Room {
        size: Persisted<i64>,
    }

    impl Object for Room {
        const NAME: &'static str = "Room";
        const EMBEDDED: bool = true;

        fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
            vec![("size", &mut self.size)]
        }
    }

    #[derive(Debug, Default)]
    struct Dog {
        name: Persisted<String>,
    }

    impl Object for Dog {
        const NAME: &'static str = "Dog";

        fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
            vec![("name", &mut self.name)]
        }
    }

    fn room(size: i64) -> Room {
        Room {
            size: Persisted::new(size),
        }
    }

    #[test]
    fn unmanaged_embedded_list_ops() {
        let rooms = EmbeddedList::new(vec![room(10)]);
        rooms.push(room(30)).unwrap();
        rooms.insert(1, room(20)).unwrap();
        rooms.set(0, room(11)).unwrap();
        assert_eq!(rooms.len().unwrap(), 3);
        let sizes: Vec<i64> = (0..3)
            .map(|i| rooms.unmanaged(i).unwrap().size.read().unwrap())
            .collect();
        assert_eq!(sizes, vec![11, 20, 30]);

        rooms.remove(1).unwrap();
        assert!(rooms.unmanaged(2).is_none());
        assert!(matches!(rooms.get(0), Err(CoreError::InvalidOperation { .. })));
        assert!(rooms.insert(9, room(0)).is_err());
        rooms.clear().unwrap();
        assert!(rooms.is_empty().unwrap());
        assert_eq!(rooms.property_type(), PropertyType::EmbeddedList("Room"));
    }

    #[test]
    fn unmanaged_link_list_holds_objects() {
        let dogs = LinkList::new(vec![Dog::default()]);
        dogs.push_object(Dog {
            name: Persisted::new("Rex".to_string()),
        })
        .unwrap();
        assert_eq!(dogs.len().unwrap(), 2);
        assert_eq!(dogs.unmanaged(1).unwrap().name.read().unwrap(), "Rex");
        assert!(dogs.get(0).is_err());
        assert!(dogs.remove(5).is_err());
        assert!(dogs.observe(|_| {}).is_err());
        assert_eq!(dogs.property_type(), PropertyType::LinkList("Dog"));
        assert_eq!(format!("{dogs:?}"), "LinkList(Dog x2)");
    }
}
