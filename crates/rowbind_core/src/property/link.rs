//! Link and embedded-object properties.

use super::state::{already_managed, ManagedSlot, Property};
use crate::bridge::RowId;
use crate::error::{CoreError, CoreResult};
use crate::object::{Managed, Object};
use crate::schema::PropertyType;
use crate::session::{EmbeddedPlacement, SessionShared};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rowbind_engine::EngineValue;
use std::fmt;
use std::sync::Arc;

pub(super) enum LinkTarget<T> {
    Object(Box<T>),
    Row(Arc<SessionShared>, RowId),
}

enum LinkState<T> {
    Unmanaged(Mutex<Option<LinkTarget<T>>>),
    Managed(ManagedSlot),
}

/// A nullable link to a top-level object.
///
/// Assigning a managed object copies only its row id; the target's fields
/// are never copied. An unmanaged target object is added to the session
/// together with the owner.
pub struct Link<T: Object> {
    state: LinkState<T>,
}

pub(super) fn check_same_file(shared: &SessionShared, target: &SessionShared) -> CoreResult<()> {
    if shared.engine.file_id() == target.engine.file_id() {
        Ok(())
    } else {
        Err(CoreError::IncompatibleSession {
            message: "linked object belongs to a different file".to_string(),
        })
    }
}

impl<T: Object> Link<T> {
    /// Creates an unmanaged link to an unmanaged object.
    #[must_use]
    pub fn new(target: T) -> Self {
        Self {
            state: LinkState::Unmanaged(Mutex::new(Some(LinkTarget::Object(Box::new(target))))),
        }
    }

    /// Creates an unmanaged link to a managed object.
    #[must_use]
    pub fn to(target: &Managed<T>) -> Self {
        Self {
            state: LinkState::Unmanaged(Mutex::new(Some(LinkTarget::Row(
                Arc::clone(target.shared()),
                target.row_id(),
            )))),
        }
    }

    /// The linked object, bound to the session.
    ///
    /// Returns `None` for a null link and for an unmanaged link holding an
    /// unmanaged object; see [`Link::unmanaged`] for the latter.
    pub fn get(&self) -> CoreResult<Option<Managed<T>>> {
        match &self.state {
            LinkState::Managed(slot) => match slot.get()? {
                EngineValue::Link(row) => slot.shared.bind_object::<T>(row.into()).map(Some),
                _ => Ok(None),
            },
            LinkState::Unmanaged(current) => {
                let bound = match &*current.lock() {
                    Some(LinkTarget::Row(shared, row)) => Some((Arc::clone(shared), *row)),
                    _ => None,
                };
                match bound {
                    Some((shared, row)) => shared.bind_object::<T>(row).map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    /// The unmanaged object held by an unmanaged link.
    ///
    /// The returned guard locks the link; drop it before changing the link.
    #[must_use]
    pub fn unmanaged(&self) -> Option<MappedMutexGuard<'_, T>> {
        match &self.state {
            LinkState::Unmanaged(current) => {
                MutexGuard::try_map(current.lock(), |target| match target {
                    Some(LinkTarget::Object(object)) => Some(&mut **object),
                    _ => None,
                })
                .ok()
            }
            LinkState::Managed(_) => None,
        }
    }

    /// Points the link at `target`, or clears it.
    pub fn set(&self, target: Option<&Managed<T>>) -> CoreResult<()> {
        match &self.state {
            LinkState::Managed(slot) => {
                let value = match target {
                    Some(target) => {
                        check_same_file(&slot.shared, target.shared())?;
                        EngineValue::Link(target.row_id().into())
                    }
                    None => EngineValue::Null,
                };
                slot.set(value)
            }
            LinkState::Unmanaged(current) => {
                *current.lock() = target.map(|t| LinkTarget::Row(Arc::clone(t.shared()), t.row_id()));
                Ok(())
            }
        }
    }

    /// Points the link at an unmanaged object. On a managed link the object
    /// is added to the session first.
    pub fn set_object(&self, target: T) -> CoreResult<()> {
        match &self.state {
            LinkState::Managed(slot) => {
                let added = slot.shared.add_object(target)?;
                slot.set(EngineValue::Link(added.row_id().into()))
            }
            LinkState::Unmanaged(current) => {
                *current.lock() = Some(LinkTarget::Object(Box::new(target)));
                Ok(())
            }
        }
    }

    /// Returns true if the link points nowhere.
    pub fn is_null(&self) -> CoreResult<bool> {
        match &self.state {
            LinkState::Managed(slot) => Ok(slot.get()?.is_null()),
            LinkState::Unmanaged(current) => Ok(current.lock().is_none()),
        }
    }
}

impl<T: Object> Property for Link<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::Link(T::NAME)
    }

    fn is_managed(&self) -> bool {
        matches!(self.state, LinkState::Managed(_))
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let LinkState::Unmanaged(current) = &mut self.state else {
            return Err(already_managed());
        };
        match current.get_mut().take() {
            None => slot.set(EngineValue::Null)?,
            Some(LinkTarget::Object(object)) => {
                let added = slot.shared.add_object(*object)?;
                slot.set(EngineValue::Link(added.row_id().into()))?;
            }
            Some(LinkTarget::Row(shared, row)) => {
                check_same_file(&slot.shared, &shared)?;
                slot.set(EngineValue::Link(row.into()))?;
            }
        }
        self.state = LinkState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = LinkState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        None
    }
}

impl<T: Object> Default for Link<T> {
    fn default() -> Self {
        Self {
            state: LinkState::Unmanaged(Mutex::new(None)),
        }
    }
}

impl<T: Object> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = match &self.state {
            LinkState::Managed(slot) => return f.debug_tuple("Link").field(slot).finish(),
            LinkState::Unmanaged(current) => current.lock(),
        };
        match &*current {
            None => f.write_str("Link(null)"),
            Some(LinkTarget::Object(_)) => write!(f, "Link(unmanaged {})", T::NAME),
            Some(LinkTarget::Row(_, row)) => write!(f, "Link({} {row})", T::NAME),
        }
    }
}

enum EmbeddedState<T> {
    Unmanaged(Mutex<Option<Box<T>>>),
    Managed(ManagedSlot),
}

/// An owned embedded object.
///
/// Assigning an object to a managed embedded property creates a new
/// embedded row and copies the object's fields into it. The previous
/// embedded row, if any, is deleted.
pub struct Embedded<T: Object> {
    state: EmbeddedState<T>,
}

impl<T: Object> Embedded<T> {
    /// Creates an unmanaged embedded property holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: EmbeddedState::Unmanaged(Mutex::new(Some(Box::new(value)))),
        }
    }

    /// The embedded object, bound to the session. `None` when unset or
    /// unmanaged.
    pub fn get(&self) -> CoreResult<Option<Managed<T>>> {
        match &self.state {
            EmbeddedState::Managed(slot) => match slot.get()? {
                EngineValue::Link(row) => slot.shared.bind_object::<T>(row.into()).map(Some),
                _ => Ok(None),
            },
            EmbeddedState::Unmanaged(_) => Ok(None),
        }
    }

    /// The in-memory object of an unmanaged property.
    ///
    /// The returned guard locks the property; drop it before calling
    /// [`Embedded::set`].
    #[must_use]
    pub fn unmanaged(&self) -> Option<MappedMutexGuard<'_, T>> {
        match &self.state {
            EmbeddedState::Unmanaged(value) => {
                MutexGuard::try_map(value.lock(), |value| value.as_deref_mut()).ok()
            }
            EmbeddedState::Managed(_) => None,
        }
    }

    /// Mutable access to the in-memory object of an unmanaged property.
    pub fn unmanaged_mut(&mut self) -> Option<&mut T> {
        match &mut self.state {
            EmbeddedState::Unmanaged(value) => value.get_mut().as_deref_mut(),
            EmbeddedState::Managed(_) => None,
        }
    }

    /// Replaces the embedded object, or clears it.
    ///
    /// # Panics
    ///
    /// Panics if `value` has managed properties. An embedded object can only
    /// be assigned from an unmanaged value.
    pub fn set(&self, value: Option<T>) -> CoreResult<()> {
        match &self.state {
            EmbeddedState::Managed(slot) => match value {
                Some(value) => {
                    let value = assert_unmanaged(value);
                    slot.shared
                        .create_embedded(slot, EmbeddedPlacement::Column, value)
                        .map(|_| ())
                }
                None => slot.set(EngineValue::Null),
            },
            EmbeddedState::Unmanaged(current) => {
                *current.lock() = value.map(Box::new);
                Ok(())
            }
        }
    }

    /// Returns true if no object is embedded.
    pub fn is_null(&self) -> CoreResult<bool> {
        match &self.state {
            EmbeddedState::Managed(slot) => Ok(slot.get()?.is_null()),
            EmbeddedState::Unmanaged(current) => Ok(current.lock().is_none()),
        }
    }
}

pub(super) fn assert_unmanaged<T: Object>(mut value: T) -> T {
    let managed = value.properties().iter().any(|(_, p)| p.is_managed());
    assert!(
        !managed,
        "cannot assign an already managed {} to an embedded property; assign an unmanaged copy",
        T::NAME
    );
    value
}

impl<T: Object> Property for Embedded<T> {
    fn property_type(&self) -> PropertyType {
        PropertyType::Embedded(T::NAME)
    }

    fn is_managed(&self) -> bool {
        matches!(self.state, EmbeddedState::Managed(_))
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let EmbeddedState::Unmanaged(current) = &mut self.state else {
            return Err(already_managed());
        };
        match current.get_mut().take() {
            Some(value) => {
                let value = assert_unmanaged(*value);
                slot.shared
                    .create_embedded(&slot, EmbeddedPlacement::Column, value)?;
            }
            None => slot.set(EngineValue::Null)?,
        }
        self.state = EmbeddedState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = EmbeddedState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        None
    }
}

impl<T: Object> Default for Embedded<T> {
    fn default() -> Self {
        Self {
            state: EmbeddedState::Unmanaged(Mutex::new(None)),
        }
    }
}

impl<T: Object + fmt::Debug> fmt::Debug for Embedded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            EmbeddedState::Managed(slot) => f.debug_tuple("Embedded").field(slot).finish(),
            EmbeddedState::Unmanaged(value) => {
                f.debug_tuple("Embedded").field(&*value.lock()).finish()
            }
        }
    }
}
