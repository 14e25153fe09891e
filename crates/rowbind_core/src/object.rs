//! Typed objects and their managed form.

use crate::bridge::{RowId, TableId};
use crate::error::CoreResult;
use crate::notifications::{NotificationToken, ObjectChange};
use crate::property::Property;
use crate::schema::{ObjectSchema, PropertyDescriptor};
use crate::session::{Session, SessionShared, TableBinding};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// A typed object stored in one table.
///
/// Implementors are plain structs whose fields are properties. The struct
/// itself is the unmanaged form; adding it to a session yields a
/// [`Managed`] wrapper whose properties read and write the stored row.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Dog {
///     name: Persisted<String>,
///     age: Persisted<i64>,
/// }
///
/// impl Object for Dog {
///     const NAME: &'static str = "Dog";
///
///     fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
///         vec![("name", &mut self.name), ("age", &mut self.age)]
///     }
/// }
/// ```
pub trait Object: Default + 'static {
    /// Table name.
    const NAME: &'static str;

    /// Name of the primary key property, if any.
    const PRIMARY_KEY: Option<&'static str> = None;

    /// Embedded objects live only inside a parent's embedded property.
    const EMBEDDED: bool = false;

    /// The object's properties in declaration order.
    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)>;

    /// Schema derived from the properties of a default instance.
    fn schema() -> ObjectSchema {
        let mut template = Self::default();
        let mut schema = if Self::EMBEDDED {
            ObjectSchema::embedded(Self::NAME)
        } else {
            ObjectSchema::new(Self::NAME)
        };
        for (name, property) in template.properties() {
            let descriptor = PropertyDescriptor::new(name, property.property_type());
            schema = schema.property(if Self::PRIMARY_KEY == Some(name) {
                descriptor.primary_key()
            } else {
                descriptor
            });
        }
        schema
    }
}

/// An object bound to a row of a live or frozen session.
///
/// Dereferences to the object type, whose properties are all managed.
/// Confined to the thread of its session; use a
/// [`ThreadSafeReference`](crate::ThreadSafeReference) to move it.
///
/// Only shared access is handed out. Property writes go through the
/// property's own methods, and a managed property cannot be swapped for an
/// unmanaged one:
///
/// ```compile_fail
/// fn replace<T: rowbind_core::Object>(managed: &mut rowbind_core::Managed<T>, value: T) {
///     *std::ops::DerefMut::deref_mut(managed) = value;
/// }
/// ```
pub struct Managed<T: Object> {
    object: T,
    shared: Arc<SessionShared>,
    binding: Arc<TableBinding>,
    row: RowId,
    _confined: PhantomData<*const ()>,
}

impl<T: Object> Managed<T> {
    pub(crate) fn new(
        object: T,
        shared: Arc<SessionShared>,
        binding: Arc<TableBinding>,
        row: RowId,
    ) -> Self {
        Self {
            object,
            shared,
            binding,
            row,
            _confined: PhantomData,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Row backing this object.
    #[must_use]
    pub fn row_id(&self) -> RowId {
        self.row
    }

    /// Table of the object.
    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.binding.table()
    }

    /// Returns false once the row is deleted or the session is closed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.shared
            .engine
            .row_exists(self.binding.table().into(), self.row.into())
            .unwrap_or(false)
    }

    /// The session this object belongs to.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::from_shared(Arc::clone(&self.shared))
    }

    /// Returns true if bound to a frozen session.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.shared.frozen
    }

    /// Returns a new instance bound to a frozen copy of the session.
    pub fn freeze(&self) -> CoreResult<Managed<T>> {
        if self.is_frozen() {
            return Ok(self.clone());
        }
        let frozen = self.session().freeze()?;
        frozen.shared().bind_object::<T>(self.row)
    }

    /// Returns a new instance bound to a live session on the same file.
    ///
    /// Fails with `StaleRow` if the row was deleted after the freeze.
    pub fn thaw(&self) -> CoreResult<Managed<T>> {
        if !self.is_frozen() {
            return Ok(self.clone());
        }
        let live = self.session().thaw()?;
        live.shared().bind_object::<T>(self.row)
    }

    /// Observes this object.
    ///
    /// The callback runs on the session's scheduler thread once per
    /// committed version that changed the row, and reports deletion once.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(ObjectChange<T>) + Send + 'static,
    {
        crate::notifications::observe_object(&self.shared, &self.binding, self.row, callback)
    }
}

impl<T: Object> Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Object> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self::new(
            self.binding.bind::<T>(&self.shared, self.row, false),
            Arc::clone(&self.shared),
            Arc::clone(&self.binding),
            self.row,
        )
    }
}

impl<T: Object> PartialEq for Managed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shared.engine.file_id() == other.shared.engine.file_id()
            && self.binding.table() == other.binding.table()
            && self.row == other.row
    }
}

impl<T: Object> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("type", &T::NAME)
            .field("row", &self.row)
            .field("frozen", &self.shared.frozen)
            .finish()
    }
}
