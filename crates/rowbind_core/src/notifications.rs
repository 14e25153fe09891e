//! Change notifications.
//!
//! Each subscription registers one engine observer on the session. The
//! engine computes raw change sets when the session advances; the session
//! only advances for notifications inside a task on its scheduler, so
//! callbacks always run on the scheduler's thread, once per delivered
//! version, and never inside a write.
//!
//! Cancelling a [`NotificationToken`] waits for a delivery running on
//! another thread to finish. Once `cancel` returns, the callback is never
//! invoked again.

use crate::bridge::RowId;
use crate::error::CoreResult;
use crate::object::{Managed, Object};
use crate::property::PropertyValue;
use crate::session::{SessionShared, TableBinding};
use parking_lot::{Condvar, Mutex};
use rowbind_engine::{ObserveTarget, ObserverId, RawChangeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::warn;

/// Changes to an observed collection between two versions.
///
/// Deletions index the previous state; insertions and modifications index
/// the new state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionChange {
    /// Indices removed.
    pub deletions: Vec<usize>,
    /// Indices added.
    pub insertions: Vec<usize>,
    /// Indices whose contents changed.
    pub modifications: Vec<usize>,
    /// The object owning an observed list was deleted.
    pub root_was_deleted: bool,
}

impl CollectionChange {
    /// Returns true for the initial notification and other empty changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && !self.root_was_deleted
    }
}

/// Changes to an observed dictionary between two versions, by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DictionaryChange {
    /// Keys removed.
    pub deletions: Vec<String>,
    /// Keys added.
    pub insertions: Vec<String>,
    /// Keys whose values changed.
    pub modifications: Vec<String>,
    /// The object owning the dictionary was deleted.
    pub root_was_deleted: bool,
}

impl DictionaryChange {
    /// Returns true for the initial notification and other empty changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && !self.root_was_deleted
    }
}

/// A change delivered to a collection observer.
pub(crate) trait CollectionDelta: Default + Send + 'static {
    fn from_raw(changes: &RawChangeSet) -> Self;
}

impl CollectionDelta for CollectionChange {
    fn from_raw(changes: &RawChangeSet) -> Self {
        Self {
            deletions: changes.deletions.iter().collect(),
            insertions: changes.insertions.iter().collect(),
            modifications: changes.modifications.iter().collect(),
            root_was_deleted: changes.root_deleted,
        }
    }
}

impl CollectionDelta for DictionaryChange {
    fn from_raw(changes: &RawChangeSet) -> Self {
        Self {
            deletions: changes.key_deletions.clone(),
            insertions: changes.key_insertions.clone(),
            modifications: changes.key_modifications.clone(),
            root_was_deleted: changes.root_deleted,
        }
    }
}

/// One changed property of an observed object.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Property name.
    pub name: &'static str,
    /// Value before the change.
    pub old_value: Option<PropertyValue>,
    /// Value after the change.
    pub new_value: Option<PropertyValue>,
}

/// Changes to an observed object.
pub struct ObjectChange<T: Object> {
    /// The object at the new version. `None` once deleted.
    pub object: Option<Managed<T>>,
    /// The object was deleted.
    pub is_deleted: bool,
    /// Properties whose values changed.
    pub property_changes: Vec<PropertyChange>,
}

impl<T: Object> fmt::Debug for ObjectChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectChange")
            .field("object", &self.object)
            .field("is_deleted", &self.is_deleted)
            .field("property_changes", &self.property_changes)
            .finish()
    }
}

type Callback<A> = Box<dyn FnMut(A) + Send>;

struct SubscriptionState<A> {
    callback: Option<Callback<A>>,
    cancelled: bool,
    in_flight: Option<ThreadId>,
}

/// A callback shared between its token and the engine observer.
struct Subscription<A> {
    state: Mutex<SubscriptionState<A>>,
    idle: Condvar,
    initial_pending: AtomicBool,
}

impl<A> Subscription<A> {
    fn new(callback: Callback<A>, initial: bool) -> Self {
        Self {
            state: Mutex::new(SubscriptionState {
                callback: Some(callback),
                cancelled: false,
                in_flight: None,
            }),
            idle: Condvar::new(),
            initial_pending: AtomicBool::new(initial),
        }
    }

    /// Runs the callback unless cancelled. A callback that panics is
    /// logged and kept; other subscriptions are unaffected.
    fn deliver(&self, change: A) {
        let mut callback = {
            let mut state = self.state.lock();
            if state.cancelled {
                return;
            }
            // Taken while running, so a nested delivery is skipped.
            let Some(callback) = state.callback.take() else {
                return;
            };
            state.in_flight = Some(thread::current().id());
            callback
        };

        if panic::catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
            warn!("notification callback panicked");
        }

        let mut state = self.state.lock();
        state.in_flight = None;
        if !state.cancelled {
            state.callback = Some(callback);
        }
        drop(state);
        self.idle.notify_all();
    }

    fn take_initial(&self) -> bool {
        self.initial_pending.swap(false, Ordering::AcqRel)
    }
}

trait Cancellable: Send + Sync {
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

impl<A: 'static> Cancellable for Subscription<A> {
    fn cancel(&self) {
        let current = thread::current().id();
        let mut state = self.state.lock();
        state.cancelled = true;
        while matches!(state.in_flight, Some(id) if id != current) {
            self.idle.wait(&mut state);
        }
        let callback = state.callback.take();
        drop(state);
        drop(callback);
    }

    fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

/// Keeps a subscription alive. Dropping the token cancels it.
#[must_use = "dropping the token cancels the subscription"]
pub struct NotificationToken {
    shared: Weak<SessionShared>,
    observer: Option<ObserverId>,
    subscription: Arc<dyn Cancellable>,
}

impl NotificationToken {
    /// Cancels the subscription.
    ///
    /// When called from another thread while the callback is running,
    /// waits for it to return. No callback starts after this returns.
    pub fn cancel(&mut self) {
        self.subscription.cancel();
        if let Some(observer) = self.observer.take() {
            if let Some(shared) = self.shared.upgrade() {
                shared.engine.remove_observer(observer);
            }
        }
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_cancelled()
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationToken")
            .field("observer", &self.observer)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Subscribes to a table, query, list, set or dictionary. An initial empty
/// change is queued on the scheduler and always precedes the first real
/// change.
pub(crate) fn observe_collection<C, F>(
    shared: &Arc<SessionShared>,
    target: ObserveTarget,
    callback: F,
) -> CoreResult<NotificationToken>
where
    C: CollectionDelta,
    F: FnMut(C) + Send + 'static,
{
    shared.verify_thread()?;
    let subscription = Arc::new(Subscription::<C>::new(Box::new(callback), true));

    let delivery = Arc::clone(&subscription);
    let observer = shared.engine.add_observer(
        target,
        Box::new(move |changes: &RawChangeSet| {
            if delivery.take_initial() {
                delivery.deliver(C::default());
            }
            delivery.deliver(C::from_raw(changes));
        }),
    )?;

    let mut token = NotificationToken {
        shared: Arc::downgrade(shared),
        observer: Some(observer),
        subscription: Arc::clone(&subscription) as Arc<dyn Cancellable>,
    };

    let initial = Arc::clone(&subscription);
    if let Err(err) = shared.scheduler.invoke(Box::new(move || {
        if initial.take_initial() {
            initial.deliver(C::default());
        }
    })) {
        token.cancel();
        return Err(err.into());
    }
    Ok(token)
}

/// Subscribes to one row.
pub(crate) fn observe_object<T, F>(
    shared: &Arc<SessionShared>,
    binding: &Arc<TableBinding>,
    row: RowId,
    callback: F,
) -> CoreResult<NotificationToken>
where
    T: Object,
    F: FnMut(ObjectChange<T>) + Send + 'static,
{
    shared.verify_thread()?;
    let subscription = Arc::new(Subscription::<ObjectChange<T>>::new(Box::new(callback), false));

    let delivery = Arc::clone(&subscription);
    let session = Arc::downgrade(shared);
    let table = Arc::clone(binding);
    let target = ObserveTarget::Row {
        table: binding.info.key,
        row: row.into(),
    };
    let observer = shared.engine.add_observer(
        target,
        Box::new(move |changes: &RawChangeSet| {
            let Some(shared) = session.upgrade() else {
                return;
            };
            delivery.deliver(object_change(&shared, &table, row, changes));
        }),
    )?;

    Ok(NotificationToken {
        shared: Arc::downgrade(shared),
        observer: Some(observer),
        subscription: subscription as Arc<dyn Cancellable>,
    })
}

fn object_change<T: Object>(
    shared: &Arc<SessionShared>,
    binding: &Arc<TableBinding>,
    row: RowId,
    changes: &RawChangeSet,
) -> ObjectChange<T> {
    if changes.root_deleted {
        return ObjectChange {
            object: None,
            is_deleted: true,
            property_changes: Vec::new(),
        };
    }

    let property_changes = changes
        .new_values
        .iter()
        .filter_map(|(column, value)| {
            let name = binding.info.column_name(*column)?;
            let property = binding.schema.property_named(name)?;
            Some(PropertyChange {
                name: property.name,
                old_value: changes.old_values.get(column).cloned().map(PropertyValue::from),
                new_value: Some(PropertyValue::from(value.clone())),
            })
        })
        .collect();

    let object = binding.bind::<T>(shared, row, false);
    ObjectChange {
        object: Some(Managed::new(object, Arc::clone(shared), Arc::clone(binding), row)),
        is_deleted: false,
        property_changes,
    }
}
