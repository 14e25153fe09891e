//! Process-wide default scheduler selection.

use super::{RunLoopScheduler, Scheduler};
use parking_lot::RwLock;
use std::sync::Arc;

/// Creates the scheduler for a session opened without an explicit one.
pub type SchedulerFactory = Arc<dyn Fn() -> Arc<dyn Scheduler> + Send + Sync>;

static FACTORY: RwLock<Option<SchedulerFactory>> = parking_lot::const_rwlock(None);

/// The platform default: the calling thread's [`RunLoopScheduler`].
#[must_use]
pub fn make_platform_default() -> Arc<dyn Scheduler> {
    RunLoopScheduler::current()
}

/// Overrides the default factory.
///
/// Call once at startup, before the first session is opened. Sessions
/// already open keep the scheduler they were created with.
pub fn set_default_factory(factory: SchedulerFactory) {
    let replaced = FACTORY.write().replace(factory).is_some();
    if replaced {
        tracing::debug!("replaced the default scheduler factory");
    }
}

/// Restores [`make_platform_default`] as the default factory.
pub fn reset_default_factory() {
    FACTORY.write().take();
}

/// Creates a scheduler with the current default factory.
#[must_use]
pub fn make_default() -> Arc<dyn Scheduler> {
    let factory = FACTORY.read().clone();
    match factory {
        Some(factory) => factory(),
        None => make_platform_default(),
    }
}
