//! The default scheduler factory is process-global, so these tests live in
//! their own binary.

use rowbind_core::scheduler::{
    make_default, make_platform_default, reset_default_factory, set_default_factory,
    RunLoopScheduler, Scheduler,
};
use rowbind_core::{Session, SessionConfig};
use rowbind_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn factory_override_and_reset() {
    let here = RunLoopScheduler::current();
    assert!(make_platform_default().is_same_as(&*here));
    assert!(make_default().is_same_as(&*here));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    set_default_factory(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        RunLoopScheduler::current() as Arc<dyn Scheduler>
    }));

    let session = Session::open(
        SessionConfig::new(unique_path("factory"))
            .object::<Person>()
            .object::<Dog>()
            .object::<Address>(),
    )
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(session.scheduler().is_same_as(&*here));

    let explicit = open(session_config(unique_path("explicit")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(explicit.scheduler().is_on_thread());

    reset_default_factory();
    let _ = make_default();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
