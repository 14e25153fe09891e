//! Integration tests for thread confinement.

use rowbind_core::scheduler::{
    RunLoopScheduler, Scheduler, SchedulerError, ThreadScheduler, ThreadSchedulerConfig,
};
use rowbind_core::{CollectionChange, CoreError, ThreadSafeReference};
use rowbind_testkit::prelude::*;
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

thread_local! {
    static KEEP: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
}

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn run_loop_is_per_thread() {
    let here = RunLoopScheduler::current();
    assert!(here.is_on_thread());
    assert!(here.is_same_as(&*RunLoopScheduler::current()));

    let there = thread::spawn(|| RunLoopScheduler::current().id()).join().unwrap();
    assert_ne!(here.id(), there);

    let moved = Arc::clone(&here);
    let off_thread = thread::spawn(move || moved.is_on_thread()).join().unwrap();
    assert!(!off_thread);
}

#[test]
fn run_loop_runs_work_queued_from_other_threads() {
    let scheduler = RunLoopScheduler::current();
    let ran = Arc::new(AtomicUsize::new(0));

    let remote = Arc::clone(&scheduler);
    let counter = Arc::clone(&ran);
    thread::spawn(move || {
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            remote
                .invoke(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
    })
    .join()
    .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.run_pending().unwrap(), 3);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[test]
fn run_loop_cannot_be_pumped_off_thread() {
    let scheduler = RunLoopScheduler::current();
    let result = thread::spawn(move || scheduler.run_pending()).join().unwrap();
    assert_eq!(result, Err(SchedulerError::WrongThread));
}

#[test]
fn thread_scheduler_reports_full_queue() {
    let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default().capacity(1)).unwrap();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    scheduler
        .invoke(Box::new(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        }))
        .unwrap();
    started_rx.recv_timeout(WAIT).unwrap();

    scheduler.invoke(Box::new(|| {})).unwrap();
    assert_eq!(
        scheduler.invoke(Box::new(|| {})),
        Err(SchedulerError::QueueFull { capacity: 1 })
    );

    release_tx.send(()).unwrap();
    scheduler.shutdown();
    assert_eq!(scheduler.invoke(Box::new(|| {})), Err(SchedulerError::Stopped));
    assert!(!scheduler.can_invoke());
}

#[test]
fn thread_scheduler_drains_accepted_work_on_shutdown() {
    let scheduler = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        scheduler
            .invoke(Box::new(move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }
    scheduler.shutdown();
    assert_eq!(ran.load(Ordering::SeqCst), 10);
}

#[test]
fn session_cannot_open_off_its_scheduler_thread() {
    let worker = ThreadScheduler::spawn(ThreadSchedulerConfig::default()).unwrap();
    let scheduler: Arc<dyn Scheduler> = worker.clone();
    let err = rowbind_core::Session::open(session_config(unique_path("off-thread")).scheduler(scheduler))
        .unwrap_err();
    assert!(matches!(err, CoreError::WrongThread));
    worker.shutdown();
}

#[test]
fn reference_from_another_file_is_rejected() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let results = session.objects::<Person>().unwrap();
    let reference = ThreadSafeReference::new(results).unwrap();

    let err = thread::spawn(move || {
        let other = open(session_config(unique_path("elsewhere")));
        other.resolve(reference).map(|_| ()).unwrap_err()
    })
    .join()
    .unwrap();
    assert!(matches!(err, CoreError::IncompatibleSession { .. }));
    assert_eq!(ada.name.read().unwrap(), "Ada");
}

#[test]
fn thread_scheduler_hosts_a_session() {
    init_tracing();
    let worker = ThreadScheduler::spawn(ThreadSchedulerConfig::default().name("rowbind-test-worker"))
        .unwrap();
    let path = unique_path("worker");
    let main = open(session_config(&path));

    let (changes_tx, changes_rx) = mpsc::channel::<CollectionChange>();
    let (ready_tx, ready_rx) = mpsc::channel();
    let scheduler: Arc<dyn Scheduler> = worker.clone();
    let worker_path = path.clone();
    worker
        .invoke(Box::new(move || {
            let session = open(session_config(&worker_path).scheduler(scheduler));
            let token = session
                .objects::<Person>()
                .unwrap()
                .observe(move |change| {
                    let _ = changes_tx.send(change);
                })
                .unwrap();
            KEEP.with(|keep| {
                let mut keep = keep.borrow_mut();
                keep.push(Box::new(token));
                keep.push(Box::new(session));
            });
            ready_tx.send(()).unwrap();
        }))
        .unwrap();
    ready_rx.recv_timeout(WAIT).unwrap();

    assert!(changes_rx.recv_timeout(WAIT).unwrap().is_empty());
    add_person(&main, 1, "Ada", 36).unwrap();
    let change = changes_rx.recv_timeout(WAIT).unwrap();
    assert_eq!(change.insertions, [0]);

    worker
        .invoke(Box::new(|| KEEP.with(|keep| keep.borrow_mut().clear())))
        .unwrap();
    worker.shutdown();
}
