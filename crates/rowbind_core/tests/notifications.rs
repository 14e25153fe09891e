//! Integration tests for change notifications.

use parking_lot::Mutex;
use rowbind_core::{CollectionChange, NotificationToken, ThreadSafeReference};
use rowbind_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn collect_changes() -> (
    Arc<Mutex<Vec<CollectionChange>>>,
    impl FnMut(CollectionChange) + Send + 'static,
) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    (changes, move |change| sink.lock().push(change))
}

#[test]
fn results_deliver_initial_change_first() {
    init_tracing();
    let session = temp_session();
    let (changes, callback) = collect_changes();
    let _token = session.objects::<Person>().unwrap().observe(callback).unwrap();

    assert!(pump_until(|| changes.lock().len() == 1));
    assert!(changes.lock()[0].is_empty());

    add_person(&session, 1, "Ada", 36).unwrap();
    assert!(pump_until(|| changes.lock().len() == 2));
    assert_eq!(changes.lock()[1].insertions, [0]);
}

#[test]
fn results_report_modifications_and_deletions() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    add_person(&session, 2, "Lin", 29).unwrap();

    let (changes, callback) = collect_changes();
    let _token = session.objects::<Person>().unwrap().observe(callback).unwrap();
    assert!(pump_until(|| changes.lock().len() == 1));

    session.write(|| ada.age.write(37)).unwrap();
    assert!(pump_until(|| changes.lock().len() == 2));
    assert_eq!(changes.lock()[1].modifications, [0]);

    let copy = ada.clone();
    session.write(|| session.remove(&copy)).unwrap();
    assert!(pump_until(|| changes.lock().len() == 3));
    assert_eq!(changes.lock()[2].deletions, [0]);
}

#[test]
fn filtered_results_track_membership() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    let adults = session
        .objects::<Person>()
        .unwrap()
        .filter(|p| p.age.greater_equal(40))
        .unwrap();
    let (changes, callback) = collect_changes();
    let _token = adults.observe(callback).unwrap();
    assert!(pump_until(|| changes.lock().len() == 1));
    assert!(adults.is_empty().unwrap());

    session.write(|| ada.age.write(41)).unwrap();
    assert!(pump_until(|| changes.lock().len() == 2));
    assert_eq!(changes.lock()[1].insertions, [0]);
    assert_eq!(adults.len().unwrap(), 1);
}

#[test]
fn object_observer_names_changed_properties() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _token = ada
        .observe(move |change| {
            assert!(!change.is_deleted);
            let mut sink = sink.lock();
            for property in change.property_changes {
                let old = property.old_value.and_then(|v| v.get::<String>().ok());
                let new = property.new_value.and_then(|v| v.get::<String>().ok());
                sink.push((property.name, old, new));
            }
        })
        .unwrap();

    session.write(|| ada.name.write("Lin")).unwrap();
    assert!(pump_until(|| !seen.lock().is_empty()));
    assert_eq!(
        seen.lock().as_slice(),
        [("name", Some("Ada".to_string()), Some("Lin".to_string()))]
    );
}

#[test]
fn object_observer_reports_deletion() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    let deleted = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&deleted);
    let _token = ada
        .observe(move |change| {
            if change.is_deleted && change.object.is_none() {
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    session.write(|| session.remove(&ada)).unwrap();
    assert!(pump_until(|| deleted.load(Ordering::SeqCst) == 1));
}

#[test]
fn list_observer_reports_indices() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    let (changes, callback) = collect_changes();
    let _token = ada.tags.observe(callback).unwrap();
    assert!(pump_until(|| changes.lock().len() == 1));

    session
        .write(|| {
            ada.tags.push("a")?;
            ada.tags.push("b")
        })
        .unwrap();
    assert!(pump_until(|| changes.lock().len() == 2));
    assert_eq!(changes.lock()[1].insertions, [0, 1]);

    let copy = ada.clone();
    session.write(|| session.remove(&copy)).unwrap();
    assert!(pump_until(|| changes.lock().len() == 3));
    assert!(changes.lock()[2].root_was_deleted);
}

#[test]
fn unmanaged_list_cannot_be_observed() {
    let person = Person::default();
    assert!(person.tags.observe(|_| {}).is_err());
}

#[test]
fn dropped_token_stops_delivery() {
    let session = temp_session();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let token = session
        .objects::<Person>()
        .unwrap()
        .observe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(pump_until(|| count.load(Ordering::SeqCst) == 1));

    drop(token);
    add_person(&session, 1, "Ada", 36).unwrap();
    pump_until_timeout(|| false, Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_before_first_pump_suppresses_initial_change() {
    let session = temp_session();
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let mut token = session
        .objects::<Person>()
        .unwrap()
        .observe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    token.cancel();
    assert!(token.is_cancelled());

    pump_until_timeout(|| false, Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn changes_committed_on_another_thread_reach_the_observer() {
    let path = unique_path("cross-thread");
    let session = open(session_config(&path));
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    let changed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changed);
    let _token = ada
        .observe(move |change| {
            let mut sink = sink.lock();
            sink.extend(change.property_changes.iter().map(|p| p.name));
        })
        .unwrap();

    let reference = ThreadSafeReference::new(ada.clone()).unwrap();
    let writer_path = path.clone();
    thread::spawn(move || {
        let session = open(session_config(&writer_path));
        let person = session.resolve(reference).unwrap();
        session.write(|| person.name.write("Lin")).unwrap();
    })
    .join()
    .unwrap();

    assert!(pump_until(|| changed.lock().contains(&"name")));
    assert_eq!(ada.name.read().unwrap(), "Lin");
}

#[test]
fn cancel_from_another_thread_races_commits() {
    let path = unique_path("cancel-race");
    let session = open(session_config(&path));

    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let token: NotificationToken = session
        .objects::<Person>()
        .unwrap()
        .observe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        let session = open(session_config(&writer_path));
        for id in 1000..1050 {
            add_person(&session, id, "Writer", 20).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
    });

    let observed = Arc::clone(&count);
    let canceller = thread::spawn(move || {
        let mut token = token;
        thread::sleep(Duration::from_millis(15));
        token.cancel();
        observed.load(Ordering::SeqCst)
    });

    pump_until(|| writer.is_finished() && canceller.is_finished());
    pump_until_timeout(|| false, Duration::from_millis(50));

    writer.join().unwrap();
    let at_cancel = canceller.join().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), at_cancel);
}
