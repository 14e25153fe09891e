//! Integration tests for thread-safe references.

use rowbind_core::{CoreError, ThreadSafeReference};
use rowbind_testkit::prelude::*;
use std::thread;

#[test]
fn object_crosses_to_another_thread() {
    let path = unique_path("handoff-object");
    let session = open(session_config(&path));
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let reference = ThreadSafeReference::new(ada).unwrap();

    let (name, age) = thread::spawn(move || {
        let session = open(session_config(&path));
        let person = session.resolve(reference).unwrap();
        (person.name.read().unwrap(), person.age.read().unwrap())
    })
    .join()
    .unwrap();
    assert_eq!(name, "Ada");
    assert_eq!(age, 36);
}

#[test]
fn results_keep_their_query_across_threads() {
    let path = unique_path("handoff-results");
    let session = open(session_config(&path));
    add_person(&session, 1, "Ada", 36).unwrap();
    add_person(&session, 2, "Lin", 12).unwrap();
    add_person(&session, 3, "Bo", 51).unwrap();

    let adults = session
        .objects::<Person>()
        .unwrap()
        .filter(|p| p.age.greater_equal(18))
        .unwrap()
        .sorted_by("age", false)
        .unwrap();
    let reference = ThreadSafeReference::new(adults).unwrap();

    let names = thread::spawn(move || {
        let session = open(session_config(&path));
        let adults = session.resolve(reference).unwrap();
        adults
            .iter()
            .unwrap()
            .map(|p| p.name.read().unwrap())
            .collect::<Vec<_>>()
    })
    .join()
    .unwrap();
    assert_eq!(names, ["Bo", "Ada"]);
}

#[test]
fn second_resolution_fails() {
    let path = unique_path("handoff-twice");
    let session = open(session_config(&path));
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let mut reference = ThreadSafeReference::new(ada).unwrap();

    let first = reference.resolve(&session).unwrap();
    assert_eq!(first.id.read().unwrap(), 1);
    let err = thread::spawn(move || {
        let session = open(session_config(&path));
        reference.resolve(&session).map(|_| ()).unwrap_err()
    })
    .join()
    .unwrap();
    assert!(matches!(err, CoreError::CapsuleAlreadyResolved));
}

#[test]
fn row_deleted_before_resolution_is_stale() {
    let path = unique_path("handoff-deleted");
    let session = open(session_config(&path));
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let reference = ThreadSafeReference::new(ada.clone()).unwrap();
    session.write(|| session.remove(&ada)).unwrap();

    let err = thread::spawn(move || {
        let session = open(session_config(&path));
        session.resolve(reference).map(|_| ()).unwrap_err()
    })
    .join()
    .unwrap();
    assert!(err.is_stale());
}

#[test]
fn resolution_advances_a_lagging_session() {
    let path = unique_path("handoff-lagging");
    let lagging = open(session_config(&path));
    let writer = open(session_config(&path));
    let ada = add_person(&writer, 1, "Ada", 36).unwrap();
    let before = lagging.version();

    let reference = ThreadSafeReference::new(ada).unwrap();
    let resolved = lagging.resolve(reference).unwrap();
    assert_eq!(resolved.name.read().unwrap(), "Ada");
    assert_ne!(lagging.version(), before);
    assert_eq!(lagging.objects::<Person>().unwrap().len().unwrap(), 1);
}

#[test]
fn frozen_object_resolves_at_its_version() {
    let path = unique_path("handoff-frozen");
    let session = open(session_config(&path));
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let frozen = ada.freeze().unwrap();
    session.write(|| ada.age.write(37)).unwrap();

    assert!(frozen.is_frozen());
    assert_eq!(frozen.age.read().unwrap(), 36);
    assert_eq!(ada.age.read().unwrap(), 37);
    assert_eq!(frozen.thaw().unwrap().age.read().unwrap(), 37);
}
