//! Durable files survive closing every session.

use rowbind_core::{CoreError, Link, Persisted, PersistedList};
use rowbind_engine::{MemoryEngine, StorageEngine};
use rowbind_testkit::prelude::*;
use std::sync::Arc;

fn engine() -> Arc<dyn StorageEngine> {
    Arc::new(MemoryEngine::new())
}

#[test]
fn objects_survive_reopen() {
    let file = DurableFile::new();
    {
        let session = open(file.config().engine(engine()));
        let mut person = Person::new(1, "Ada", 36);
        person.tags = PersistedList::new(vec!["math".to_string()]);
        person.dog = Link::new(Dog::new("Rex", 3));
        session.write(|| session.add(person)).unwrap();
        session.close();
    }
    assert!(file.path().exists());

    let session = open(file.config().engine(engine()));
    let ada = session
        .object_for_primary_key::<Person, i64>(1)
        .unwrap()
        .unwrap();
    assert_eq!(ada.name.read().unwrap(), "Ada");
    assert_eq!(ada.tags.to_vec().unwrap(), ["math"]);
    assert_eq!(ada.dog.get().unwrap().unwrap().name.read().unwrap(), "Rex");
}

#[test]
fn cancelled_write_is_not_persisted() {
    let file = DurableFile::new();
    {
        let session = open(file.config().engine(engine()));
        add_person(&session, 1, "Ada", 36).unwrap();
        session.begin_write().unwrap();
        session.add(Person::new(2, "Lin", 29)).unwrap();
        session.cancel_write().unwrap();
    }

    let session = open(file.config().engine(engine()));
    assert_eq!(session.objects::<Person>().unwrap().len().unwrap(), 1);
}

#[test]
fn closed_session_rejects_use() {
    let file = DurableFile::new();
    let session = open(file.config());
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    session.close();
    session.close();

    assert!(session.is_closed());
    assert!(matches!(ada.name.read(), Err(CoreError::SessionClosed)));
    assert!(matches!(
        session.begin_write(),
        Err(CoreError::SessionClosed)
    ));
}

#[test]
fn primary_keys_stay_unique_after_reopen() {
    let file = DurableFile::new();
    {
        let session = open(file.config().engine(engine()));
        add_person(&session, 7, "Ada", 36).unwrap();
    }

    let session = open(file.config().engine(engine()));
    let duplicate = Person {
        id: Persisted::new(7),
        ..Person::default()
    };
    let err = session.write(|| session.add(duplicate)).unwrap_err();
    assert!(matches!(err, CoreError::DuplicatePrimaryKey { .. }));
}
