//! Integration tests for managed and unmanaged properties.

use proptest::prelude::*;
use rowbind_core::{
    Binary, CoreError, Decimal128, Embedded, Link, Object, ObjectId, Persisted, PersistedList,
    Property, Timestamp, Uuid,
};
use rowbind_testkit::prelude::*;

#[test]
fn unmanaged_person_needs_no_session() {
    let mut person = Person::default();
    person.age.write(30).unwrap();
    assert_eq!(person.age.read().unwrap(), 30);
    assert!(!person.age.is_managed());

    person.tags.push("new").unwrap();
    person.dog = Link::new(Dog::new("Rex", 2));
    person.address = Embedded::new(Address::new("1 Main St", "Springfield"));
    assert_eq!(person.tags.len().unwrap(), 1);
    assert_eq!(person.dog.unmanaged().map(|d| d.name.read().unwrap()), Some("Rex".to_string()));
    assert!(person.address.get().unwrap().is_none());
}

#[test]
fn added_properties_become_managed() {
    init_tracing();
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    assert!(ada.id.is_managed());
    assert!(ada.name.is_managed());
    assert_eq!(ada.name.read().unwrap(), "Ada");
    assert_eq!(ada.age.read().unwrap(), 36);
    assert_eq!(ada.nickname.read().unwrap(), None);
    assert!(ada.is_valid());
}

#[test]
fn managed_write_outside_transaction_fails_without_mutating() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    for _ in 0..3 {
        let err = ada.name.write("Lin").unwrap_err();
        assert!(matches!(err, CoreError::NotInWriteTransaction));
    }
    assert!(matches!(
        ada.age.add_assign(1),
        Err(CoreError::NotInWriteTransaction)
    ));
    assert!(matches!(
        ada.tags.push("x"),
        Err(CoreError::NotInWriteTransaction)
    ));
    assert_eq!(ada.name.read().unwrap(), "Ada");
    assert_eq!(ada.age.read().unwrap(), 36);
    assert!(ada.tags.is_empty().unwrap());
}

#[test]
fn managed_writes_inside_transaction() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();

    session
        .write(|| {
            ada.name.push_str(" Lovelace")?;
            ada.age.add_assign(1)?;
            ada.nickname.write(Some("Countess".to_string()))
        })
        .unwrap();

    assert_eq!(ada.name.read().unwrap(), "Ada Lovelace");
    assert_eq!(ada.age.read().unwrap(), 37);
    assert_eq!(ada.nickname.read().unwrap().as_deref(), Some("Countess"));
    assert_eq!(ada.name.contains("Love").unwrap(), true);
    assert_eq!(ada.age.greater(40).unwrap(), false);
}

#[test]
fn deleted_rows_are_stale() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let copy = ada.clone();
    session.write(|| session.remove(&copy)).unwrap();

    assert!(!ada.is_valid());
    assert!(matches!(ada.name.read(), Err(CoreError::StaleRow { .. })));
    assert!(matches!(ada.tags.len(), Err(CoreError::StaleRow { .. })));
    let err = session.write(|| ada.name.write("Lin")).unwrap_err();
    assert!(matches!(err, CoreError::StaleRow { .. }));
}

#[test]
fn managed_list_operations() {
    let session = temp_session();
    let mut person = Person::new(1, "Ada", 36);
    person.tags = PersistedList::new(vec!["a".to_string(), "c".to_string()]);
    let ada = session.write(|| session.add(person)).unwrap();
    assert_eq!(ada.tags.to_vec().unwrap(), ["a", "c"]);

    session
        .write(|| {
            ada.tags.insert(1, "b")?;
            ada.tags.push("d")?;
            ada.tags.set(0, "z")?;
            ada.tags.remove(3).map(|_| ())
        })
        .unwrap();
    assert_eq!(ada.tags.to_vec().unwrap(), ["z", "b", "c"]);
    assert_eq!(ada.tags.get(1).unwrap(), "b");
    assert_eq!(ada.tags.find(&"c".to_string()).unwrap(), Some(2));

    let err = session.write(|| ada.tags.get(9).map(|_| ())).unwrap_err();
    assert!(matches!(err, CoreError::IndexOutOfBounds { index: 9, .. }));

    session.write(|| ada.tags.clear()).unwrap();
    assert!(ada.tags.is_empty().unwrap());
}

#[test]
fn links_copy_only_the_row() {
    let session = temp_session();
    let rex = session.write(|| session.add(Dog::new("Rex", 3))).unwrap();

    let mut person = Person::new(1, "Ada", 36);
    person.dog = Link::to(&rex);
    let ada = session.write(|| session.add(person)).unwrap();

    let linked = ada.dog.get().unwrap().unwrap();
    assert_eq!(linked, rex);
    assert_eq!(session.objects::<Dog>().unwrap().len().unwrap(), 1);

    session
        .write(|| {
            let dog = ada.dog.get()?.expect("linked dog");
            dog.age.write(4)
        })
        .unwrap();
    assert_eq!(rex.age.read().unwrap(), 4);

    session.write(|| ada.dog.set(None)).unwrap();
    assert!(ada.dog.is_null().unwrap());
    assert!(rex.is_valid());
}

#[test]
fn unmanaged_link_target_is_added_with_owner() {
    let session = temp_session();
    let mut person = Person::new(1, "Ada", 36);
    person.dog = Link::new(Dog::new("Fido", 1));
    let ada = session.write(|| session.add(person)).unwrap();

    assert_eq!(session.objects::<Dog>().unwrap().len().unwrap(), 1);
    let fido = ada.dog.get().unwrap().unwrap();
    assert_eq!(fido.name.read().unwrap(), "Fido");

    session.write(|| ada.dog.set_object(Dog::new("Spot", 5))).unwrap();
    assert_eq!(session.objects::<Dog>().unwrap().len().unwrap(), 2);
    assert_eq!(ada.dog.get().unwrap().unwrap().name.read().unwrap(), "Spot");
}

#[test]
fn embedded_objects_are_copied_into_new_rows() {
    let session = temp_session();
    let mut person = Person::new(1, "Ada", 36);
    person.address = Embedded::new(Address::new("1 Main St", "Springfield"));
    let ada = session.write(|| session.add(person)).unwrap();

    let address = ada.address.get().unwrap().unwrap();
    assert_eq!(address.city.read().unwrap(), "Springfield");

    session
        .write(|| ada.address.set(Some(Address::new("2 Side St", "Shelbyville"))))
        .unwrap();
    assert!(!address.is_valid());
    let moved = ada.address.get().unwrap().unwrap();
    assert_eq!(moved.street.read().unwrap(), "2 Side St");

    session.write(|| ada.address.set(None)).unwrap();
    assert!(ada.address.is_null().unwrap());
    assert!(!moved.is_valid());
}

#[test]
fn embedded_types_cannot_be_added_directly() {
    let session = temp_session();
    let err = session
        .write(|| session.add(Address::new("1 Main St", "Springfield")))
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
    assert!(session.objects::<Address>().is_err());
}

#[test]
fn managed_field_cannot_be_swapped_for_unmanaged_value() {
    let session = temp_session();
    let ada = add_person(&session, 1, "Ada", 36).unwrap();
    let handle = ada.clone();

    // Only shared access exists, so every change goes through the property.
    assert!(matches!(
        handle.name.write("Lin"),
        Err(CoreError::NotInWriteTransaction)
    ));
    assert!(handle.name.is_managed());
    assert!(handle.tags.is_managed());
    assert!(handle.dog.is_managed());

    session.write(|| handle.name.write("Lin")).unwrap();
    assert_eq!(ada.name.read().unwrap(), "Lin");
    assert!(ada.name.is_managed());
}

#[test]
fn primary_key_types() {
    let session = temp_session();
    let key = Uuid::new_v4();
    let all = AllTypes {
        id: Persisted::new(key),
        ..AllTypes::default()
    };
    session.write(|| session.add(all)).unwrap();

    let found = session
        .object_for_primary_key::<AllTypes, Uuid>(key)
        .unwrap()
        .unwrap();
    assert_eq!(found.id.read().unwrap(), key);
    assert!(session
        .object_for_primary_key::<AllTypes, Uuid>(Uuid::NIL)
        .unwrap()
        .is_none());
    assert!(matches!(
        session.object_for_primary_key::<Dog, i64>(1),
        Err(CoreError::InvalidOperation { .. })
    ));
}

#[test]
fn boundary_values_survive_storage() {
    let session = temp_session();
    let all = AllTypes {
        id: Persisted::new(Uuid::new_v4()),
        flag: Persisted::new(true),
        int: Persisted::new(i64::MIN),
        double: Persisted::new(f64::MAX),
        string: Persisted::new(String::new()),
        binary: Persisted::new(Binary::new()),
        timestamp: Persisted::new(Timestamp::MAX),
        object_id: Persisted::new(ObjectId::generate()),
        decimal: Persisted::new(Decimal128::new(-15, -1)),
        maybe_int: Persisted::new(None),
        numbers: PersistedList::new(vec![Some(1), None, Some(i64::MAX)]),
    };
    let stored = session.write(|| session.add(all)).unwrap();

    assert!(stored.flag.read().unwrap());
    assert_eq!(stored.int.read().unwrap(), i64::MIN);
    assert_eq!(stored.double.read().unwrap(), f64::MAX);
    assert!(stored.string.read().unwrap().is_empty());
    assert!(stored.binary.read().unwrap().is_empty());
    assert_eq!(stored.timestamp.read().unwrap(), Timestamp::MAX);
    assert_eq!(stored.decimal.read().unwrap(), Decimal128::new(-150, -2));
    assert_eq!(stored.maybe_int.read().unwrap(), None);
    assert_eq!(
        stored.numbers.to_vec().unwrap(),
        vec![Some(1), None, Some(i64::MAX)]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn managed_values_read_back(
        string in string_strategy(),
        binary in binary_strategy(),
        timestamp in timestamp_strategy(),
        decimal in decimal_strategy(),
        object_id in object_id_strategy(),
        int in any::<i64>(),
    ) {
        let session = temp_session();
        let stored = session
            .write(|| session.add(AllTypes { id: Persisted::new(Uuid::new_v4()), ..AllTypes::default() }))
            .unwrap();
        session
            .write(|| {
                stored.string.write(string.clone())?;
                stored.binary.write(binary.clone())?;
                stored.timestamp.write(timestamp)?;
                stored.decimal.write(decimal)?;
                stored.object_id.write(object_id)?;
                stored.maybe_int.write(Some(int))
            })
            .unwrap();

        prop_assert_eq!(stored.string.read().unwrap(), string);
        prop_assert_eq!(stored.binary.read().unwrap(), binary);
        prop_assert_eq!(stored.timestamp.read().unwrap(), timestamp);
        prop_assert_eq!(stored.decimal.read().unwrap(), decimal);
        prop_assert_eq!(stored.object_id.read().unwrap(), object_id);
        prop_assert_eq!(stored.maybe_int.read().unwrap(), Some(int));
    }
}

#[test]
fn schema_is_derived_from_properties() {
    let schema = Person::schema();
    let names: Vec<_> = schema.properties.iter().map(|p| p.name).collect();
    assert_eq!(names, ["id", "name", "age", "nickname", "dog", "address", "tags"]);
    assert_eq!(
        schema.property_named("nickname").map(|p| p.property_type.to_string()),
        Some("string?".to_string())
    );
}
