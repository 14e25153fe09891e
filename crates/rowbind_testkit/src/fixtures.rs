//! Sample schemas and session helpers.
//!
//! Every helper opens sessions on the calling thread's run loop, so tests
//! pump notifications explicitly with [`pump_until`].

use rowbind_core::scheduler::{RunLoopScheduler, Scheduler};
use rowbind_core::{
    Binary, CoreResult, Decimal128, Embedded, EmbeddedList, Link, LinkList, Mixed, Object,
    ObjectId, Persisted, PersistedList, PersistedMap, PersistedSet, Property, Session,
    SessionConfig, Timestamp, Uuid,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A person with a primary key, a link, an embedded address and a list.
#[derive(Debug, Default)]
pub struct Person {
    /// Primary key.
    pub id: Persisted<i64>,
    /// Name.
    pub name: Persisted<String>,
    /// Age in years.
    pub age: Persisted<i64>,
    /// Optional nickname.
    pub nickname: Persisted<Option<String>>,
    /// The person's dog.
    pub dog: Link<Dog>,
    /// Home address.
    pub address: Embedded<Address>,
    /// Free-form tags.
    pub tags: PersistedList<String>,
}

impl Person {
    /// An unmanaged person.
    pub fn new(id: i64, name: &str, age: i64) -> Self {
        Self {
            id: Persisted::new(id),
            name: Persisted::new(name.to_string()),
            age: Persisted::new(age),
            ..Self::default()
        }
    }
}

impl Object for Person {
    const NAME: &'static str = "Person";
    const PRIMARY_KEY: Option<&'static str> = Some("id");

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![
            ("id", &mut self.id),
            ("name", &mut self.name),
            ("age", &mut self.age),
            ("nickname", &mut self.nickname),
            ("dog", &mut self.dog),
            ("address", &mut self.address),
            ("tags", &mut self.tags),
        ]
    }
}

/// A dog without a primary key.
#[derive(Debug, Default)]
pub struct Dog {
    /// Name.
    pub name: Persisted<String>,
    /// Age in years.
    pub age: Persisted<i64>,
}

impl Dog {
    /// An unmanaged dog.
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: Persisted::new(name.to_string()),
            age: Persisted::new(age),
        }
    }
}

impl Object for Dog {
    const NAME: &'static str = "Dog";

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![("name", &mut self.name), ("age", &mut self.age)]
    }
}

/// An embedded address.
#[derive(Debug, Default)]
pub struct Address {
    /// Street line.
    pub street: Persisted<String>,
    /// City.
    pub city: Persisted<String>,
}

impl Address {
    /// An unmanaged address.
    pub fn new(street: &str, city: &str) -> Self {
        Self {
            street: Persisted::new(street.to_string()),
            city: Persisted::new(city.to_string()),
        }
    }
}

impl Object for Address {
    const NAME: &'static str = "Address";
    const EMBEDDED: bool = true;

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![("street", &mut self.street), ("city", &mut self.city)]
    }
}

/// One property of every primitive type, keyed by uuid.
#[derive(Debug, Default)]
pub struct AllTypes {
    /// Primary key.
    pub id: Persisted<Uuid>,
    /// Boolean.
    pub flag: Persisted<bool>,
    /// Integer.
    pub int: Persisted<i64>,
    /// Double.
    pub double: Persisted<f64>,
    /// String.
    pub string: Persisted<String>,
    /// Binary.
    pub binary: Persisted<Binary>,
    /// Timestamp.
    pub timestamp: Persisted<Timestamp>,
    /// Object id.
    pub object_id: Persisted<ObjectId>,
    /// Decimal.
    pub decimal: Persisted<Decimal128>,
    /// Optional integer.
    pub maybe_int: Persisted<Option<i64>>,
    /// List of optional integers.
    pub numbers: PersistedList<Option<i64>>,
}

impl Object for AllTypes {
    const NAME: &'static str = "AllTypes";
    const PRIMARY_KEY: Option<&'static str> = Some("id");

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![
            ("id", &mut self.id),
            ("flag", &mut self.flag),
            ("int", &mut self.int),
            ("double", &mut self.double),
            ("string", &mut self.string),
            ("binary", &mut self.binary),
            ("timestamp", &mut self.timestamp),
            ("object_id", &mut self.object_id),
            ("decimal", &mut self.decimal),
            ("maybe_int", &mut self.maybe_int),
            ("numbers", &mut self.numbers),
        ]
    }
}

/// A house exercising every collection kind.
#[derive(Debug, Default)]
pub struct House {
    /// Primary key.
    pub id: Persisted<i64>,
    /// Distinct labels.
    pub labels: PersistedSet<String>,
    /// Ratings by reviewer; a reviewer may abstain.
    pub ratings: PersistedMap<Option<i64>>,
    /// A value of any type.
    pub extra: Persisted<Mixed>,
    /// Notes of any type by key.
    pub notes: PersistedMap<Mixed>,
    /// Dogs living in the house.
    pub residents: LinkList<Dog>,
    /// Rooms, owned by the house.
    pub rooms: EmbeddedList<Room>,
}

impl House {
    /// An unmanaged, empty house.
    pub fn new(id: i64) -> Self {
        Self {
            id: Persisted::new(id),
            ..Self::default()
        }
    }
}

impl Object for House {
    const NAME: &'static str = "House";
    const PRIMARY_KEY: Option<&'static str> = Some("id");

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![
            ("id", &mut self.id),
            ("labels", &mut self.labels),
            ("ratings", &mut self.ratings),
            ("extra", &mut self.extra),
            ("notes", &mut self.notes),
            ("residents", &mut self.residents),
            ("rooms", &mut self.rooms),
        ]
    }
}

/// An embedded room of a [`House`].
#[derive(Debug, Default)]
pub struct Room {
    /// Name.
    pub name: Persisted<String>,
    /// Floor area in square metres.
    pub size: Persisted<i64>,
}

impl Room {
    /// An unmanaged room.
    pub fn new(name: &str, size: i64) -> Self {
        Self {
            name: Persisted::new(name.to_string()),
            size: Persisted::new(size),
        }
    }
}

impl Object for Room {
    const NAME: &'static str = "Room";
    const EMBEDDED: bool = true;

    fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
        vec![("name", &mut self.name), ("size", &mut self.size)]
    }
}

/// A path no other test in the process uses.
pub fn unique_path(prefix: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    PathBuf::from(format!(
        "{prefix}-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Configuration for `path` with every fixture schema, confined to the
/// calling thread's run loop.
pub fn session_config(path: impl AsRef<Path>) -> SessionConfig {
    let scheduler: Arc<dyn Scheduler> = RunLoopScheduler::current();
    SessionConfig::new(path.as_ref())
        .scheduler(scheduler)
        .object::<Person>()
        .object::<Dog>()
        .object::<Address>()
        .object::<AllTypes>()
        .object::<House>()
        .object::<Room>()
}

/// Opens a session on a fresh path.
pub fn temp_session() -> Session {
    open(session_config(unique_path("temp")))
}

/// Opens a session, panicking on failure.
pub fn open(config: SessionConfig) -> Session {
    match Session::open(config) {
        Ok(session) => session,
        Err(err) => panic!("failed to open test session: {err}"),
    }
}

/// Adds a person named `name` in its own write transaction.
pub fn add_person(session: &Session, id: i64, name: &str, age: i64) -> CoreResult<rowbind_core::Managed<Person>> {
    session.write(|| session.add(Person::new(id, name, age)))
}

/// Pumps the calling thread's run loop until `done` returns true or five
/// seconds pass. Returns whether `done` became true.
pub fn pump_until(done: impl FnMut() -> bool) -> bool {
    pump_until_timeout(done, Duration::from_secs(5))
}

/// Like [`pump_until`] with an explicit timeout.
pub fn pump_until_timeout(done: impl FnMut() -> bool, timeout: Duration) -> bool {
    RunLoopScheduler::current()
        .run_until(done, timeout)
        .unwrap_or(false)
}

/// A durable file in a temporary directory, removed on drop.
pub struct DurableFile {
    dir: TempDir,
}

impl DurableFile {
    /// Creates the directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}")),
        }
    }

    /// Path of the file inside the directory.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("test.rowbind")
    }

    /// Durable configuration for the file with every fixture schema.
    pub fn config(&self) -> SessionConfig {
        session_config(self.path()).durable(true)
    }
}

impl Default for DurableFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_schemas_compile() {
        let schemas = vec![
            Person::schema(),
            Dog::schema(),
            Address::schema(),
            AllTypes::schema(),
            House::schema(),
            Room::schema(),
        ];
        let tables = rowbind_core::compile_schema(&schemas).unwrap();
        assert_eq!(tables.len(), 6);
        assert_eq!(Person::schema().primary_key().map(|p| p.name), Some("id"));
        assert!(Address::schema().embedded);
    }

    #[test]
    fn unique_paths_differ() {
        assert_ne!(unique_path("a"), unique_path("a"));
    }

    #[test]
    fn temp_session_opens() {
        let session = temp_session();
        assert!(session.objects::<Person>().unwrap().is_empty().unwrap());
    }
}
