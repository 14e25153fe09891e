//! Live collections of one table.

use super::{Session, SessionShared, TableBinding};
use crate::bridge::RowId;
use crate::error::{CoreError, CoreResult};
use crate::notifications::{CollectionChange, NotificationToken};
use crate::object::{Managed, Object};
use crate::query::Rbool;
use rowbind_engine::{ObjKey, ObserveTarget, Predicate, SortSpec};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The rows of one table, optionally filtered and sorted.
///
/// Results are live: every call evaluates against the session's current
/// version.
///
/// # Example
///
/// ```rust,ignore
/// let adults = session
///     .objects::<Person>()?
///     .filter(|p| p.age.greater_equal(18))?
///     .sorted_by("name", true)?;
/// for person in adults.iter()? {
///     println!("{}", person.name.read()?);
/// }
/// ```
pub struct Results<T: Object> {
    shared: Arc<SessionShared>,
    binding: Arc<TableBinding>,
    predicate: Option<Predicate>,
    sort: Option<SortSpec>,
    _marker: PhantomData<fn() -> T>,
    _confined: PhantomData<*const ()>,
}

impl<T: Object> Results<T> {
    pub(crate) fn new(shared: Arc<SessionShared>, binding: Arc<TableBinding>) -> Self {
        Self {
            shared,
            binding,
            predicate: None,
            sort: None,
            _marker: PhantomData,
            _confined: PhantomData,
        }
    }

    fn refine(&self, predicate: Option<Predicate>, sort: Option<SortSpec>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            binding: Arc::clone(&self.binding),
            predicate,
            sort,
            _marker: PhantomData,
            _confined: PhantomData,
        }
    }

    fn rows(&self) -> CoreResult<Vec<ObjKey>> {
        self.shared.verify_thread()?;
        Ok(self.shared.engine.rows(
            self.binding.info.key,
            self.predicate.as_ref(),
            self.sort.as_ref(),
        )?)
    }

    fn managed(&self, row: ObjKey) -> Managed<T> {
        let row = RowId::from(row);
        Managed::new(
            self.binding.bind::<T>(&self.shared, row, false),
            Arc::clone(&self.shared),
            Arc::clone(&self.binding),
            row,
        )
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub(crate) fn target(&self) -> ObserveTarget {
        ObserveTarget::Table {
            table: self.binding.info.key,
            predicate: self.predicate.clone(),
            sort: self.sort,
        }
    }

    pub(crate) fn from_target(session: &Session, target: ObserveTarget) -> CoreResult<Self> {
        let binding = session.shared().binding(T::NAME)?;
        match target {
            ObserveTarget::Table {
                table,
                predicate,
                sort,
            } if table == binding.info.key => {
                Ok(Self::new(Arc::clone(session.shared()), binding).refine(predicate, sort))
            }
            _ => Err(CoreError::IncompatibleSession {
                message: format!("reference does not name the {} table", T::NAME),
            }),
        }
    }

    /// Number of matching objects.
    pub fn len(&self) -> CoreResult<usize> {
        self.rows().map(|rows| rows.len())
    }

    /// Returns true if nothing matches.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|len| len == 0)
    }

    /// The object at `index`.
    pub fn get(&self, index: usize) -> CoreResult<Managed<T>> {
        let rows = self.rows()?;
        let row = rows.get(index).copied().ok_or(CoreError::IndexOutOfBounds {
            index,
            len: rows.len(),
        })?;
        Ok(self.managed(row))
    }

    /// Iterates the objects matching at the time of the call.
    pub fn iter(&self) -> CoreResult<impl Iterator<Item = Managed<T>> + '_> {
        let rows = self.rows()?;
        Ok(rows.into_iter().map(move |row| self.managed(row)))
    }

    /// Collects the matching objects.
    pub fn to_vec(&self) -> CoreResult<Vec<Managed<T>>> {
        Ok(self.iter()?.collect())
    }

    /// Narrows the results.
    ///
    /// `predicate` receives a query template of `T`: comparisons on its
    /// properties produce deferred queries, and reading a value from it
    /// fails with [`CoreError::QueryContext`].
    pub fn filter<F>(&self, predicate: F) -> CoreResult<Results<T>>
    where
        F: FnOnce(&T) -> CoreResult<Rbool>,
    {
        let template = self.shared.bind_query::<T>(&self.binding);
        let condition = predicate(&template)?.into_predicate();
        let combined = match self.predicate.clone() {
            Some(existing) => existing.and(condition),
            None => condition,
        };
        Ok(self.refine(Some(combined), self.sort))
    }

    /// Orders the results by `property`.
    pub fn sorted_by(&self, property: &str, ascending: bool) -> CoreResult<Results<T>> {
        let column = self.binding.column(property)?;
        let sort = SortSpec {
            column: column.into(),
            ascending,
        };
        Ok(self.refine(self.predicate.clone(), Some(sort)))
    }

    /// Observes the results.
    ///
    /// The first delivery is the initial, empty change. Later deliveries
    /// carry the indices deleted from the previous state and the indices
    /// inserted and modified in the new one.
    pub fn observe<F>(&self, callback: F) -> CoreResult<NotificationToken>
    where
        F: FnMut(CollectionChange) + Send + 'static,
    {
        crate::notifications::observe_collection::<CollectionChange, _>(&self.shared, self.target(), callback)
    }

    /// Results over a frozen copy of the session.
    pub fn freeze(&self) -> CoreResult<Results<T>> {
        let frozen = Session::from_shared(Arc::clone(&self.shared)).freeze()?;
        Ok(Self {
            shared: Arc::clone(frozen.shared()),
            ..self.refine(self.predicate.clone(), self.sort)
        })
    }

    /// Returns true if evaluated against a frozen session.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.shared.frozen
    }
}

impl<T: Object> Clone for Results<T> {
    fn clone(&self) -> Self {
        self.refine(self.predicate.clone(), self.sort)
    }
}

impl<T: Object> fmt::Debug for Results<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Results")
            .field("type", &T::NAME)
            .field("predicate", &self.predicate)
            .field("sort", &self.sort)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Persisted, Property};
    use crate::scheduler::{RunLoopScheduler, Scheduler};
    use crate::session::SessionConfig;
    use rowbind_engine::MemoryEngine;

    #[derive(Default)]
    struct Item {
        name: Persisted<String>,
        rank: Persisted<i64>,
    }

    impl Object for Item {
        const NAME: &'static str = "Item";

        fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
            vec![("name", &mut self.name), ("rank", &mut self.rank)]
        }
    }

    fn seeded() -> Session {
        let scheduler: Arc<dyn Scheduler> = RunLoopScheduler::current();
        let session = Session::open(
            SessionConfig::new("results-unit")
                .scheduler(scheduler)
                .engine(Arc::new(MemoryEngine::new()))
                .object::<Item>(),
        )
        .unwrap();
        session
            .write(|| {
                for (name, rank) in [("pear", 3), ("apple", 1), ("fig", 2), ("plum", 5)] {
                    session.add(Item {
                        name: Persisted::new(name.to_string()),
                        rank: Persisted::new(rank),
                    })?;
                }
                Ok(())
            })
            .unwrap();
        session
    }

    fn names(results: &Results<Item>) -> Vec<String> {
        results
            .iter()
            .unwrap()
            .map(|item| item.name.read().unwrap())
            .collect()
    }

    #[test]
    fn filter_and_sort() {
        let session = seeded();
        let all = session.objects::<Item>().unwrap();
        assert_eq!(all.len().unwrap(), 4);

        let ranked = all
            .filter(|item| item.rank.greater(1))
            .unwrap()
            .sorted_by("rank", false)
            .unwrap();
        assert_eq!(names(&ranked), ["plum", "pear", "fig"]);

        let narrowed = ranked
            .filter(|item| Ok(item.name.starts_with("p")? & item.rank.less(5)?))
            .unwrap();
        assert_eq!(names(&narrowed), ["pear"]);
    }

    #[test]
    fn template_values_are_unavailable() {
        let session = seeded();
        let all = session.objects::<Item>().unwrap();
        let err = all
            .filter(|item| item.rank.read().map(|rank| Rbool::from(rank > 1)))
            .unwrap_err();
        assert!(matches!(err, CoreError::QueryContext));
    }

    #[test]
    fn get_out_of_bounds() {
        let session = seeded();
        let all = session.objects::<Item>().unwrap();
        assert!(all.get(3).is_ok());
        assert!(matches!(
            all.get(4),
            Err(CoreError::IndexOutOfBounds { index: 4, len: 4 })
        ));
        assert!(all.sorted_by("missing", true).is_err());
    }

    #[test]
    fn frozen_results_do_not_move() {
        let session = seeded();
        let all = session.objects::<Item>().unwrap();
        let frozen = all.freeze().unwrap();
        session
            .write(|| {
                session.add(Item::default())?;
                Ok(())
            })
            .unwrap();
        assert!(frozen.is_frozen());
        assert_eq!(frozen.len().unwrap(), 4);
        assert_eq!(all.len().unwrap(), 5);
    }
}
