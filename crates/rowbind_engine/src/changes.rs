//! Raw change sets computed between two snapshot versions.

use crate::keys::{ColKey, ObjKey, TableKey, VersionId};
use crate::predicate::{Predicate, SortSpec};
use crate::snapshot::Snapshot;
use crate::value::EngineValue;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// A set of indices stored as sorted, coalesced ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    ranges: Vec<Range<usize>>,
}

impl IndexSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one index.
    pub fn add(&mut self, index: usize) {
        self.add_range(index..index + 1);
    }

    /// Adds a half-open range of indices.
    pub fn add_range(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;
        for r in self.ranges.drain(..) {
            if r.end < merged.start {
                out.push(r);
            } else if merged.end < r.start {
                if !placed {
                    out.push(merged.clone());
                    placed = true;
                }
                out.push(r);
            } else {
                merged = merged.start.min(r.start)..merged.end.max(r.end);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.ranges = out;
    }

    /// Returns true if `index` is in the set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(&index))
    }

    /// Number of indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.iter().map(ExactSizeIterator::len).sum()
    }

    /// Returns true if no index is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Underlying ranges in ascending order.
    #[must_use]
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Iterates indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(Clone::clone)
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.add(i);
        }
        set
    }
}

/// Changes between two versions of one observed row, table or collection.
///
/// Deletion indices refer to the old state; insertion and modification
/// indices refer to the new state.
#[derive(Debug, Clone, Default)]
pub struct RawChangeSet {
    /// Version the change starts from.
    pub from_version: VersionId,
    /// Version the change ends at.
    pub to_version: VersionId,
    /// Indices removed from the old state.
    pub deletions: IndexSet,
    /// Indices added in the new state.
    pub insertions: IndexSet,
    /// Indices whose contents changed.
    pub modifications: IndexSet,
    /// Per-column modified indices.
    pub columns: BTreeMap<ColKey, IndexSet>,
    /// The row owning the observed entity was deleted.
    pub root_deleted: bool,
    /// Previous values of changed columns (row observers only).
    pub old_values: BTreeMap<ColKey, EngineValue>,
    /// Current values of changed columns (row observers only).
    pub new_values: BTreeMap<ColKey, EngineValue>,
    /// Dictionary keys removed (dictionary observers only).
    pub key_deletions: Vec<String>,
    /// Dictionary keys added.
    pub key_insertions: Vec<String>,
    /// Dictionary keys whose values changed.
    pub key_modifications: Vec<String>,
}

impl RawChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.root_deleted
            && self.deletions.is_empty()
            && self.insertions.is_empty()
            && self.modifications.is_empty()
            && self.columns.is_empty()
            && self.key_deletions.is_empty()
            && self.key_insertions.is_empty()
            && self.key_modifications.is_empty()
    }

    fn between(old: &Snapshot, new: &Snapshot) -> Self {
        Self {
            from_version: old.version,
            to_version: new.version,
            ..Self::default()
        }
    }
}

/// Changes to a single row.
#[must_use]
pub fn row_changes(old: &Snapshot, new: &Snapshot, table: TableKey, row: ObjKey) -> RawChangeSet {
    let mut changes = RawChangeSet::between(old, new);
    let before = old.row_values(table, row).ok();
    let after = new.row_values(table, row).ok();
    match (before, after) {
        (Some(_), None) => {
            changes.root_deleted = true;
            changes.deletions.add(0);
        }
        (None, Some(_)) => changes.insertions.add(0),
        (Some(before), Some(after)) => {
            for (i, new_value) in after.iter().enumerate() {
                let old_value = before.get(i).unwrap_or(&EngineValue::Null);
                if !old_value.equals(new_value) {
                    let col = ColKey::from_parts(table, i as u32);
                    changes.columns.entry(col).or_default().add(0);
                    changes.old_values.insert(col, old_value.clone());
                    changes.new_values.insert(col, new_value.clone());
                }
            }
            if !changes.columns.is_empty() {
                changes.modifications.add(0);
            }
        }
        (None, None) => {}
    }
    changes
}

/// Changes to the ordered, optionally filtered rows of a table.
#[must_use]
pub fn table_changes(
    old: &Snapshot,
    new: &Snapshot,
    table: TableKey,
    predicate: Option<&Predicate>,
    sort: Option<&SortSpec>,
) -> RawChangeSet {
    let mut changes = RawChangeSet::between(old, new);
    let before = old.rows(table, predicate, sort).unwrap_or_default();
    let after = new.rows(table, predicate, sort).unwrap_or_default();
    let new_positions: HashMap<ObjKey, usize> =
        after.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let old_positions: HashMap<ObjKey, usize> =
        before.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    for (i, key) in before.iter().enumerate() {
        if !new_positions.contains_key(key) {
            changes.deletions.add(i);
        }
    }
    for (i, key) in after.iter().enumerate() {
        if !old_positions.contains_key(key) {
            changes.insertions.add(i);
            continue;
        }
        let (Ok(old_values), Ok(new_values)) =
            (old.row_values(table, *key), new.row_values(table, *key))
        else {
            continue;
        };
        for (c, value) in new_values.iter().enumerate() {
            let previous = old_values.get(c).unwrap_or(&EngineValue::Null);
            if !previous.equals(value) {
                changes.modifications.add(i);
                changes
                    .columns
                    .entry(ColKey::from_parts(table, c as u32))
                    .or_default()
                    .add(i);
            }
        }
    }
    changes
}

/// Changes to a list column of one row.
#[must_use]
pub fn list_changes(
    old: &Snapshot,
    new: &Snapshot,
    table: TableKey,
    row: ObjKey,
    column: ColKey,
) -> RawChangeSet {
    let mut changes = RawChangeSet::between(old, new);
    let before = list_items(old, table, row, column);
    let after = list_items(new, table, row, column);
    let (before, after) = match (before, after) {
        (Some(_), None) => {
            changes.root_deleted = true;
            return changes;
        }
        (None, Some(after)) => (Vec::new(), after),
        (None, None) => return changes,
        (Some(before), Some(after)) => (before, after),
    };

    let prefix = before
        .iter()
        .zip(&after)
        .take_while(|(a, b)| a.equals(b))
        .count();
    let max_suffix = before.len().min(after.len()) - prefix;
    let suffix = before
        .iter()
        .rev()
        .zip(after.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a.equals(b))
        .count();
    let old_mid = prefix..before.len() - suffix;
    let new_mid = prefix..after.len() - suffix;
    if old_mid.len() == new_mid.len() {
        changes.modifications.add_range(new_mid);
    } else {
        changes.deletions.add_range(old_mid);
        changes.insertions.add_range(new_mid);
    }
    changes
}

/// Changes to a dictionary column of one row, by key.
#[must_use]
pub fn dictionary_changes(
    old: &Snapshot,
    new: &Snapshot,
    table: TableKey,
    row: ObjKey,
    column: ColKey,
) -> RawChangeSet {
    let mut changes = RawChangeSet::between(old, new);
    let entries = |s: &Snapshot| match s.get_value(table, row, column).ok()? {
        EngineValue::Map(entries) => Some(entries),
        _ => None,
    };
    let (before, after) = match (entries(old), entries(new)) {
        (Some(_), None) => {
            changes.root_deleted = true;
            return changes;
        }
        (None, Some(after)) => (BTreeMap::new(), after),
        (None, None) => return changes,
        (Some(before), Some(after)) => (before, after),
    };

    changes.key_deletions = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .cloned()
        .collect();
    for (key, value) in &after {
        match before.get(key) {
            None => changes.key_insertions.push(key.clone()),
            Some(previous) if !previous.equals(value) => {
                changes.key_modifications.push(key.clone());
            }
            Some(_) => {}
        }
    }
    changes
}

fn list_items(s: &Snapshot, table: TableKey, row: ObjKey, column: ColKey) -> Option<Vec<EngineValue>> {
    match s.get_value(table, row, column).ok()? {
        EngineValue::List(items) => Some(items),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, TableSpec};
    use crate::value::ValueKind;
    use proptest::prelude::*;

    fn base() -> (Snapshot, TableKey) {
        let mut s = Snapshot::new();
        s.apply_schema(&[TableSpec::new("Item")
            .column(ColumnSpec::new("n", ValueKind::Int))
            .column(ColumnSpec::new("tags", ValueKind::Int).list())])
            .unwrap();
        let t = s.table_key("Item").unwrap();
        (s, t)
    }

    #[test]
    fn dictionary_changes_by_key() {
        let mut old = Snapshot::new();
        old.apply_schema(&[TableSpec::new("Item")
            .column(ColumnSpec::new("scores", ValueKind::Int).dictionary())])
            .unwrap();
        let t = old.table_key("Item").unwrap();
        let col = ColKey::from_parts(t, 0);
        let row = old.create_row(t, None).unwrap();
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            old.dictionary_insert(t, row, col, key.into(), EngineValue::Int(value))
                .unwrap();
        }

        let mut new = old.clone();
        new.dictionary_remove(t, row, col, "a").unwrap();
        new.dictionary_insert(t, row, col, "b".into(), EngineValue::Int(20))
            .unwrap();
        new.dictionary_insert(t, row, col, "d".into(), EngineValue::Int(4))
            .unwrap();
        let changes = dictionary_changes(&old, &new, t, row, col);
        assert_eq!(changes.key_deletions, ["a"]);
        assert_eq!(changes.key_modifications, ["b"]);
        assert_eq!(changes.key_insertions, ["d"]);
        assert!(!changes.is_empty());

        let same = dictionary_changes(&new, &new, t, row, col);
        assert!(same.is_empty());

        let mut gone = new.clone();
        gone.delete_row(t, row).unwrap();
        assert!(dictionary_changes(&new, &gone, t, row, col).root_deleted);
    }

    #[test]
    fn default_change_set_is_empty() {
        let change = RawChangeSet::default();
        assert!(change.is_empty());
        assert_eq!(change.from_version, VersionId::default());
        assert_eq!(change.to_version.as_u64(), 0);
    }

    #[test]
    fn index_set_coalesces() {
        let mut set = IndexSet::new();
        set.add(5);
        set.add(3);
        set.add(4);
        set.add_range(10..12);
        set.add(1);
        assert_eq!(set.ranges(), &[1..2, 3..6, 10..12]);
        assert_eq!(set.len(), 6);
        assert!(set.contains(4));
        assert!(!set.contains(6));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 4, 5, 10, 11]);
        set.add_range(2..10);
        assert_eq!(set.ranges(), &[1..12]);
    }

    #[test]
    fn row_modification_and_deletion() {
        let (mut old, t) = base();
        let row = old.create_row(t, None).unwrap();
        let mut new = old.clone();
        let n = ColKey::from_parts(t, 0);
        new.set_value(t, row, n, EngineValue::Int(4)).unwrap();
        new.version = old.version.next();

        let changes = row_changes(&old, &new, t, row);
        assert!(!changes.root_deleted);
        assert!(changes.columns.contains_key(&n));
        assert_eq!(changes.old_values[&n], EngineValue::Int(0));
        assert_eq!(changes.new_values[&n], EngineValue::Int(4));

        let mut gone = new.clone();
        gone.delete_row(t, row).unwrap();
        let changes = row_changes(&new, &gone, t, row);
        assert!(changes.root_deleted);

        assert!(row_changes(&old, &old, t, row).is_empty());
    }

    #[test]
    fn table_insert_delete_modify() {
        let (mut old, t) = base();
        let a = old.create_row(t, None).unwrap();
        let b = old.create_row(t, None).unwrap();
        let mut new = old.clone();
        new.delete_row(t, a).unwrap();
        new.set_value(t, b, ColKey::from_parts(t, 0), EngineValue::Int(9))
            .unwrap();
        new.create_row(t, None).unwrap();

        let changes = table_changes(&old, &new, t, None, None);
        assert_eq!(changes.deletions.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(changes.modifications.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(changes.insertions.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn list_append_is_insertion() {
        let (mut old, t) = base();
        let row = old.create_row(t, None).unwrap();
        let tags = ColKey::from_parts(t, 1);
        old.list_insert(t, row, tags, 0, EngineValue::Int(1)).unwrap();
        let mut new = old.clone();
        new.list_insert(t, row, tags, 1, EngineValue::Int(2)).unwrap();
        let changes = list_changes(&old, &new, t, row, tags);
        assert_eq!(changes.insertions.iter().collect::<Vec<_>>(), vec![1]);
        assert!(changes.deletions.is_empty());

        let mut replaced = new.clone();
        replaced
            .list_set(t, row, tags, 0, EngineValue::Int(7))
            .unwrap();
        let changes = list_changes(&new, &replaced, t, row, tags);
        assert_eq!(changes.modifications.iter().collect::<Vec<_>>(), vec![0]);

        let mut deleted = new.clone();
        deleted.delete_row(t, row).unwrap();
        assert!(list_changes(&new, &deleted, t, row, tags).root_deleted);
    }

    proptest! {
        #[test]
        fn index_set_matches_btreeset(indices in proptest::collection::vec(0usize..64, 0..40)) {
            let set: IndexSet = indices.iter().copied().collect();
            let expected: std::collections::BTreeSet<usize> = indices.iter().copied().collect();
            prop_assert_eq!(set.len(), expected.len());
            prop_assert_eq!(set.iter().collect::<Vec<_>>(), expected.into_iter().collect::<Vec<_>>());
            for pair in set.ranges().windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
        }

        #[test]
        fn list_diff_accounts_for_length(
            before in proptest::collection::vec(0i64..4, 0..12),
            after in proptest::collection::vec(0i64..4, 0..12),
        ) {
            let (mut old, t) = base();
            let row = old.create_row(t, None).unwrap();
            let tags = ColKey::from_parts(t, 1);
            let to_list = |v: &[i64]| EngineValue::List(v.iter().map(|i| EngineValue::Int(*i)).collect());
            old.set_value(t, row, tags, to_list(&before)).unwrap();
            let mut new = old.clone();
            new.set_value(t, row, tags, to_list(&after)).unwrap();
            let changes = list_changes(&old, &new, t, row, tags);
            prop_assert_eq!(
                before.len() + changes.insertions.len() - changes.deletions.len(),
                after.len()
            );
            for i in changes.insertions.iter().chain(changes.modifications.iter()) {
                prop_assert!(i < after.len());
            }
            for i in changes.deletions.iter() {
                prop_assert!(i < before.len());
            }
        }
    }
}
