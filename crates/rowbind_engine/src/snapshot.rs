//! Versioned table snapshots.
//!
//! A [`Snapshot`] is one consistent version of a file. Readers hold an
//! `Arc<Snapshot>`; a writer clones the latest snapshot, mutates the clone
//! and publishes it on commit.

use crate::error::{EngineError, EngineResult};
use crate::keys::{ColKey, ObjKey, TableKey, VersionId};
use crate::predicate::{Predicate, SortSpec};
use crate::schema::{CollectionKind, ColumnSpec, TableInfo, TableSpec};
use crate::value::{EngineObjectId, EngineUuid, EngineValue, ValueKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Rows of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table key.
    pub key: TableKey,
    /// Table description.
    pub spec: TableSpec,
    /// Column values per row, in column order.
    pub rows: BTreeMap<ObjKey, Vec<EngineValue>>,
    /// Next row key to hand out. Keys are never reused.
    pub next_row: i64,
    /// Rows by primary key. Rebuilt after decoding.
    #[serde(skip)]
    primary_index: BTreeMap<IndexKey, ObjKey>,
}

/// Ordered form of a primary key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum IndexKey {
    Null,
    Int(i64),
    String(String),
    Uuid(EngineUuid),
    ObjectId(EngineObjectId),
}

impl IndexKey {
    fn from_value(value: &EngineValue) -> Option<Self> {
        match value {
            EngineValue::Null => Some(Self::Null),
            EngineValue::Int(v) => Some(Self::Int(*v)),
            EngineValue::String(v) => Some(Self::String(v.clone())),
            EngineValue::Uuid(v) => Some(Self::Uuid(*v)),
            EngineValue::ObjectId(v) => Some(Self::ObjectId(*v)),
            _ => None,
        }
    }
}

impl Table {
    fn new(key: TableKey, spec: TableSpec) -> Self {
        Self {
            key,
            spec,
            rows: BTreeMap::new(),
            next_row: 0,
            primary_index: BTreeMap::new(),
        }
    }

    fn rebuild_primary_index(&mut self) {
        self.primary_index.clear();
        let Some(pk) = self.spec.primary_key_index() else {
            return;
        };
        for (row, values) in &self.rows {
            if let Some(key) = values.get(pk).and_then(IndexKey::from_value) {
                self.primary_index.insert(key, *row);
            }
        }
    }

    fn remove_row(&mut self, row: ObjKey) -> bool {
        let Some(values) = self.rows.remove(&row) else {
            return false;
        };
        if let Some(key) = self
            .spec
            .primary_key_index()
            .and_then(|pk| values.get(pk))
            .and_then(IndexKey::from_value)
        {
            self.primary_index.remove(&key);
        }
        true
    }

    /// Metadata view of the table.
    #[must_use]
    pub fn info(&self) -> TableInfo {
        let columns: Vec<(String, ColKey)> = self
            .spec
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), ColKey::from_parts(self.key, i as u32)))
            .collect();
        let primary_key = self
            .spec
            .primary_key_index()
            .map(|i| ColKey::from_parts(self.key, i as u32));
        TableInfo {
            key: self.key,
            name: self.spec.name.clone(),
            embedded: self.spec.embedded,
            columns,
            primary_key,
        }
    }

    fn column(&self, col: ColKey) -> EngineResult<&ColumnSpec> {
        if col.table() != self.key {
            return Err(EngineError::column_not_found(&self.spec.name, col.to_string()));
        }
        self.spec
            .columns
            .get(col.index())
            .ok_or_else(|| EngineError::column_not_found(&self.spec.name, col.to_string()))
    }

    fn row(&self, row: ObjKey) -> EngineResult<&Vec<EngineValue>> {
        self.rows.get(&row).ok_or(EngineError::RowNotFound {
            table: self.key,
            row,
        })
    }

    fn row_mut(&mut self, row: ObjKey) -> EngineResult<&mut Vec<EngineValue>> {
        let table = self.key;
        self.rows
            .get_mut(&row)
            .ok_or(EngineError::RowNotFound { table, row })
    }
}

/// Initial value of a column in a freshly created row.
#[must_use]
pub fn default_value(column: &ColumnSpec) -> EngineValue {
    match column.collection {
        CollectionKind::List | CollectionKind::Set => EngineValue::List(Vec::new()),
        CollectionKind::Dictionary => EngineValue::Map(BTreeMap::new()),
        CollectionKind::Single if column.nullable => EngineValue::Null,
        CollectionKind::Single => EngineValue::default_for(column.kind),
    }
}

/// Sorts set elements by value and drops duplicates.
fn normalize_set(mut items: Vec<EngineValue>) -> Vec<EngineValue> {
    items.sort_by(EngineValue::total_cmp);
    items.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    items
}

/// One consistent version of every table in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Version of this snapshot.
    pub version: VersionId,
    /// Tables indexed by [`TableKey`].
    pub tables: Vec<Table>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// Creates an empty snapshot at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: VersionId::new(0),
            tables: Vec::new(),
        }
    }

    /// Applies table specs additively.
    ///
    /// Missing tables and columns are created. A column whose definition
    /// differs from the stored one is a [`EngineError::SchemaMismatch`].
    /// Returns true if anything changed.
    pub fn apply_schema(&mut self, specs: &[TableSpec]) -> EngineResult<bool> {
        let mut changed = false;
        for spec in specs {
            match self.tables.iter().position(|t| t.spec.name == spec.name) {
                Some(pos) => {
                    changed |= Self::migrate_table(&mut self.tables[pos], spec)?;
                }
                None => {
                    let key = TableKey::new(self.tables.len() as u32);
                    self.tables.push(Table::new(key, spec.clone()));
                    changed = true;
                }
            }
        }
        for table in &self.tables {
            for column in &table.spec.columns {
                if let Some(target) = &column.link_target {
                    if self.table_key(target).is_none() {
                        return Err(EngineError::schema_mismatch(format!(
                            "{}.{} links to unknown table {target}",
                            table.spec.name, column.name
                        )));
                    }
                }
            }
        }
        Ok(changed)
    }

    fn migrate_table(table: &mut Table, spec: &TableSpec) -> EngineResult<bool> {
        if table.spec.embedded != spec.embedded {
            return Err(EngineError::schema_mismatch(format!(
                "table {} changed between embedded and top-level",
                spec.name
            )));
        }
        let mut changed = false;
        for column in &spec.columns {
            match table.spec.column_index(&column.name) {
                Some(idx) => {
                    if table.spec.columns[idx] != *column {
                        return Err(EngineError::schema_mismatch(format!(
                            "column {}.{} does not match the stored definition",
                            spec.name, column.name
                        )));
                    }
                }
                None => {
                    if column.primary_key {
                        return Err(EngineError::schema_mismatch(format!(
                            "cannot add primary key {}.{} to an existing table",
                            spec.name, column.name
                        )));
                    }
                    let initial = default_value(column);
                    for values in table.rows.values_mut() {
                        values.push(initial.clone());
                    }
                    table.spec.columns.push(column.clone());
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Looks up a table key by name.
    #[must_use]
    pub fn table_key(&self, name: &str) -> Option<TableKey> {
        self.tables
            .iter()
            .find(|t| t.spec.name == name)
            .map(|t| t.key)
    }

    /// Returns the table for a key.
    pub fn table(&self, key: TableKey) -> EngineResult<&Table> {
        self.tables
            .get(key.value() as usize)
            .ok_or(EngineError::UnknownTable { table: key })
    }

    fn table_mut(&mut self, key: TableKey) -> EngineResult<&mut Table> {
        self.tables
            .get_mut(key.value() as usize)
            .ok_or(EngineError::UnknownTable { table: key })
    }

    /// Returns true if the row exists.
    #[must_use]
    pub fn row_exists(&self, table: TableKey, row: ObjKey) -> bool {
        self.table(table)
            .map(|t| t.rows.contains_key(&row))
            .unwrap_or(false)
    }

    /// Finds the row whose primary key equals `key`.
    pub fn find_by_primary_key(
        &self,
        table: TableKey,
        key: &EngineValue,
    ) -> EngineResult<Option<ObjKey>> {
        let t = self.table(table)?;
        let Some(pk) = t.spec.primary_key_index() else {
            return Err(EngineError::invalid_state(format!(
                "table {} has no primary key",
                t.spec.name
            )));
        };
        match IndexKey::from_value(key) {
            Some(indexed) => Ok(t.primary_index.get(&indexed).copied()),
            None => Ok(t
                .rows
                .iter()
                .find(|(_, values)| values[pk].equals(key))
                .map(|(row, _)| *row)),
        }
    }

    /// Creates a row with default values.
    ///
    /// Tables with a primary key require `primary_key`; tables without one
    /// reject it.
    pub fn create_row(
        &mut self,
        table: TableKey,
        primary_key: Option<EngineValue>,
    ) -> EngineResult<ObjKey> {
        let t = self.table(table)?;
        let pk_index = t.spec.primary_key_index();
        match (pk_index, &primary_key) {
            (Some(idx), Some(value)) => {
                self.validate(&t.spec.columns[idx], value, false)?;
                if self.find_by_primary_key(table, value)?.is_some() {
                    return Err(EngineError::DuplicatePrimaryKey {
                        table: t.spec.name.clone(),
                        key: value.to_string(),
                    });
                }
            }
            (Some(_), None) => {
                return Err(EngineError::invalid_state(format!(
                    "table {} requires a primary key value",
                    t.spec.name
                )));
            }
            (None, Some(_)) => {
                return Err(EngineError::invalid_state(format!(
                    "table {} has no primary key",
                    t.spec.name
                )));
            }
            (None, None) => {}
        }

        let t = self.table_mut(table)?;
        let mut values: Vec<EngineValue> = t.spec.columns.iter().map(default_value).collect();
        let row = ObjKey::new(t.next_row);
        if let (Some(idx), Some(value)) = (pk_index, primary_key) {
            if let Some(key) = IndexKey::from_value(&value) {
                t.primary_index.insert(key, row);
            }
            values[idx] = value;
        }
        t.next_row += 1;
        t.rows.insert(row, values);
        Ok(row)
    }

    /// Deletes a row.
    ///
    /// Embedded rows owned by the deleted row are deleted with it, and links
    /// pointing at any deleted row are cleared.
    pub fn delete_row(&mut self, table: TableKey, row: ObjKey) -> EngineResult<()> {
        self.table(table)?.row(row)?;
        let mut pending = vec![(table, row)];
        while let Some((table, row)) = pending.pop() {
            let owned = self.embedded_children(table, row)?;
            let removed = self.table_mut(table)?.remove_row(row);
            if !removed {
                continue;
            }
            pending.extend(owned);
            self.clear_inbound_links(table, row)?;
        }
        Ok(())
    }

    fn embedded_children(
        &self,
        table: TableKey,
        row: ObjKey,
    ) -> EngineResult<Vec<(TableKey, ObjKey)>> {
        let t = self.table(table)?;
        let Some(values) = t.rows.get(&row) else {
            return Ok(Vec::new());
        };
        let mut children = Vec::new();
        for (column, value) in t.spec.columns.iter().zip(values) {
            let Some(target) = self.embedded_target(column) else {
                continue;
            };
            match value {
                EngineValue::Link(child) => children.push((target, *child)),
                EngineValue::List(items) => {
                    children.extend(items.iter().filter_map(|v| v.as_link().map(|k| (target, k))));
                }
                EngineValue::Map(entries) => {
                    children.extend(
                        entries
                            .values()
                            .filter_map(|v| v.as_link().map(|k| (target, k))),
                    );
                }
                _ => {}
            }
        }
        Ok(children)
    }

    fn embedded_target(&self, column: &ColumnSpec) -> Option<TableKey> {
        let target = self.table_key(column.link_target.as_deref()?)?;
        self.table(target)
            .ok()
            .filter(|t| t.spec.embedded)
            .map(|t| t.key)
    }

    fn clear_inbound_links(&mut self, target: TableKey, row: ObjKey) -> EngineResult<()> {
        let target_name = self.table(target)?.spec.name.clone();
        for t in &mut self.tables {
            let link_columns: Vec<usize> = t
                .spec
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.link_target.as_deref() == Some(target_name.as_str()))
                .map(|(i, _)| i)
                .collect();
            if link_columns.is_empty() {
                continue;
            }
            for values in t.rows.values_mut() {
                for &idx in &link_columns {
                    if values[idx].as_link() == Some(row) {
                        values[idx] = EngineValue::Null;
                    } else if let EngineValue::List(items) = &mut values[idx] {
                        items.retain(|v| v.as_link() != Some(row));
                    } else if let EngineValue::Map(entries) = &mut values[idx] {
                        for value in entries.values_mut() {
                            if value.as_link() == Some(row) {
                                *value = EngineValue::Null;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads one column of one row.
    pub fn get_value(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<EngineValue> {
        let t = self.table(table)?;
        t.column(col)?;
        Ok(t.row(row)?[col.index()].clone())
    }

    /// Returns all column values of a row.
    pub fn row_values(&self, table: TableKey, row: ObjKey) -> EngineResult<&[EngineValue]> {
        Ok(self.table(table)?.row(row)?.as_slice())
    }

    /// Writes one column of one row.
    pub fn set_value(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        value: EngineValue,
    ) -> EngineResult<()> {
        let t = self.table(table)?;
        let column = t.column(col)?;
        let current = t.row(row)?[col.index()].clone();
        if column.primary_key {
            if current.equals(&value) {
                return Ok(());
            }
            return Err(EngineError::PrimaryKeyImmutable {
                table: t.spec.name.clone(),
            });
        }
        self.validate(column, &value, false)?;
        let embedded = self.embedded_target(column);
        let value = match (column.collection, value) {
            (CollectionKind::Set, EngineValue::List(items)) => EngineValue::List(normalize_set(items)),
            (_, value) => value,
        };

        self.table_mut(table)?.row_mut(row)?[col.index()] = value.clone();

        if let Some(target) = embedded {
            for orphan in orphaned_links(&current, &value) {
                self.delete_row(target, orphan)?;
            }
        }
        Ok(())
    }

    /// Adds `delta` to an integer column and returns the new value.
    pub fn add_int(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        delta: i64,
    ) -> EngineResult<i64> {
        let t = self.table(table)?;
        let column = t.column(col)?;
        if column.kind != ValueKind::Int || column.collection != CollectionKind::Single {
            return Err(EngineError::TypeMismatch {
                expected: column.kind,
                actual: Some(ValueKind::Int),
            });
        }
        let slot = &mut self.table_mut(table)?.row_mut(row)?[col.index()];
        match slot {
            EngineValue::Int(v) => {
                *v = v.wrapping_add(delta);
                Ok(*v)
            }
            _ => Err(EngineError::invalid_state("cannot increment a null value")),
        }
    }

    fn list_column(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<(&ColumnSpec, &Vec<EngineValue>)> {
        let t = self.table(table)?;
        let column = t.column(col)?;
        match &t.row(row)?[col.index()] {
            EngineValue::List(items) if column.is_sequence() => Ok((column, items)),
            other => Err(EngineError::TypeMismatch {
                expected: column.kind,
                actual: other.kind(),
            }),
        }
    }

    fn list_mut(&mut self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<&mut Vec<EngineValue>> {
        self.list_column(table, row, col)?;
        match &mut self.table_mut(table)?.row_mut(row)?[col.index()] {
            EngineValue::List(items) => Ok(items),
            _ => Err(EngineError::invalid_state("list column holds a scalar")),
        }
    }

    /// Length of a list column.
    pub fn list_len(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<usize> {
        Ok(self.list_column(table, row, col)?.1.len())
    }

    /// Reads one list element.
    pub fn list_get(
        &self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue> {
        let (_, items) = self.list_column(table, row, col)?;
        items.get(index).cloned().ok_or(EngineError::IndexOutOfBounds {
            index,
            len: items.len(),
        })
    }

    /// Replaces one list element.
    pub fn list_set(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()> {
        let (column, items) = self.list_column(table, row, col)?;
        reject_positional(column)?;
        if index >= items.len() {
            return Err(EngineError::IndexOutOfBounds {
                index,
                len: items.len(),
            });
        }
        self.validate(column, &value, true)?;
        let embedded = self.embedded_target(column);
        let old = std::mem::replace(&mut self.list_mut(table, row, col)?[index], value.clone());
        if let Some(target) = embedded {
            for orphan in orphaned_links(&old, &value) {
                self.delete_row(target, orphan)?;
            }
        }
        Ok(())
    }

    /// Inserts a list element at `index` (which may equal the length).
    pub fn list_insert(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        index: usize,
        value: EngineValue,
    ) -> EngineResult<()> {
        let (column, items) = self.list_column(table, row, col)?;
        reject_positional(column)?;
        if index > items.len() {
            return Err(EngineError::IndexOutOfBounds {
                index,
                len: items.len(),
            });
        }
        self.validate(column, &value, true)?;
        self.list_mut(table, row, col)?.insert(index, value);
        Ok(())
    }

    /// Removes and returns one list element.
    pub fn list_remove(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        index: usize,
    ) -> EngineResult<EngineValue> {
        let (column, items) = self.list_column(table, row, col)?;
        if index >= items.len() {
            return Err(EngineError::IndexOutOfBounds {
                index,
                len: items.len(),
            });
        }
        let embedded = self.embedded_target(column);
        let removed = self.list_mut(table, row, col)?.remove(index);
        if let (Some(target), Some(child)) = (embedded, removed.as_link()) {
            self.delete_row(target, child)?;
        }
        Ok(removed)
    }

    /// Removes every list element.
    pub fn list_clear(&mut self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<()> {
        let (column, _) = self.list_column(table, row, col)?;
        let embedded = self.embedded_target(column);
        let removed = std::mem::take(self.list_mut(table, row, col)?);
        if let Some(target) = embedded {
            for child in removed.iter().filter_map(EngineValue::as_link) {
                self.delete_row(target, child)?;
            }
        }
        Ok(())
    }

    fn set_column(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<(&ColumnSpec, &Vec<EngineValue>)> {
        let (column, items) = self.list_column(table, row, col)?;
        if column.collection != CollectionKind::Set {
            return Err(EngineError::invalid_state(format!(
                "column {} is not a set",
                column.name
            )));
        }
        Ok((column, items))
    }

    /// Position of `value` in a set column.
    pub fn set_find(
        &self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>> {
        let (_, items) = self.set_column(table, row, col)?;
        Ok(items.binary_search_by(|item| item.total_cmp(value)).ok())
    }

    /// Adds `value` to a set column. Returns its position and whether it
    /// was inserted; an equal element already present is left in place.
    pub fn set_insert(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        value: EngineValue,
    ) -> EngineResult<(usize, bool)> {
        let (column, items) = self.set_column(table, row, col)?;
        match items.binary_search_by(|item| item.total_cmp(&value)) {
            Ok(index) => Ok((index, false)),
            Err(index) => {
                self.validate(column, &value, true)?;
                self.list_mut(table, row, col)?.insert(index, value);
                Ok((index, true))
            }
        }
    }

    /// Removes `value` from a set column and returns its former position.
    pub fn set_remove(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        value: &EngineValue,
    ) -> EngineResult<Option<usize>> {
        let Some(index) = self.set_find(table, row, col, value)? else {
            return Ok(None);
        };
        self.list_mut(table, row, col)?.remove(index);
        Ok(Some(index))
    }

    fn dictionary_column(
        &self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
    ) -> EngineResult<(&ColumnSpec, &BTreeMap<String, EngineValue>)> {
        let t = self.table(table)?;
        let column = t.column(col)?;
        match &t.row(row)?[col.index()] {
            EngineValue::Map(entries) if column.collection == CollectionKind::Dictionary => {
                Ok((column, entries))
            }
            other => Err(EngineError::TypeMismatch {
                expected: column.kind,
                actual: other.kind(),
            }),
        }
    }

    fn dictionary_mut(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
    ) -> EngineResult<&mut BTreeMap<String, EngineValue>> {
        self.dictionary_column(table, row, col)?;
        match &mut self.table_mut(table)?.row_mut(row)?[col.index()] {
            EngineValue::Map(entries) => Ok(entries),
            _ => Err(EngineError::invalid_state("dictionary column holds a scalar")),
        }
    }

    /// Number of entries in a dictionary column.
    pub fn dictionary_len(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<usize> {
        Ok(self.dictionary_column(table, row, col)?.1.len())
    }

    /// Keys of a dictionary column in ascending order.
    pub fn dictionary_keys(&self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<Vec<String>> {
        Ok(self.dictionary_column(table, row, col)?.1.keys().cloned().collect())
    }

    /// Value stored under `key`.
    pub fn dictionary_get(
        &self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>> {
        Ok(self.dictionary_column(table, row, col)?.1.get(key).cloned())
    }

    /// Stores `value` under `key` and returns the value it replaced.
    pub fn dictionary_insert(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        key: String,
        value: EngineValue,
    ) -> EngineResult<Option<EngineValue>> {
        let (column, _) = self.dictionary_column(table, row, col)?;
        self.validate(column, &value, true)?;
        let embedded = self.embedded_target(column);
        let previous = self.dictionary_mut(table, row, col)?.insert(key, value.clone());
        if let (Some(target), Some(old)) = (embedded, &previous) {
            for orphan in orphaned_links(old, &value) {
                self.delete_row(target, orphan)?;
            }
        }
        Ok(previous)
    }

    /// Removes `key` and returns its value.
    pub fn dictionary_remove(
        &mut self,
        table: TableKey,
        row: ObjKey,
        col: ColKey,
        key: &str,
    ) -> EngineResult<Option<EngineValue>> {
        let (column, _) = self.dictionary_column(table, row, col)?;
        let embedded = self.embedded_target(column);
        let removed = self.dictionary_mut(table, row, col)?.remove(key);
        if let (Some(target), Some(child)) = (embedded, removed.as_ref().and_then(EngineValue::as_link)) {
            self.delete_row(target, child)?;
        }
        Ok(removed)
    }

    /// Removes every dictionary entry.
    pub fn dictionary_clear(&mut self, table: TableKey, row: ObjKey, col: ColKey) -> EngineResult<()> {
        let (column, _) = self.dictionary_column(table, row, col)?;
        let embedded = self.embedded_target(column);
        let removed = std::mem::take(self.dictionary_mut(table, row, col)?);
        if let Some(target) = embedded {
            for child in removed.values().filter_map(EngineValue::as_link) {
                self.delete_row(target, child)?;
            }
        }
        Ok(())
    }

    /// Keys of the rows matching `predicate`, in key order or sorted.
    pub fn rows(
        &self,
        table: TableKey,
        predicate: Option<&Predicate>,
        sort: Option<&SortSpec>,
    ) -> EngineResult<Vec<ObjKey>> {
        let t = self.table(table)?;
        let mut matched: Vec<(ObjKey, &Vec<EngineValue>)> = t
            .rows
            .iter()
            .filter(|(_, values)| predicate.map_or(true, |p| p.evaluate(values)))
            .map(|(k, v)| (*k, v))
            .collect();
        if let Some(sort) = sort {
            matched.sort_by(|a, b| sort.compare(a.1, b.1));
        }
        Ok(matched.into_iter().map(|(k, _)| k).collect())
    }

    fn validate(&self, column: &ColumnSpec, value: &EngineValue, element: bool) -> EngineResult<()> {
        if !element {
            match (column.collection, value) {
                (CollectionKind::Single, _) => {}
                (CollectionKind::List | CollectionKind::Set, EngineValue::List(items)) => {
                    return items.iter().try_for_each(|item| self.validate(column, item, true));
                }
                (CollectionKind::Dictionary, EngineValue::Map(entries)) => {
                    return entries
                        .values()
                        .try_for_each(|item| self.validate(column, item, true));
                }
                _ => {
                    return Err(EngineError::TypeMismatch {
                        expected: column.kind,
                        actual: value.kind(),
                    });
                }
            }
        }
        match value {
            EngineValue::Null if column.nullable => Ok(()),
            EngineValue::Null => Err(EngineError::NullNotAllowed {
                column: column.name.clone(),
            }),
            EngineValue::Link(target_row) => {
                if column.kind != ValueKind::Link {
                    return Err(EngineError::TypeMismatch {
                        expected: column.kind,
                        actual: Some(ValueKind::Link),
                    });
                }
                let target_name = column.link_target.as_deref().unwrap_or_default();
                let target = self.table_key(target_name).ok_or_else(|| EngineError::TableNotFound {
                    name: target_name.to_string(),
                })?;
                if self.row_exists(target, *target_row) {
                    Ok(())
                } else {
                    Err(EngineError::RowNotFound {
                        table: target,
                        row: *target_row,
                    })
                }
            }
            other if other.kind() == Some(column.kind) => Ok(()),
            other if column.kind == ValueKind::Mixed && other.kind().is_some() => Ok(()),
            other => Err(EngineError::TypeMismatch {
                expected: column.kind,
                actual: other.kind(),
            }),
        }
    }

    /// Encodes the snapshot as CBOR.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| EngineError::Encode {
            message: e.to_string(),
        })?;
        Ok(buf)
    }

    /// Decodes a snapshot from CBOR.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let mut snapshot: Self =
            ciborium::from_reader(bytes).map_err(|e| EngineError::Decode {
                message: e.to_string(),
            })?;
        for table in &mut snapshot.tables {
            table.rebuild_primary_index();
        }
        Ok(snapshot)
    }

    /// Writes the snapshot to `path` through a temporary file and rename.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let bytes = self.encode()?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a snapshot from `path`, or returns `None` if the file is absent.
    pub fn load(path: &Path) -> EngineResult<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn links_in(value: &EngineValue) -> Vec<ObjKey> {
    match value {
        EngineValue::Link(k) => vec![*k],
        EngineValue::List(items) => items.iter().filter_map(EngineValue::as_link).collect(),
        EngineValue::Map(entries) => entries.values().filter_map(EngineValue::as_link).collect(),
        _ => Vec::new(),
    }
}

fn orphaned_links(old: &EngineValue, new: &EngineValue) -> Vec<ObjKey> {
    let keep = links_in(new);
    links_in(old).into_iter().filter(|k| !keep.contains(k)).collect()
}

fn reject_positional(column: &ColumnSpec) -> EngineResult<()> {
    if column.collection == CollectionKind::Set {
        Err(EngineError::invalid_state(format!(
            "set {} places elements by value",
            column.name
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<TableSpec> {
        vec![
            TableSpec::new("Person")
                .column(ColumnSpec::new("id", ValueKind::Int).primary_key())
                .column(ColumnSpec::new("name", ValueKind::String))
                .column(ColumnSpec::link("dog", "Dog"))
                .column(ColumnSpec::link("address", "Address"))
                .column(ColumnSpec::new("tags", ValueKind::String).list()),
            TableSpec::new("Dog").column(ColumnSpec::new("name", ValueKind::String)),
            TableSpec::embedded("Address").column(ColumnSpec::new("city", ValueKind::String)),
        ]
    }

    fn snapshot() -> Snapshot {
        let mut s = Snapshot::new();
        assert!(s.apply_schema(&specs()).unwrap());
        s
    }

    fn person_cols(s: &Snapshot) -> TableInfo {
        s.table(s.table_key("Person").unwrap()).unwrap().info()
    }

    #[test]
    fn create_and_read() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let info = person_cols(&s);
        let row = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let name = info.column("name").unwrap();
        assert_eq!(
            s.get_value(person, row, name).unwrap(),
            EngineValue::String(String::new())
        );
        s.set_value(person, row, name, EngineValue::String("Ada".into()))
            .unwrap();
        assert_eq!(
            s.get_value(person, row, name).unwrap(),
            EngineValue::String("Ada".into())
        );
    }

    #[test]
    fn duplicate_primary_key_rejected() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let err = s.create_row(person, Some(EngineValue::Int(1))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePrimaryKey { .. }));
        assert!(s.create_row(person, None).is_err());
    }

    #[test]
    fn primary_key_index_tracks_rows() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let ada = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let lin = s.create_row(person, Some(EngineValue::Int(2))).unwrap();
        assert_eq!(s.find_by_primary_key(person, &EngineValue::Int(2)).unwrap(), Some(lin));

        s.delete_row(person, ada).unwrap();
        assert_eq!(s.find_by_primary_key(person, &EngineValue::Int(1)).unwrap(), None);
        let again = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        assert_ne!(again, ada);

        let decoded = Snapshot::decode(&s.encode().unwrap()).unwrap();
        assert_eq!(decoded.find_by_primary_key(person, &EngineValue::Int(1)).unwrap(), Some(again));
        assert_eq!(decoded.find_by_primary_key(person, &EngineValue::Int(2)).unwrap(), Some(lin));
        let dog = s.table_key("Dog").unwrap();
        assert!(decoded.find_by_primary_key(dog, &EngineValue::Int(1)).is_err());
    }

    #[test]
    fn primary_key_immutable() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let id = person_cols(&s).column("id").unwrap();
        let row = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        s.set_value(person, row, id, EngineValue::Int(1)).unwrap();
        let err = s.set_value(person, row, id, EngineValue::Int(2)).unwrap_err();
        assert!(matches!(err, EngineError::PrimaryKeyImmutable { .. }));
    }

    #[test]
    fn type_checks() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let name = person_cols(&s).column("name").unwrap();
        let row = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        assert!(matches!(
            s.set_value(person, row, name, EngineValue::Int(3)),
            Err(EngineError::TypeMismatch { .. })
        ));
        assert!(matches!(
            s.set_value(person, row, name, EngineValue::Null),
            Err(EngineError::NullNotAllowed { .. })
        ));
    }

    #[test]
    fn wrong_table_column_rejected() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let dog = s.table_key("Dog").unwrap();
        let row = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let dog_name = ColKey::from_parts(dog, 0);
        assert!(matches!(
            s.get_value(person, row, dog_name),
            Err(EngineError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn delete_clears_links_and_cascades_embedded() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let dog = s.table_key("Dog").unwrap();
        let address = s.table_key("Address").unwrap();
        let info = person_cols(&s);
        let p = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let d = s.create_row(dog, None).unwrap();
        let a = s.create_row(address, None).unwrap();
        s.set_value(person, p, info.column("dog").unwrap(), EngineValue::Link(d))
            .unwrap();
        s.set_value(person, p, info.column("address").unwrap(), EngineValue::Link(a))
            .unwrap();

        s.delete_row(dog, d).unwrap();
        assert_eq!(
            s.get_value(person, p, info.column("dog").unwrap()).unwrap(),
            EngineValue::Null
        );

        s.delete_row(person, p).unwrap();
        assert!(!s.row_exists(address, a));
        assert!(matches!(
            s.get_value(person, p, info.column("name").unwrap()),
            Err(EngineError::RowNotFound { .. })
        ));
    }

    #[test]
    fn replacing_embedded_link_deletes_old_row() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let address = s.table_key("Address").unwrap();
        let col = person_cols(&s).column("address").unwrap();
        let p = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        let a1 = s.create_row(address, None).unwrap();
        let a2 = s.create_row(address, None).unwrap();
        s.set_value(person, p, col, EngineValue::Link(a1)).unwrap();
        s.set_value(person, p, col, EngineValue::Link(a2)).unwrap();
        assert!(!s.row_exists(address, a1));
        assert!(s.row_exists(address, a2));
    }

    #[test]
    fn link_to_missing_row_rejected() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let col = person_cols(&s).column("dog").unwrap();
        let p = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        assert!(matches!(
            s.set_value(person, p, col, EngineValue::Link(ObjKey::new(99))),
            Err(EngineError::RowNotFound { .. })
        ));
    }

    #[test]
    fn list_point_operations() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let tags = person_cols(&s).column("tags").unwrap();
        let p = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        s.list_insert(person, p, tags, 0, EngineValue::String("a".into()))
            .unwrap();
        s.list_insert(person, p, tags, 1, EngineValue::String("c".into()))
            .unwrap();
        s.list_insert(person, p, tags, 1, EngineValue::String("b".into()))
            .unwrap();
        assert_eq!(s.list_len(person, p, tags).unwrap(), 3);
        assert_eq!(
            s.list_get(person, p, tags, 1).unwrap(),
            EngineValue::String("b".into())
        );
        s.list_set(person, p, tags, 0, EngineValue::String("z".into()))
            .unwrap();
        assert_eq!(
            s.list_remove(person, p, tags, 0).unwrap(),
            EngineValue::String("z".into())
        );
        assert!(matches!(
            s.list_get(person, p, tags, 5),
            Err(EngineError::IndexOutOfBounds { index: 5, len: 2 })
        ));
        s.list_clear(person, p, tags).unwrap();
        assert_eq!(s.list_len(person, p, tags).unwrap(), 0);
    }

    #[test]
    fn add_int_increments() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let name = person_cols(&s).column("name").unwrap();
        let p = s.create_row(person, Some(EngineValue::Int(1))).unwrap();
        assert!(s.add_int(person, p, name, 1).is_err());
        let mut s2 = Snapshot::new();
        s2.apply_schema(&[TableSpec::new("Counter").column(ColumnSpec::new("n", ValueKind::Int))])
            .unwrap();
        let counter = s2.table_key("Counter").unwrap();
        let n = ColKey::from_parts(counter, 0);
        let row = s2.create_row(counter, None).unwrap();
        assert_eq!(s2.add_int(counter, row, n, 5).unwrap(), 5);
        assert_eq!(s2.add_int(counter, row, n, -2).unwrap(), 3);
    }

    #[test]
    fn additive_migration() {
        let mut s = snapshot();
        let dog = s.table_key("Dog").unwrap();
        let d = s.create_row(dog, None).unwrap();
        let extended = TableSpec::new("Dog")
            .column(ColumnSpec::new("name", ValueKind::String))
            .column(ColumnSpec::new("age", ValueKind::Int).nullable());
        assert!(s.apply_schema(&[extended.clone()]).unwrap());
        assert!(!s.apply_schema(&[extended]).unwrap());
        assert_eq!(
            s.get_value(dog, d, ColKey::from_parts(dog, 1)).unwrap(),
            EngineValue::Null
        );

        let conflicting =
            TableSpec::new("Dog").column(ColumnSpec::new("name", ValueKind::Int));
        assert!(matches!(
            s.apply_schema(&[conflicting]),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn unknown_link_target_rejected() {
        let mut s = Snapshot::new();
        let spec = TableSpec::new("A").column(ColumnSpec::link("b", "Missing"));
        assert!(matches!(
            s.apply_schema(&[spec]),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn filtered_sorted_rows() {
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let info = person_cols(&s);
        let id = info.column("id").unwrap();
        for i in [3, 1, 2] {
            s.create_row(person, Some(EngineValue::Int(i))).unwrap();
        }
        let pred = Predicate::Compare {
            column: id,
            op: crate::predicate::CompareOp::Greater,
            value: EngineValue::Int(1),
        };
        let sort = SortSpec {
            column: id,
            ascending: true,
        };
        let rows = s.rows(person, Some(&pred), Some(&sort)).unwrap();
        let ids: Vec<EngineValue> = rows
            .iter()
            .map(|r| s.get_value(person, *r, id).unwrap())
            .collect();
        assert_eq!(ids, vec![EngineValue::Int(2), EngineValue::Int(3)]);
    }

    #[test]
    fn persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.rowbind");
        let mut s = snapshot();
        let person = s.table_key("Person").unwrap();
        let name = person_cols(&s).column("name").unwrap();
        let row = s.create_row(person, Some(EngineValue::Int(7))).unwrap();
        s.set_value(person, row, name, EngineValue::String("Lin".into()))
            .unwrap();
        s.version = VersionId::new(3);
        s.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.version, VersionId::new(3));
        assert_eq!(
            loaded.get_value(person, row, name).unwrap(),
            EngineValue::String("Lin".into())
        );
        assert!(Snapshot::load(&dir.path().join("absent")).unwrap().is_none());
    }

    fn collections() -> (Snapshot, TableKey, ObjKey, TableInfo) {
        let mut s = Snapshot::new();
        s.apply_schema(&[
            TableSpec::new("Box")
                .column(ColumnSpec::new("labels", ValueKind::String).set())
                .column(ColumnSpec::new("scores", ValueKind::Int).nullable().dictionary())
                .column(ColumnSpec::mixed("any"))
                .column(ColumnSpec::link("rooms", "Room").dictionary())
                .column(ColumnSpec::link("parts", "Room").list()),
            TableSpec::embedded("Room").column(ColumnSpec::new("size", ValueKind::Int)),
        ])
        .unwrap();
        let table = s.table_key("Box").unwrap();
        let info = s.table(table).unwrap().info();
        let row = s.create_row(table, None).unwrap();
        (s, table, row, info)
    }

    #[test]
    fn set_keeps_sorted_distinct_elements() {
        let (mut s, table, row, info) = collections();
        let labels = info.column("labels").unwrap();
        let b = EngineValue::String("b".into());
        let a = EngineValue::String("a".into());
        assert_eq!(s.set_insert(table, row, labels, b.clone()).unwrap(), (0, true));
        assert_eq!(s.set_insert(table, row, labels, a.clone()).unwrap(), (0, true));
        assert_eq!(s.set_insert(table, row, labels, b.clone()).unwrap(), (1, false));
        assert_eq!(s.list_len(table, row, labels).unwrap(), 2);
        assert_eq!(s.set_find(table, row, labels, &b).unwrap(), Some(1));

        assert!(s.list_insert(table, row, labels, 0, a.clone()).is_err());
        assert!(s.set_insert(table, row, labels, EngineValue::Int(1)).is_err());
        assert_eq!(s.set_remove(table, row, labels, &a).unwrap(), Some(0));
        assert_eq!(s.set_remove(table, row, labels, &a).unwrap(), None);

        s.set_value(
            table,
            row,
            labels,
            EngineValue::List(vec![b.clone(), a.clone(), b.clone()]),
        )
        .unwrap();
        assert_eq!(
            s.get_value(table, row, labels).unwrap(),
            EngineValue::List(vec![a, b])
        );
    }

    #[test]
    fn dictionary_point_operations() {
        let (mut s, table, row, info) = collections();
        let scores = info.column("scores").unwrap();
        assert_eq!(
            s.dictionary_insert(table, row, scores, "ada".into(), EngineValue::Int(3))
                .unwrap(),
            None
        );
        assert_eq!(
            s.dictionary_insert(table, row, scores, "ada".into(), EngineValue::Int(4))
                .unwrap(),
            Some(EngineValue::Int(3))
        );
        s.dictionary_insert(table, row, scores, "bo".into(), EngineValue::Null)
            .unwrap();
        assert_eq!(s.dictionary_len(table, row, scores).unwrap(), 2);
        assert_eq!(s.dictionary_keys(table, row, scores).unwrap(), ["ada", "bo"]);
        assert_eq!(
            s.dictionary_get(table, row, scores, "ada").unwrap(),
            Some(EngineValue::Int(4))
        );
        assert!(s
            .dictionary_insert(table, row, scores, "x".into(), EngineValue::String("no".into()))
            .is_err());
        assert_eq!(
            s.dictionary_remove(table, row, scores, "bo").unwrap(),
            Some(EngineValue::Null)
        );
        s.dictionary_clear(table, row, scores).unwrap();
        assert_eq!(s.dictionary_len(table, row, scores).unwrap(), 0);
        assert!(s.list_len(table, row, scores).is_err());
    }

    #[test]
    fn mixed_column_accepts_any_scalar() {
        let (mut s, table, row, info) = collections();
        let any = info.column("any").unwrap();
        assert!(s.get_value(table, row, any).unwrap().is_null());
        for value in [
            EngineValue::Int(1),
            EngineValue::String("x".into()),
            EngineValue::Double(0.5),
            EngineValue::Null,
        ] {
            s.set_value(table, row, any, value.clone()).unwrap();
            assert_eq!(s.get_value(table, row, any).unwrap(), value);
        }
        assert!(s.set_value(table, row, any, EngineValue::List(Vec::new())).is_err());
        assert!(s.set_value(table, row, any, EngineValue::Link(row)).is_err());
    }

    #[test]
    fn embedded_collections_cascade() {
        let (mut s, table, row, info) = collections();
        let room = s.table_key("Room").unwrap();
        let rooms = info.column("rooms").unwrap();
        let parts = info.column("parts").unwrap();

        let kitchen = s.create_row(room, None).unwrap();
        let hall = s.create_row(room, None).unwrap();
        s.dictionary_insert(table, row, rooms, "k".into(), EngineValue::Link(kitchen))
            .unwrap();
        s.dictionary_insert(table, row, rooms, "k".into(), EngineValue::Link(hall))
            .unwrap();
        assert!(!s.row_exists(room, kitchen));

        let door = s.create_row(room, None).unwrap();
        s.list_insert(table, row, parts, 0, EngineValue::Link(door)).unwrap();
        s.delete_row(table, row).unwrap();
        assert!(!s.row_exists(room, hall));
        assert!(!s.row_exists(room, door));
    }
}
