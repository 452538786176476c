//! Identity Remapper
//!
//! Imports rows carrying foreign identities. Each entity gets a fresh local
//! identity and every foreign-key field is rewritten through the
//! `old id → new id` map of its target table:
//! - relationship rows with any unresolvable field are dropped
//! - entity rows with an unresolvable nullable field keep the entity and
//!   clear the field
//!
//! Foreign-key fields are recognised only through
//! [`crate::table::FOREIGN_KEY_FIELDS`].

use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::bundle::{Row, TableData};
use crate::order;
use crate::storage::rows;
use crate::table::{Table, foreign_key_target};
use crate::Result;

/// Counts produced by an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapReport {
    /// Rows inserted per table
    pub inserted: BTreeMap<Table, usize>,
    /// Relationship rows dropped because an endpoint did not resolve
    pub dropped: BTreeMap<Table, usize>,
    /// Entity rows whose nullable foreign key was cleared
    pub detached: BTreeMap<Table, usize>,
}

impl RemapReport {
    pub fn inserted(&self, table: Table) -> usize {
        self.inserted.get(&table).copied().unwrap_or(0)
    }

    pub fn dropped(&self, table: Table) -> usize {
        self.dropped.get(&table).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Per-table identity maps for one import
#[derive(Debug, Default)]
pub struct IdentityRemapper {
    maps: HashMap<Table, HashMap<i64, i64>>,
    report: RemapReport,
}

impl IdentityRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a bundle's rows: entity tables parent-first, then relationship
    /// tables.
    pub fn import(mut self, conn: &Connection, data: &TableData) -> Result<RemapReport> {
        for table in order::insert_order(Table::primary())? {
            let rows = data.get(&table).map(Vec::as_slice).unwrap_or(&[]);
            self.insert_entities(conn, table, rows)?;
        }
        for table in order::insert_order(Table::relationships())? {
            let rows = data.get(&table).map(Vec::as_slice).unwrap_or(&[]);
            self.insert_relationships(conn, table, rows)?;
        }
        Ok(self.finish())
    }

    /// Insert entity rows under fresh identities, recording the mapping
    pub fn insert_entities(&mut self, conn: &Connection, table: Table, rows: &[Row]) -> Result<usize> {
        let mut inserted = 0;
        for row in rows {
            let old_id = rows::row_id(row);
            let mut row = rows::strip_identity(table, row);

            let unresolved = self.rewrite(table, &mut row);
            if !unresolved.is_empty() {
                let all_nullable = unresolved
                    .iter()
                    .all(|column| table.foreign_key(column).is_some_and(|fk| fk.nullable));
                if !all_nullable {
                    *self.report.dropped.entry(table).or_default() += 1;
                    continue;
                }
                for column in unresolved {
                    row.insert(column, Value::Null);
                }
                *self.report.detached.entry(table).or_default() += 1;
            }

            let new_id = rows::insert_row(conn, table, &row)?;
            if let Some(old_id) = old_id {
                self.maps.entry(table).or_default().insert(old_id, new_id);
            }
            inserted += 1;
        }

        *self.report.inserted.entry(table).or_default() += inserted;
        tracing::debug!("Imported {} {} rows", inserted, table);
        Ok(inserted)
    }

    /// Insert relationship rows whose endpoints all resolve; drop the rest
    pub fn insert_relationships(&mut self, conn: &Connection, table: Table, rows: &[Row]) -> Result<usize> {
        let mut resolved = Vec::with_capacity(rows.len());
        let mut dropped = 0;
        for row in rows {
            let mut row = rows::strip_identity(table, row);
            if self.rewrite(table, &mut row).is_empty() {
                resolved.push(row);
            } else {
                dropped += 1;
            }
        }

        if table == Table::DocumentStatement {
            renumber_document_order(&mut resolved);
        }
        for row in &resolved {
            rows::insert_row(conn, table, row)?;
        }
        let inserted = resolved.len();

        *self.report.inserted.entry(table).or_default() += inserted;
        if dropped > 0 {
            *self.report.dropped.entry(table).or_default() += dropped;
            tracing::warn!("Dropped {} {} rows with unresolved endpoints", dropped, table);
        }
        Ok(inserted)
    }

    /// Local identity assigned to `old_id` of `table` during this import
    pub fn resolve(&self, table: Table, old_id: i64) -> Option<i64> {
        self.maps.get(&table).and_then(|map| map.get(&old_id)).copied()
    }

    pub fn finish(self) -> RemapReport {
        self.report
    }

    /// Rewrite every foreign-key field of `row` in place and return the
    /// fields that did not resolve. A missing or null field counts as
    /// unresolved unless the schema declares it nullable.
    fn rewrite(&self, table: Table, row: &mut Row) -> Vec<String> {
        let mut unresolved: Vec<String> = table
            .foreign_keys()
            .iter()
            .filter(|fk| !fk.nullable && !row.contains_key(fk.column))
            .map(|fk| fk.column.to_string())
            .collect();

        for (column, value) in row.iter_mut() {
            let Some(target) = foreign_key_target(column) else {
                continue;
            };
            if value.is_null() {
                if !table.foreign_key(column).is_some_and(|fk| fk.nullable) {
                    unresolved.push(column.clone());
                }
                continue;
            }
            match value.as_i64().and_then(|old| self.resolve(target, old)) {
                Some(new_id) => *value = Value::from(new_id),
                None => unresolved.push(column.clone()),
            }
        }
        unresolved
    }
}

/// Rewrite `order` as 0, 1, 2, ... per document, keeping the incoming
/// relative order. Rows without an integer order go last, in input order.
fn renumber_document_order(links: &mut [Row]) {
    links.sort_by_key(|row| {
        (
            rows::row_i64(row, "document_id"),
            rows::row_i64(row, "order").unwrap_or(i64::MAX),
        )
    });

    let mut next: HashMap<Option<i64>, i64> = HashMap::new();
    for row in links.iter_mut() {
        let slot = next.entry(rows::row_i64(row, "document_id")).or_default();
        row.insert("order".to_string(), Value::from(*slot));
        *slot += 1;
    }
}
