//! Transactional Executor
//!
//! Every bulk write runs inside one transaction and either commits whole or
//! leaves the store untouched. Foreign-key enforcement is relaxed only for
//! the destructive restore, through [`ForeignKeysRelaxed`].

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::bundle::TableData;
use crate::order;
use crate::remap::{IdentityRemapper, RemapReport};
use crate::storage::rows;
use crate::table::Table;
use crate::{Error, Result};

/// Switches `PRAGMA foreign_keys` off for its lifetime.
///
/// The pragma is a no-op inside an open transaction, so the guard must be
/// created before the transaction begins and outlive it.
pub struct ForeignKeysRelaxed<'a> {
    conn: &'a Connection,
}

impl<'a> ForeignKeysRelaxed<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        tracing::debug!("Foreign-key enforcement suspended");
        Ok(Self { conn })
    }
}

impl Drop for ForeignKeysRelaxed<'_> {
    fn drop(&mut self) {
        match self.conn.pragma_update(None, "foreign_keys", "ON") {
            Ok(()) => tracing::debug!("Foreign-key enforcement restored"),
            Err(e) => tracing::error!("Failed to restore foreign-key enforcement: {}", e),
        }
    }
}

/// Run `read` inside one transaction so every table is seen at the same
/// point in time.
pub fn read_consistent<T>(conn: &Connection, read: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let tx = conn.unchecked_transaction()?;
    let value = read(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Replace the whole store with `data`, keeping every row's identity.
///
/// Tables are wiped children first and refilled parents first, with
/// foreign-key enforcement off; the result is checked with
/// `PRAGMA foreign_key_check` before commit. Returns rows written per table.
pub fn restore(conn: &Connection, data: &TableData) -> Result<BTreeMap<Table, usize>> {
    let delete_order = order::delete_order(Table::all())?;
    let insert_order = order::insert_order(Table::all())?;

    let _relaxed = ForeignKeysRelaxed::new(conn)?;
    let tx = conn.unchecked_transaction()?;

    for table in &delete_order {
        let removed = rows::delete_all(&tx, *table)?;
        tracing::debug!("Cleared {} rows from {}", removed, table);
    }
    reset_sequences(&tx, Table::all())?;

    let mut written = BTreeMap::new();
    for table in insert_order {
        let table_rows = data.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        for row in table_rows {
            rows::insert_row(&tx, table, row)?;
        }
        tracing::debug!("Restored {} rows into {}", table_rows.len(), table);
        written.insert(table, table_rows.len());
    }

    let violations = foreign_key_violations(&tx)?;
    if !violations.is_empty() {
        return Err(Error::Constraint(format!(
            "restored rows reference missing entities: {}",
            violations.join(", ")
        )));
    }

    tx.commit()?;
    Ok(written)
}

/// Insert the rows of the given primary tables under fresh identities.
///
/// Relationship tables are never written. `evidence.reference_id` follows
/// the references inserted by the same call and is cleared otherwise.
pub fn merge(conn: &Connection, data: &TableData, tables: &[Table]) -> Result<RemapReport> {
    let primary: Vec<Table> = tables.iter().copied().filter(|t| !t.is_relationship()).collect();
    let tx = conn.unchecked_transaction()?;

    let mut remapper = IdentityRemapper::new();
    for table in order::insert_order(&primary)? {
        let table_rows = data.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        remapper.insert_entities(&tx, table, table_rows)?;
    }

    tx.commit()?;
    Ok(remapper.finish())
}

/// Import a bundle subgraph under fresh identities in one transaction
pub fn import_remapped(conn: &Connection, data: &TableData) -> Result<RemapReport> {
    let tx = conn.unchecked_transaction()?;
    let report = IdentityRemapper::new().import(&tx, data)?;
    tx.commit()?;
    Ok(report)
}

fn reset_sequences(conn: &Connection, tables: &[Table]) -> Result<()> {
    let names = tables
        .iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute(&format!("DELETE FROM sqlite_sequence WHERE name IN ({})", names), [])?;
    Ok(())
}

/// `table#rowid -> parent` for every row failing its foreign key
fn foreign_key_violations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let violations = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(format!("{}#{} -> {}", table, rowid.unwrap_or_default(), parent))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Row;
    use crate::entity::{Evidence, Reference, Statement};
    use crate::storage::SqliteStore;
    use serde_json::{Value, json};

    fn rows_of(values: Vec<Value>) -> Vec<Row> {
        values.into_iter().map(|v| v.as_object().unwrap().clone()).collect()
    }

    fn empty_tables() -> TableData {
        Table::all().iter().map(|t| (*t, Vec::new())).collect()
    }

    #[test]
    fn test_guard_restores_enforcement() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let _relaxed = ForeignKeysRelaxed::new(store.connection()).unwrap();
            assert!(!store.foreign_keys_enabled().unwrap());
        }
        assert!(store.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_restore_keeps_identities_and_resets_counters() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert(&Statement::new(format!("old {}", i))).unwrap();
        }

        let mut data = empty_tables();
        data.insert(Table::References, rows_of(vec![json!({"id": 10, "title": "R"})]));
        data.insert(
            Table::Evidence,
            rows_of(vec![json!({"id": 20, "content": "E", "reference_id": 10})]),
        );
        data.insert(Table::Statements, rows_of(vec![json!({"id": 2, "content": "S"})]));
        data.insert(
            Table::EvidenceStatement,
            rows_of(vec![json!({"id": 1, "evidence_id": 20, "statement_id": 2})]),
        );

        let written = restore(store.connection(), &data).unwrap();
        assert_eq!(written[&Table::Evidence], 1);
        assert!(store.foreign_keys_enabled().unwrap());

        let statements: Vec<Statement> = store.list().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].id, 2);
        let evidence: Evidence = store.require(20).unwrap();
        assert_eq!(evidence.reference_id, Some(10));

        let next = store.insert(&Statement::new("after")).unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn test_restore_rejects_dangling_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&Reference::new("survivor")).unwrap();

        let mut data = empty_tables();
        data.insert(
            Table::EvidenceStatement,
            rows_of(vec![json!({"id": 1, "evidence_id": 4, "statement_id": 5})]),
        );

        let result = restore(store.connection(), &data);
        assert!(matches!(result, Err(Error::Constraint(_))));
        assert!(store.foreign_keys_enabled().unwrap());
        assert_eq!(store.stats().unwrap().count(Table::References), 1);
    }

    #[test]
    fn test_restore_failure_after_wipe_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&Reference::new("kept")).unwrap();
        store.insert(&Statement::new("kept too")).unwrap();

        let mut data = empty_tables();
        data.insert(Table::References, rows_of(vec![json!({"id": 1, "title": "new"})]));
        data.insert(Table::Statements, rows_of(vec![json!({"id": 1, "content": null})]));

        assert!(matches!(restore(store.connection(), &data), Err(Error::Store(_))));
        let reference: Reference = store.require(1).unwrap();
        assert_eq!(reference.title, "kept");
        assert_eq!(store.stats().unwrap().count(Table::Statements), 1);
        assert!(store.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_merge_ignores_relationship_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&Reference::new("local")).unwrap();

        let mut data = empty_tables();
        data.insert(Table::References, rows_of(vec![json!({"id": 1, "title": "incoming"})]));
        data.insert(
            Table::Evidence,
            rows_of(vec![
                json!({"id": 1, "content": "a", "reference_id": 1}),
                json!({"id": 2, "content": "b", "reference_id": 8}),
            ]),
        );
        data.insert(Table::Statements, rows_of(vec![json!({"id": 1, "content": "s"})]));
        data.insert(
            Table::EvidenceStatement,
            rows_of(vec![json!({"id": 1, "evidence_id": 1, "statement_id": 1})]),
        );

        let report = merge(store.connection(), &data, Table::all()).unwrap();
        assert_eq!(report.inserted(Table::References), 1);
        assert_eq!(report.inserted(Table::Evidence), 2);
        assert_eq!(report.inserted(Table::EvidenceStatement), 0);

        let evidence: Vec<Evidence> = store.list().unwrap();
        assert_eq!(evidence[0].reference_id, Some(2));
        assert_eq!(evidence[1].reference_id, None);
        assert_eq!(store.stats().unwrap().count(Table::EvidenceStatement), 0);
    }

    #[test]
    fn test_merge_tag_collision_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.connection().execute("INSERT INTO \"tags\" (name) VALUES ('ethics')", []).unwrap();

        let mut data = empty_tables();
        data.insert(Table::References, rows_of(vec![json!({"id": 1, "title": "R"})]));
        data.insert(Table::Tags, rows_of(vec![json!({"id": 1, "name": "ethics"})]));

        assert!(matches!(merge(store.connection(), &data, Table::all()), Err(Error::Store(_))));
        assert_eq!(store.stats().unwrap().count(Table::References), 0);
    }
}
