//! SQLite storage implementation

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, params};
use serde::Serialize;

use super::rows;
use super::schema;
use crate::entity::{Entity, Evidence, Reference, Statement, Tag};
use crate::table::{self, Table};
use crate::{Error, Result};

/// SQLite-backed store for the knowledge base.
///
/// Foreign-key enforcement is on for the lifetime of the handle; only the
/// destructive restore path switches it off, through a scoped guard.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema and check it against the entity schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        table::validate_foreign_key_fields()?;
        self.verify_live_schema()
    }

    /// Compare columns and foreign keys of the database with [`Table`]
    fn verify_live_schema(&self) -> Result<()> {
        for table in Table::all() {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info({})", table.sql_name()))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if columns != table.columns() {
                return Err(Error::Schema(format!(
                    "{} has columns [{}], expected [{}]",
                    table,
                    columns.join(", "),
                    table.columns().join(", ")
                )));
            }

            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA foreign_key_list({})", table.sql_name()))?;
            let live: HashSet<(String, String)> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(3)?, row.get::<_, String>(2)?)))?
                .collect::<rusqlite::Result<_>>()?;
            let declared: HashSet<(String, String)> = table
                .foreign_keys()
                .iter()
                .map(|fk| (fk.column.to_string(), fk.target.as_str().to_string()))
                .collect();
            if live != declared {
                return Err(Error::Schema(format!(
                    "{} foreign keys differ from the entity schema",
                    table
                )));
            }
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        let on: i64 = self
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        Ok(on == 1)
    }

    // ========== Entity Operations ==========

    /// Insert an entity under a fresh identity and return it as stored
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<E> {
        let row = rows::strip_identity(E::TABLE, &entity.to_row()?);
        let id = rows::insert_row(&self.conn, E::TABLE, &row)?;
        tracing::debug!("Inserted {} #{}", E::TABLE, id);
        self.require(id)
    }

    pub fn get<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        rows::read_row(&self.conn, E::TABLE, id)?
            .map(E::from_row)
            .transpose()
    }

    /// Like [`get`](Self::get) but absent rows are `NotFound`
    pub fn require<E: Entity>(&self, id: i64) -> Result<E> {
        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("{} #{}", E::TABLE, id)))
    }

    pub fn list<E: Entity>(&self) -> Result<Vec<E>> {
        rows::read_rows(&self.conn, E::TABLE)?
            .into_iter()
            .map(E::from_row)
            .collect()
    }

    /// Overwrite an entity's attributes, keyed by its identity
    pub fn update<E: Entity>(&self, entity: &E) -> Result<()> {
        let changed = rows::update_row(&self.conn, E::TABLE, entity.id(), &entity.to_row()?)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("{} #{}", E::TABLE, entity.id())));
        }
        Ok(())
    }

    /// Delete an entity; relationship rows go with it by cascade
    pub fn delete<E: Entity>(&self, id: i64) -> Result<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", E::TABLE.sql_name()),
            [id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("{} #{}", E::TABLE, id)));
        }
        Ok(())
    }

    /// A reference and the evidence taken from it
    pub fn get_reference_details(&self, id: i64) -> Result<(Reference, Vec<Evidence>)> {
        let reference: Reference = self.require(id)?;
        let evidence = rows::read_rows_where_in(&self.conn, Table::Evidence, "reference_id", &[id])?
            .into_iter()
            .map(Evidence::from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((reference, evidence))
    }

    /// A statement and the evidence linked to it
    pub fn get_statement_details(&self, id: i64) -> Result<(Statement, Vec<Evidence>)> {
        let statement: Statement = self.require(id)?;
        let evidence = self.statement_evidence(id)?;
        Ok((statement, evidence))
    }

    // ========== Relationship Operations ==========

    /// Replace the evidence linked to a statement
    pub fn link_evidence_to_statement(&mut self, statement_id: i64, evidence_ids: &[i64]) -> Result<()> {
        self.require::<Statement>(statement_id)?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM \"evidence_statement\" WHERE statement_id = ?1", [statement_id])?;
        let mut seen = HashSet::new();
        for evidence_id in evidence_ids {
            if seen.insert(*evidence_id) {
                tx.execute(
                    "INSERT INTO \"evidence_statement\" (evidence_id, statement_id) VALUES (?1, ?2)",
                    params![evidence_id, statement_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove one evidence link from a statement
    pub fn unlink_evidence_from_statement(&self, statement_id: i64, evidence_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM \"evidence_statement\" WHERE statement_id = ?1 AND evidence_id = ?2",
            params![statement_id, evidence_id],
        )?;
        Ok(())
    }

    /// Replace a document's statements; `order` is rewritten as 0, 1, 2, ...
    pub fn set_document_statements(&mut self, document_id: i64, statement_ids: &[i64]) -> Result<()> {
        self.require::<crate::entity::Document>(document_id)?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM \"document_statement\" WHERE document_id = ?1", [document_id])?;
        for (order, statement_id) in statement_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO \"document_statement\" (document_id, statement_id, \"order\") VALUES (?1, ?2, ?3)",
                params![document_id, statement_id, order as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace the tags on a piece of evidence by name.
    ///
    /// Existing tags are reused by name; unknown names create new tags.
    pub fn set_evidence_tags(&mut self, evidence_id: i64, names: &[&str]) -> Result<Vec<Tag>> {
        self.require::<Evidence>(evidence_id)?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM \"evidence_tag\" WHERE evidence_id = ?1", [evidence_id])?;

        let mut seen = HashSet::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !seen.insert(name) {
                continue;
            }
            tx.execute("INSERT OR IGNORE INTO \"tags\" (name) VALUES (?1)", [name])?;
            let tag_id: i64 = tx.query_row("SELECT id FROM \"tags\" WHERE name = ?1", [name], |row| row.get(0))?;
            tx.execute(
                "INSERT INTO \"evidence_tag\" (evidence_id, tag_id) VALUES (?1, ?2)",
                params![evidence_id, tag_id],
            )?;
        }
        tx.commit()?;
        self.evidence_tags(evidence_id)
    }

    /// Statements of a document in document order
    pub fn document_statements(&self, document_id: i64) -> Result<Vec<Statement>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id FROM \"statements\" s \
             JOIN \"document_statement\" ds ON ds.statement_id = s.id \
             WHERE ds.document_id = ?1 ORDER BY ds.\"order\"",
        )?;
        let ids = stmt
            .query_map([document_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.into_iter().map(|id| self.require(id)).collect()
    }

    /// Evidence linked to a statement, in identity order
    pub fn statement_evidence(&self, statement_id: i64) -> Result<Vec<Evidence>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT evidence_id FROM \"evidence_statement\" \
             WHERE statement_id = ?1 ORDER BY evidence_id",
        )?;
        let ids = stmt
            .query_map([statement_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.into_iter().map(|id| self.require(id)).collect()
    }

    pub fn evidence_tags(&self, evidence_id: i64) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            "SELECT tag_id FROM \"evidence_tag\" WHERE evidence_id = ?1 ORDER BY tag_id",
        )?;
        let ids = stmt
            .query_map([evidence_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.into_iter().map(|id| self.require(id)).collect()
    }

    // ========== Statistics ==========

    /// Row counts for every table
    pub fn stats(&self) -> Result<DbStats> {
        let mut counts = BTreeMap::new();
        for table in Table::all() {
            counts.insert(*table, rows::count_rows(&self.conn, *table)?);
        }
        Ok(DbStats { counts })
    }

    /// Count rows whose foreign keys point at missing entities
    pub fn integrity_report(&self) -> Result<IntegrityReport> {
        integrity_report(&self.conn)
    }
}

/// Dangling foreign keys per table; see [`SqliteStore::integrity_report`]
pub(crate) fn integrity_report(conn: &Connection) -> Result<IntegrityReport> {
    let mut dangling = BTreeMap::new();
    for table in Table::all() {
        let mut total = 0usize;
        for fk in table.foreign_keys() {
            let sql = format!(
                "SELECT COUNT(*) FROM {child} c LEFT JOIN {parent} p ON p.id = c.{column} \
                 WHERE c.{column} IS NOT NULL AND p.id IS NULL",
                child = table.sql_name(),
                parent = fk.target.sql_name(),
                column = rows::quote_ident(fk.column),
            );
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            total += count as usize;
        }
        if total > 0 {
            dangling.insert(*table, total);
        }
    }
    Ok(IntegrityReport { dangling })
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub counts: BTreeMap<Table, usize>,
}

impl DbStats {
    pub fn count(&self, table: Table) -> usize {
        self.counts.get(&table).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, count) in &self.counts {
            writeln!(f, "  {}: {}", table, count)?;
        }
        Ok(())
    }
}

/// Rows with dangling foreign keys, by table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub dangling: BTreeMap<Table, usize>,
}

impl IntegrityReport {
    pub fn has_issues(&self) -> bool {
        !self.dangling.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Document;

    fn sample_reference(store: &SqliteStore) -> Reference {
        let mut reference = Reference::new("The Structure of Scientific Revolutions");
        reference.author = Some("Kuhn".into());
        reference.year = Some(1962);
        store.insert(&reference).unwrap()
    }

    #[test]
    fn test_schema_checks_pass_on_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.foreign_keys_enabled().unwrap());
        assert!(!store.integrity_report().unwrap().has_issues());
    }

    #[test]
    fn test_reopen_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proof.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            sample_reference(&store);
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.stats().unwrap().count(Table::References), 1);
    }

    #[test]
    fn test_reference_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut reference = sample_reference(&store);
        assert!(reference.id > 0);
        assert!(reference.created_at.is_some());

        reference.title = "Structure".into();
        store.update(&reference).unwrap();
        let fetched: Reference = store.require(reference.id).unwrap();
        assert_eq!(fetched.title, "Structure");
        assert_eq!(fetched.year, Some(1962));

        store.delete::<Reference>(reference.id).unwrap();
        assert!(store.get::<Reference>(reference.id).unwrap().is_none());
        assert!(matches!(store.delete::<Reference>(reference.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reference_details_and_cascade() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let reference = sample_reference(&store);
        let evidence = store.insert(&Evidence::new("paradigm shift", Some(reference.id))).unwrap();
        let statement = store.insert(&Statement::new("science is not cumulative")).unwrap();
        store.link_evidence_to_statement(statement.id, &[evidence.id]).unwrap();

        let (_, linked) = store.get_reference_details(reference.id).unwrap();
        assert_eq!(linked.len(), 1);

        store.delete::<Reference>(reference.id).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.count(Table::Evidence), 0);
        assert_eq!(stats.count(Table::EvidenceStatement), 0);
        assert_eq!(stats.count(Table::Statements), 1);
    }

    #[test]
    fn test_link_evidence_replaces() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let statement = store.insert(&Statement::new("claim")).unwrap();
        let e1 = store.insert(&Evidence::new("one", None)).unwrap();
        let e2 = store.insert(&Evidence::new("two", None)).unwrap();

        store.link_evidence_to_statement(statement.id, &[e1.id, e2.id, e1.id]).unwrap();
        assert_eq!(store.statement_evidence(statement.id).unwrap().len(), 2);

        store.link_evidence_to_statement(statement.id, &[e2.id]).unwrap();
        let (_, evidence) = store.get_statement_details(statement.id).unwrap();
        assert_eq!(evidence, vec![e2.clone()]);

        store.unlink_evidence_from_statement(statement.id, e2.id).unwrap();
        assert!(store.statement_evidence(statement.id).unwrap().is_empty());
    }

    #[test]
    fn test_document_order_contiguous() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let doc = store.insert(&Document::new("Essay")).unwrap();
        let s: Vec<Statement> = (0..3)
            .map(|i| store.insert(&Statement::new(format!("s{}", i))).unwrap())
            .collect();

        store.set_document_statements(doc.id, &[s[2].id, s[0].id, s[1].id]).unwrap();
        store.set_document_statements(doc.id, &[s[1].id, s[2].id]).unwrap();

        let ordered = store.document_statements(doc.id).unwrap();
        assert_eq!(ordered, vec![s[1].clone(), s[2].clone()]);

        let orders: Vec<i64> = store
            .connection()
            .prepare("SELECT \"order\" FROM \"document_statement\" WHERE document_id = ?1 ORDER BY \"order\"")
            .unwrap()
            .query_map([doc.id], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[test]
    fn test_tags_merge_by_name() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let e1 = store.insert(&Evidence::new("one", None)).unwrap();
        let e2 = store.insert(&Evidence::new("two", None)).unwrap();

        let first = store.set_evidence_tags(e1.id, &["ethics", "method", "ethics"]).unwrap();
        assert_eq!(first.len(), 2);
        let second = store.set_evidence_tags(e2.id, &[" ethics ", ""]).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(store.stats().unwrap().count(Table::Tags), 2);
    }

    #[test]
    fn test_link_to_missing_entity_fails() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let statement = store.insert(&Statement::new("claim")).unwrap();
        assert!(matches!(
            store.link_evidence_to_statement(statement.id, &[99]),
            Err(Error::Store(_))
        ));
        assert!(matches!(
            store.set_document_statements(5, &[statement.id]),
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.stats().unwrap().count(Table::EvidenceStatement), 0);
    }
}
