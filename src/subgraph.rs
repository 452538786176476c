//! Subgraph Extractor
//!
//! Collects the closed set of rows that makes one document self-contained:
//! the document, its statements, the evidence linked to those statements,
//! the references and tags of that evidence, and the relationship rows met
//! along the way.

use std::collections::{BTreeSet, HashMap, HashSet};

use rusqlite::Connection;

use crate::bundle::{Row, TableData};
use crate::storage::rows::{self, row_i64};
use crate::table::Table;
use crate::{Error, Result};

/// Extract the subgraph rooted at `document_id`.
///
/// Every table key is present in the result, possibly with no rows.
/// Relationship rows are the ones fetched while walking, not re-derived.
pub fn extract_document(conn: &Connection, document_id: i64) -> Result<TableData> {
    let document = rows::read_row(conn, Table::Documents, document_id)?
        .ok_or_else(|| Error::NotFound(format!("{} #{}", Table::Documents, document_id)))?;

    let mut document_links =
        rows::read_rows_where_in(conn, Table::DocumentStatement, "document_id", &[document_id])?;
    document_links.sort_by_key(|row| row_i64(row, "order").unwrap_or(i64::MAX));
    let statement_ids = collect_ids(&document_links, "statement_id");

    let evidence_links =
        rows::read_rows_where_in(conn, Table::EvidenceStatement, "statement_id", &statement_ids)?;
    let evidence_ids = collect_ids(&evidence_links, "evidence_id");

    let evidence = rows::read_rows_where_in(conn, Table::Evidence, "id", &evidence_ids)?;
    let reference_ids = collect_ids(&evidence, "reference_id");

    let tag_links = rows::read_rows_where_in(conn, Table::EvidenceTag, "evidence_id", &evidence_ids)?;
    let tag_ids = collect_ids(&tag_links, "tag_id");

    let mut data = TableData::new();
    data.insert(Table::References, rows::read_rows_where_in(conn, Table::References, "id", &reference_ids)?);
    data.insert(Table::Evidence, evidence);
    data.insert(Table::Statements, rows::read_rows_where_in(conn, Table::Statements, "id", &statement_ids)?);
    data.insert(Table::Documents, vec![document]);
    data.insert(Table::Tags, rows::read_rows_where_in(conn, Table::Tags, "id", &tag_ids)?);
    data.insert(Table::EvidenceStatement, evidence_links);
    data.insert(Table::DocumentStatement, document_links);
    data.insert(Table::EvidenceTag, tag_links);

    tracing::debug!(
        "Extracted document #{}: {} statements, {} evidence, {} references, {} tags",
        document_id,
        statement_ids.len(),
        evidence_ids.len(),
        reference_ids.len(),
        tag_ids.len()
    );

    Ok(data)
}

/// Distinct non-null integer values of `column`, ascending
fn collect_ids(rows: &[Row], column: &str) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row_i64(row, column))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Foreign keys in `data` whose target row is not in `data`.
///
/// Returns one `table.column=id` entry per dangling value; empty when the
/// row set is closed.
pub fn dangling_references(data: &TableData) -> Vec<String> {
    let present: HashMap<Table, HashSet<i64>> = data
        .iter()
        .map(|(table, rows)| (*table, rows.iter().filter_map(rows::row_id).collect()))
        .collect();

    let mut dangling = Vec::new();
    for (table, rows) in data {
        for row in rows {
            for fk in table.foreign_keys() {
                let Some(id) = row_i64(row, fk.column) else {
                    continue;
                };
                let found = present.get(&fk.target).is_some_and(|ids| ids.contains(&id));
                if !found {
                    dangling.push(format!("{}.{}={}", table, fk.column, id));
                }
            }
        }
    }
    dangling
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Document, Evidence, Reference, Statement};
    use crate::storage::SqliteStore;
    use crate::storage::rows::row_id;

    fn ids(data: &TableData, table: Table) -> Vec<i64> {
        data[&table].iter().filter_map(row_id).collect()
    }

    #[test]
    fn test_missing_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            extract_document(store.connection(), 7),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_document_without_statements() {
        let store = SqliteStore::open_in_memory().unwrap();
        let doc = store.insert(&Document::new("Empty")).unwrap();
        let data = extract_document(store.connection(), doc.id).unwrap();

        assert_eq!(data.len(), Table::all().len());
        assert_eq!(ids(&data, Table::Documents), vec![doc.id]);
        assert!(data[&Table::Statements].is_empty());
        assert!(dangling_references(&data).is_empty());
    }

    #[test]
    fn test_closure_excludes_unrelated_rows() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let r1 = store.insert(&Reference::new("R1")).unwrap();
        let r2 = store.insert(&Reference::new("R2")).unwrap();
        let e1 = store.insert(&Evidence::new("E1", Some(r1.id))).unwrap();
        let e2 = store.insert(&Evidence::new("E2", None)).unwrap();
        let e3 = store.insert(&Evidence::new("E3", Some(r2.id))).unwrap();
        let s1 = store.insert(&Statement::new("S1")).unwrap();
        let s2 = store.insert(&Statement::new("S2")).unwrap();
        let s3 = store.insert(&Statement::new("S3")).unwrap();
        let doc = store.insert(&Document::new("D1")).unwrap();
        let other = store.insert(&Document::new("D2")).unwrap();

        store.set_document_statements(doc.id, &[s2.id, s1.id]).unwrap();
        store.set_document_statements(other.id, &[s3.id]).unwrap();
        store.link_evidence_to_statement(s1.id, &[e1.id, e2.id]).unwrap();
        store.link_evidence_to_statement(s2.id, &[e1.id]).unwrap();
        store.link_evidence_to_statement(s3.id, &[e3.id]).unwrap();
        store.set_evidence_tags(e1.id, &["a"]).unwrap();
        store.set_evidence_tags(e3.id, &["b"]).unwrap();

        let data = extract_document(store.connection(), doc.id).unwrap();
        assert_eq!(ids(&data, Table::Statements), vec![s1.id, s2.id]);
        assert_eq!(ids(&data, Table::Evidence), vec![e1.id, e2.id]);
        assert_eq!(ids(&data, Table::References), vec![r1.id]);
        assert_eq!(data[&Table::Tags].len(), 1);
        assert_eq!(data[&Table::Tags][0]["name"], "a");
        assert_eq!(data[&Table::EvidenceStatement].len(), 3);
        assert_eq!(data[&Table::EvidenceTag].len(), 1);

        let order: Vec<i64> = data[&Table::DocumentStatement]
            .iter()
            .filter_map(|row| row_i64(row, "statement_id"))
            .collect();
        assert_eq!(order, vec![s2.id, s1.id]);

        assert!(dangling_references(&data).is_empty());
    }

    #[test]
    fn test_dangling_detected() {
        let mut data = TableData::new();
        let link = serde_json::json!({"id": 1, "evidence_id": 3, "statement_id": 4});
        data.insert(Table::EvidenceStatement, vec![link.as_object().unwrap().clone()]);
        let dangling = dangling_references(&data);
        assert_eq!(dangling.len(), 2);
        assert!(dangling.contains(&"evidence_statement.evidence_id=3".to_string()));
    }
}
