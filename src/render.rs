//! Markdown narrative of a document
//!
//! Read-only: built from the same subgraph a shared document carries.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write;

use crate::bundle::TableData;
use crate::entity::{Document, Entity, Evidence, Reference, Statement};
use crate::executor;
use crate::storage::SqliteStore;
use crate::storage::rows::row_i64;
use crate::subgraph;
use crate::table::Table;
use crate::{Error, Result};

/// Render a document as Markdown: title, excerpt, then each statement in
/// document order followed by its evidence as cited block quotes.
pub fn document_markdown(store: &SqliteStore, document_id: i64) -> Result<String> {
    let data = executor::read_consistent(store.connection(), |conn| {
        subgraph::extract_document(conn, document_id)
    })?;
    render(&data, document_id)
}

fn render(data: &TableData, document_id: i64) -> Result<String> {
    let document: Document = entities::<Document>(data)?
        .remove(&document_id)
        .ok_or_else(|| Error::NotFound(format!("{} #{}", Table::Documents, document_id)))?;
    let statements = entities::<Statement>(data)?;
    let evidence = entities::<Evidence>(data)?;
    let references = entities::<Reference>(data)?;

    let mut evidence_by_statement: HashMap<i64, BTreeSet<i64>> = HashMap::new();
    for link in rows(data, Table::EvidenceStatement) {
        if let (Some(s), Some(e)) = (row_i64(link, "statement_id"), row_i64(link, "evidence_id")) {
            evidence_by_statement.entry(s).or_default().insert(e);
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "# {}", document.title.trim());
    if let Some(excerpt) = document.excerpt.as_deref().filter(|e| !e.trim().is_empty()) {
        let _ = writeln!(out, "\n_{}_", excerpt.trim());
    }

    // document_statement rows arrive in `order` order
    for link in rows(data, Table::DocumentStatement) {
        let Some(statement) = row_i64(link, "statement_id").and_then(|id| statements.get(&id)) else {
            continue;
        };
        let _ = writeln!(out, "\n## {}", statement.content.trim());

        for evidence_id in evidence_by_statement.get(&statement.id).into_iter().flatten() {
            let Some(item) = evidence.get(evidence_id) else {
                continue;
            };
            out.push('\n');
            for line in item.content.trim().lines() {
                let _ = writeln!(out, "> {}", line);
            }
            if let Some(citation) = cite(item, &references) {
                let _ = writeln!(out, ">\n> ({})", citation);
            }
        }
    }

    Ok(out)
}

/// `author (year), title, p. N`, or whatever part of it is known
fn cite(evidence: &Evidence, references: &BTreeMap<i64, Reference>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(reference) = evidence.reference_id.and_then(|id| references.get(&id)) {
        parts.push(reference.citation());
    }
    if let Some(page) = evidence.page_number.as_deref().filter(|p| !p.trim().is_empty()) {
        parts.push(format!("p. {}", page.trim()));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn rows(data: &TableData, table: Table) -> &[crate::bundle::Row] {
    data.get(&table).map(Vec::as_slice).unwrap_or(&[])
}

fn entities<E: Entity>(data: &TableData) -> Result<BTreeMap<i64, E>> {
    rows(data, E::TABLE)
        .iter()
        .map(|row| E::from_row(row.clone()).map(|e| (e.id(), e)))
        .collect()
}
