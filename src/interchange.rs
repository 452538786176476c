//! Interchange Operations
//!
//! Public entry points for moving the knowledge base in and out of
//! bundles:
//! - full backup export, destructive restore and additive merge
//! - shareable single-document export and remapped import
//!
//! File variants gather inside the transaction and write only after it
//! has committed; readers parse the whole file before one is opened.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bundle::{Bundle, TableData};
use crate::executor;
use crate::remap::RemapReport;
use crate::storage::{SqliteStore, rows};
use crate::subgraph;
use crate::table::Table;
use crate::{Error, Result};

/// Tables a merge writes to
pub const MERGE_TABLES: &[Table] = &[
    Table::References,
    Table::Statements,
    Table::Evidence,
    Table::Documents,
    Table::Tags,
];

/// Result of writing a bundle to disk
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub counts: BTreeMap<Table, usize>,
    #[serde(rename = "exportDate")]
    pub export_date: Option<String>,
}

/// Interchange operations over one store handle
pub struct Interchange<'a> {
    store: &'a mut SqliteStore,
}

impl<'a> Interchange<'a> {
    pub fn new(store: &'a mut SqliteStore) -> Self {
        Self { store }
    }

    // ========== Full Backup ==========

    /// Snapshot every table in full
    pub fn export_backup(&self) -> Result<Bundle> {
        let data = executor::read_consistent(self.store.connection(), |conn| {
            Table::all()
                .iter()
                .map(|table| Ok((*table, rows::read_rows(conn, *table)?)))
                .collect::<Result<TableData>>()
        })?;

        let bundle = Bundle::full_backup(data)?;
        tracing::info!("Exported backup: {} rows", total(&bundle.counts()));
        Ok(bundle)
    }

    pub fn export_backup_to(&self, path: &Path) -> Result<ExportSummary> {
        let bundle = self.export_backup()?;
        write_bundle(&bundle, path)
    }

    /// Replace the store contents with a full backup
    pub fn restore_backup(&mut self, bundle: &Bundle) -> Result<BTreeMap<Table, usize>> {
        bundle.expect_full_backup()?;
        let written = executor::restore(self.store.connection_mut(), &bundle.data)?;
        tracing::info!("Restored backup: {} rows", total(&written));
        Ok(written)
    }

    pub fn restore_backup_from(&mut self, path: &Path) -> Result<BTreeMap<Table, usize>> {
        let bundle = Bundle::read_from(path)?;
        self.restore_backup(&bundle)
    }

    /// Add the primary entities of a full backup under fresh identities.
    ///
    /// Relationship rows of the backup are not imported.
    pub fn merge_backup(&mut self, bundle: &Bundle) -> Result<RemapReport> {
        bundle.expect_full_backup()?;
        let report = executor::merge(self.store.connection_mut(), &bundle.data, MERGE_TABLES)?;
        let skipped: usize = Table::relationships().iter().map(|t| bundle.rows(*t).len()).sum();
        if skipped > 0 {
            tracing::warn!("Merge skipped {} relationship rows", skipped);
        }
        tracing::info!("Merged backup: {} rows", total(&report.inserted));
        Ok(report)
    }

    pub fn merge_backup_from(&mut self, path: &Path) -> Result<RemapReport> {
        let bundle = Bundle::read_from(path)?;
        self.merge_backup(&bundle)
    }

    // ========== Shareable Document ==========

    /// Bundle the closed subgraph of one document
    pub fn export_document(&self, document_id: i64) -> Result<Bundle> {
        let data = executor::read_consistent(self.store.connection(), |conn| {
            subgraph::extract_document(conn, document_id)
        })?;

        let dangling = subgraph::dangling_references(&data);
        if !dangling.is_empty() {
            return Err(Error::Constraint(format!(
                "document #{} subgraph is not closed: {}",
                document_id,
                dangling.join(", ")
            )));
        }

        let bundle = Bundle::shared_document(data)?;
        tracing::info!(
            "Exported document #{}: {} rows",
            document_id,
            total(&bundle.counts())
        );
        Ok(bundle)
    }

    pub fn export_document_to(&self, document_id: i64, path: &Path) -> Result<ExportSummary> {
        let bundle = self.export_document(document_id)?;
        write_bundle(&bundle, path)
    }

    /// Import a shared document under fresh identities
    pub fn import_document(&mut self, bundle: &Bundle) -> Result<RemapReport> {
        bundle.expect_shared_document()?;
        let report = executor::import_remapped(self.store.connection_mut(), &bundle.data)?;
        tracing::info!(
            "Imported document: {} rows, {} links dropped",
            total(&report.inserted),
            report.total_dropped()
        );
        Ok(report)
    }

    pub fn import_document_from(&mut self, path: &Path) -> Result<RemapReport> {
        let bundle = Bundle::read_from(path)?;
        self.import_document(&bundle)
    }
}

fn write_bundle(bundle: &Bundle, path: &Path) -> Result<ExportSummary> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    bundle.write_to(path)?;
    tracing::debug!("Wrote bundle to {}", path.display());

    Ok(ExportSummary {
        path: path.to_path_buf(),
        counts: bundle.counts(),
        export_date: bundle.export_date.clone(),
    })
}

fn total(counts: &BTreeMap<Table, usize>) -> usize {
    counts.values().sum()
}
