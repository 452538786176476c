//! Interchange bundles - self-describing JSON snapshots of table rows
//!
//! ```text
//! {
//!   "type": "ProofSharedDocument" | absent (full backup),
//!   "version": 1,
//!   "exportDate": "2026-01-01T00:00:00Z",
//!   "data": { "<table>": [ { <column>: <value>, ... }, ... ], ... }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::table::Table;
use crate::{Error, Result};

/// Bundle format version written by this build
pub const FORMAT_VERSION: u32 = 1;

/// Type tag marking a shareable single-document bundle
pub const SHARED_DOCUMENT_TYPE: &str = "ProofSharedDocument";

/// One table row, column name → value
pub type Row = serde_json::Map<String, Value>;

/// Rows per table, keyed in schema order
pub type TableData = BTreeMap<Table, Vec<Row>>;

/// What a bundle claims to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// Every row of every table, identities included
    FullBackup,
    /// The closed subgraph of one document
    SharedDocument,
}

impl BundleKind {
    fn type_tag(&self) -> Option<&'static str> {
        match self {
            BundleKind::FullBackup => None,
            BundleKind::SharedDocument => Some(SHARED_DOCUMENT_TYPE),
        }
    }

    fn from_type_tag(tag: Option<&str>) -> Result<Self> {
        match tag {
            None => Ok(BundleKind::FullBackup),
            Some(SHARED_DOCUMENT_TYPE) => Ok(BundleKind::SharedDocument),
            Some(other) => Err(Error::InvalidFormat(format!("unknown bundle type: {}", other))),
        }
    }
}

/// Wire form of a bundle
#[derive(Serialize, Deserialize)]
struct RawBundle {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    type_tag: Option<String>,
    version: u32,
    #[serde(rename = "exportDate", default)]
    export_date: Option<String>,
    data: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub kind: BundleKind,
    pub version: u32,
    pub export_date: Option<String>,
    pub data: TableData,
}

impl Bundle {
    /// Wrap rows as a full backup stamped with the current time
    pub fn full_backup(data: TableData) -> Result<Self> {
        Self::new(BundleKind::FullBackup, data)
    }

    /// Wrap a document subgraph as a shareable bundle
    pub fn shared_document(data: TableData) -> Result<Self> {
        Self::new(BundleKind::SharedDocument, data)
    }

    fn new(kind: BundleKind, data: TableData) -> Result<Self> {
        Ok(Self {
            kind,
            version: FORMAT_VERSION,
            export_date: Some(format_export_date(OffsetDateTime::now_utc())?),
            data,
        })
    }

    /// Parse a bundle, mapping any shape error to `InvalidFormat`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawBundle = serde_json::from_str(json)
            .map_err(|e| Error::InvalidFormat(format!("not an interchange bundle: {}", e)))?;

        let kind = BundleKind::from_type_tag(raw.type_tag.as_deref())?;
        let mut data = TableData::new();
        for (name, rows) in raw.data {
            let table: Table = name.parse()?;
            data.insert(table, rows);
        }

        Ok(Self {
            kind,
            version: raw.version,
            export_date: raw.export_date,
            data,
        })
    }

    /// Read and parse a bundle file in full
    pub fn read_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        let raw = RawBundle {
            type_tag: self.kind.type_tag().map(str::to_string),
            version: self.version,
            export_date: self.export_date.clone(),
            data: self
                .data
                .iter()
                .map(|(table, rows)| (table.as_str().to_string(), rows.clone()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json_string_pretty()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Rows for a table, empty when the table is absent
    pub fn rows(&self, table: Table) -> &[Row] {
        self.data.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row counts per table
    pub fn counts(&self) -> BTreeMap<Table, usize> {
        self.data.iter().map(|(t, rows)| (*t, rows.len())).collect()
    }

    pub fn exported_at(&self) -> Option<OffsetDateTime> {
        self.export_date
            .as_deref()
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }

    /// Accept only a full backup carrying every table
    pub fn expect_full_backup(&self) -> Result<()> {
        if self.kind != BundleKind::FullBackup {
            return Err(Error::InvalidFormat(
                "expected a full backup, found a shared document".to_string(),
            ));
        }
        self.expect_supported_version()?;

        let missing: Vec<&str> = Table::all()
            .iter()
            .filter(|t| !self.data.contains_key(t))
            .map(|t| t.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidFormat(format!(
                "backup is missing tables: {}",
                missing.join(", ")
            )));
        }

        self.validate_rows()
    }

    /// Accept only a shareable document bundle
    pub fn expect_shared_document(&self) -> Result<()> {
        if self.kind != BundleKind::SharedDocument {
            return Err(Error::InvalidFormat(format!(
                "expected a bundle of type {}",
                SHARED_DOCUMENT_TYPE
            )));
        }
        self.expect_supported_version()?;
        self.validate_rows()
    }

    fn expect_supported_version(&self) -> Result<()> {
        if self.version == 0 || self.version > FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported bundle version {} (supported: {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Every column must belong to its table and hold a scalar value
    fn validate_rows(&self) -> Result<()> {
        for (table, rows) in &self.data {
            for (index, row) in rows.iter().enumerate() {
                for (column, value) in row {
                    if !table.has_column(column) {
                        return Err(Error::InvalidFormat(format!(
                            "{}[{}] has unknown column {}",
                            table, index, column
                        )));
                    }
                    if value.is_array() || value.is_object() {
                        return Err(Error::InvalidFormat(format!(
                            "{}[{}].{} is not a scalar value",
                            table, index, column
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// RFC 3339 or nothing; a date RFC 3339 cannot carry is an error
fn format_export_date(at: OffsetDateTime) -> Result<String> {
    Ok(at.format(&Rfc3339)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn all_tables_empty() -> TableData {
        Table::all().iter().map(|t| (*t, Vec::new())).collect()
    }

    #[test]
    fn test_full_backup_has_no_type_tag() {
        let bundle = Bundle::full_backup(all_tables_empty()).unwrap();
        let json: Value = serde_json::from_str(&bundle.to_json_string_pretty().unwrap()).unwrap();

        assert!(json.get("type").is_none());
        assert_eq!(json["version"], 1);
        assert!(json["exportDate"].is_string());
        assert_eq!(json["data"].as_object().unwrap().len(), 8);
        assert!(bundle.exported_at().is_some());
    }

    #[test]
    fn test_shared_document_type_tag() {
        let mut data = TableData::new();
        data.insert(Table::Statements, vec![row(json!({"id": 4, "content": "claim"}))]);
        let bundle = Bundle::shared_document(data).unwrap();
        let text = bundle.to_json_string_pretty().unwrap();
        assert!(text.contains("\"type\": \"ProofSharedDocument\""));

        let parsed = Bundle::from_json_str(&text).unwrap();
        assert_eq!(parsed.kind, BundleKind::SharedDocument);
        assert_eq!(parsed.rows(Table::Statements).len(), 1);
        assert!(parsed.rows(Table::Documents).is_empty());
        parsed.expect_shared_document().unwrap();
        assert!(matches!(parsed.expect_full_backup(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        for text in [
            "not json",
            "[]",
            r#"{"version": 1}"#,
            r#"{"version": 1, "data": {"widgets": []}}"#,
            r#"{"version": 1, "data": {"tags": [1, 2]}}"#,
            r#"{"type": "Other", "version": 1, "data": {}}"#,
        ] {
            assert!(
                matches!(Bundle::from_json_str(text), Err(Error::InvalidFormat(_))),
                "accepted: {}",
                text
            );
        }
    }

    #[test]
    fn test_full_backup_requires_every_table() {
        let mut data = all_tables_empty();
        data.remove(&Table::EvidenceTag);
        let bundle = Bundle::full_backup(data).unwrap();
        match bundle.expect_full_backup() {
            Err(Error::InvalidFormat(msg)) => assert!(msg.contains("evidence_tag")),
            other => panic!("expected invalid format, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_columns_and_versions() {
        let mut data = all_tables_empty();
        data.insert(Table::Tags, vec![row(json!({"id": 1, "colour": "red"}))]);
        assert!(Bundle::full_backup(data).unwrap().expect_full_backup().is_err());

        let mut bundle = Bundle::full_backup(all_tables_empty()).unwrap();
        bundle.version = 2;
        assert!(bundle.expect_full_backup().is_err());
    }

    #[test]
    fn test_export_date_is_rfc3339_or_error() {
        let at = time::Date::from_calendar_date(2024, time::Month::March, 5)
            .unwrap()
            .with_hms(9, 30, 0)
            .unwrap()
            .assume_utc();
        assert_eq!(format_export_date(at).unwrap(), "2024-03-05T09:30:00Z");

        let out_of_range = time::Date::from_calendar_date(-1, time::Month::January, 1)
            .unwrap()
            .midnight()
            .assume_utc();
        let err = format_export_date(out_of_range).unwrap_err();
        assert!(matches!(err, Error::Timestamp(_)));
        assert_eq!(err.kind(), "SerializationError");
    }
}
