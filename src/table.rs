//! Entity schema - the static description of every table in the store
//!
//! Five primary tables hold identity-bearing entities:
//! - `references`: bibliographic sources
//! - `evidence`: quotes or notes taken from a reference
//! - `statements`: argumentative claims
//! - `documents`: narratives composed from ordered statements
//! - `tags`: unique free-form labels
//!
//! Three relationship tables connect them:
//! - `evidence_statement`: evidence ↔ statement
//! - `document_statement`: document ↔ statement, ordered by `order`
//! - `evidence_tag`: evidence ↔ tag
//!
//! Every foreign-key edge cascades on delete.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identity column shared by every table.
pub const ID_COLUMN: &str = "id";

/// Timestamp columns carried by primary tables.
pub const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Relationship field name → referenced table.
///
/// This is the only place a field name is tied to a table. `evidence_id`
/// points at `evidence`, which does not follow the plural naming of the
/// other tables.
pub const FOREIGN_KEY_FIELDS: &[(&str, Table)] = &[
    ("reference_id", Table::References),
    ("evidence_id", Table::Evidence),
    ("statement_id", Table::Statements),
    ("document_id", Table::Documents),
    ("tag_id", Table::Tags),
];

/// Every table known to the store.
///
/// The declaration order is the schema order: it breaks ties in the
/// dependency orderer and fixes the key order of serialized bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    References,
    Evidence,
    Statements,
    Documents,
    Tags,
    EvidenceStatement,
    DocumentStatement,
    EvidenceTag,
}

/// A foreign-key edge from a column of one table to the identity of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: Table,
    pub nullable: bool,
}

impl ForeignKey {
    const fn required(column: &'static str, target: Table) -> Self {
        Self { column, target, nullable: false }
    }

    const fn optional(column: &'static str, target: Table) -> Self {
        Self { column, target, nullable: true }
    }
}

const EVIDENCE_FKS: &[ForeignKey] = &[ForeignKey::optional("reference_id", Table::References)];
const EVIDENCE_STATEMENT_FKS: &[ForeignKey] = &[
    ForeignKey::required("evidence_id", Table::Evidence),
    ForeignKey::required("statement_id", Table::Statements),
];
const DOCUMENT_STATEMENT_FKS: &[ForeignKey] = &[
    ForeignKey::required("document_id", Table::Documents),
    ForeignKey::required("statement_id", Table::Statements),
];
const EVIDENCE_TAG_FKS: &[ForeignKey] = &[
    ForeignKey::required("evidence_id", Table::Evidence),
    ForeignKey::required("tag_id", Table::Tags),
];

impl Table {
    /// Table name as stored in SQLite and in bundles
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::References => "references",
            Table::Evidence => "evidence",
            Table::Statements => "statements",
            Table::Documents => "documents",
            Table::Tags => "tags",
            Table::EvidenceStatement => "evidence_statement",
            Table::DocumentStatement => "document_statement",
            Table::EvidenceTag => "evidence_tag",
        }
    }

    /// Quoted identifier for use in SQL (`references` is a keyword)
    pub fn sql_name(&self) -> &'static str {
        match self {
            Table::References => "\"references\"",
            Table::Evidence => "\"evidence\"",
            Table::Statements => "\"statements\"",
            Table::Documents => "\"documents\"",
            Table::Tags => "\"tags\"",
            Table::EvidenceStatement => "\"evidence_statement\"",
            Table::DocumentStatement => "\"document_statement\"",
            Table::EvidenceTag => "\"evidence_tag\"",
        }
    }

    /// All tables in schema order
    pub fn all() -> &'static [Table] {
        &[
            Table::References,
            Table::Evidence,
            Table::Statements,
            Table::Documents,
            Table::Tags,
            Table::EvidenceStatement,
            Table::DocumentStatement,
            Table::EvidenceTag,
        ]
    }

    /// Tables holding identity-bearing entities
    pub fn primary() -> &'static [Table] {
        &[
            Table::References,
            Table::Evidence,
            Table::Statements,
            Table::Documents,
            Table::Tags,
        ]
    }

    /// Tables whose rows are pure edges between entities
    pub fn relationships() -> &'static [Table] {
        &[
            Table::EvidenceStatement,
            Table::DocumentStatement,
            Table::EvidenceTag,
        ]
    }

    pub fn is_relationship(&self) -> bool {
        matches!(
            self,
            Table::EvidenceStatement | Table::DocumentStatement | Table::EvidenceTag
        )
    }

    /// Column names in declaration order, identity first
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::References => &[
                "id", "title", "author", "year", "entry_type", "journal", "volume", "pages",
                "publisher", "doi", "url", "notes", "created_at", "updated_at",
            ],
            Table::Evidence => &[
                "id", "content", "page_number", "reference_id", "rating_strength",
                "rating_reliability", "created_at", "updated_at",
            ],
            Table::Statements => &["id", "content", "created_at", "updated_at"],
            Table::Documents => &["id", "title", "content", "excerpt", "created_at", "updated_at"],
            Table::Tags => &["id", "name", "created_at", "updated_at"],
            Table::EvidenceStatement => &["id", "evidence_id", "statement_id"],
            Table::DocumentStatement => &["id", "document_id", "statement_id", "order"],
            Table::EvidenceTag => &["id", "evidence_id", "tag_id"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Foreign-key edges leaving this table
    pub fn foreign_keys(&self) -> &'static [ForeignKey] {
        match self {
            Table::Evidence => EVIDENCE_FKS,
            Table::EvidenceStatement => EVIDENCE_STATEMENT_FKS,
            Table::DocumentStatement => DOCUMENT_STATEMENT_FKS,
            Table::EvidenceTag => EVIDENCE_TAG_FKS,
            Table::References | Table::Statements | Table::Documents | Table::Tags => &[],
        }
    }

    /// Tables this table references (its parents)
    pub fn dependencies(&self) -> Vec<Table> {
        let mut deps: Vec<Table> = self.foreign_keys().iter().map(|fk| fk.target).collect();
        deps.sort();
        deps.dedup();
        deps
    }

    /// Foreign-key edge declared on `column`, if any
    pub fn foreign_key(&self, column: &str) -> Option<&'static ForeignKey> {
        self.foreign_keys().iter().find(|fk| fk.column == column)
    }

    /// Columns stripped from a row before it is inserted under a fresh identity
    pub fn is_identity_or_timestamp(&self, column: &str) -> bool {
        column == ID_COLUMN || (!self.is_relationship() && TIMESTAMP_COLUMNS.contains(&column))
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidFormat(format!("Unknown table: {}", s)))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Table referenced by a relationship field, from [`FOREIGN_KEY_FIELDS`]
pub fn foreign_key_target(field: &str) -> Option<Table> {
    FOREIGN_KEY_FIELDS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, table)| *table)
}

/// Check the field map against the foreign keys declared by each table.
///
/// Every declared foreign key must resolve through the map to its own target,
/// and every map entry must be used by at least one table.
pub fn validate_foreign_key_fields() -> Result<()> {
    for table in Table::all() {
        for fk in table.foreign_keys() {
            match foreign_key_target(fk.column) {
                Some(target) if target == fk.target => {}
                Some(target) => {
                    return Err(Error::Schema(format!(
                        "{}.{} references {} but the field map points at {}",
                        table, fk.column, fk.target, target
                    )));
                }
                None => {
                    return Err(Error::Schema(format!(
                        "{}.{} is missing from the field map",
                        table, fk.column
                    )));
                }
            }
        }
    }

    for (field, target) in FOREIGN_KEY_FIELDS {
        if target.is_relationship() {
            return Err(Error::Schema(format!(
                "field {} points at relationship table {}",
                field, target
            )));
        }
        let used = Table::all()
            .iter()
            .any(|t| t.foreign_key(field).is_some());
        if !used {
            return Err(Error::Schema(format!("field {} is not declared by any table", field)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_roundtrip() {
        for table in Table::all() {
            let parsed: Table = table.as_str().parse().unwrap();
            assert_eq!(*table, parsed);
        }
        assert!("reference".parse::<Table>().is_err());
    }

    #[test]
    fn test_serde_names_match_sql_names() {
        for table in Table::all() {
            let json = serde_json::to_string(table).unwrap();
            assert_eq!(json, format!("\"{}\"", table.as_str()));
            assert_eq!(table.sql_name(), format!("\"{}\"", table.as_str()));
        }
    }

    #[test]
    fn test_field_map_is_consistent() {
        validate_foreign_key_fields().unwrap();
    }

    #[test]
    fn test_irregular_plural() {
        assert_eq!(foreign_key_target("evidence_id"), Some(Table::Evidence));
        assert_eq!(foreign_key_target("statement_id"), Some(Table::Statements));
        assert_eq!(foreign_key_target("order"), None);
        assert_eq!(foreign_key_target("evidences_id"), None);
    }

    #[test]
    fn test_dependencies() {
        assert!(Table::References.dependencies().is_empty());
        assert_eq!(Table::Evidence.dependencies(), vec![Table::References]);
        assert_eq!(
            Table::EvidenceTag.dependencies(),
            vec![Table::Evidence, Table::Tags]
        );
    }

    #[test]
    fn test_identity_and_timestamp_columns() {
        assert!(Table::References.is_identity_or_timestamp("id"));
        assert!(Table::References.is_identity_or_timestamp("created_at"));
        assert!(!Table::References.is_identity_or_timestamp("title"));
        assert!(Table::EvidenceTag.is_identity_or_timestamp("id"));
        assert!(!Table::DocumentStatement.is_identity_or_timestamp("order"));
    }
}
