//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - references, evidence, statements, documents, tags (entities)
//! - evidence_statement, document_statement, evidence_tag (relationships)

pub mod rows;
pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, IntegrityReport, SqliteStore};
