//! # Proofkb - Argumentative Knowledge Base
//!
//! References, evidence, statements and documents linked by a many-to-many
//! relational graph, stored in SQLite.
//!
//! Proofkb provides:
//! - A static entity schema with explicit foreign-key edges
//! - Dependency ordering of tables for bulk delete/insert
//! - Subgraph extraction rooted at a document
//! - Identity remapping for importing foreign bundles
//! - Transactional backup export, restore, merge and document sharing

pub mod table;
pub mod order;
pub mod storage;
pub mod entity;
pub mod bundle;
pub mod subgraph;
pub mod remap;
pub mod executor;
pub mod interchange;
pub mod outcome;
pub mod render;
pub mod output;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use table::{ForeignKey, Table};
pub use entity::{Document, Entity, Evidence, Reference, Statement, Tag};
pub use bundle::{Bundle, BundleKind, Row, TableData};
pub use storage::SqliteStore;
pub use interchange::Interchange;
pub use outcome::Outcome;

/// Result type alias for Proofkb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Proofkb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid interchange format: {0}")]
    InvalidFormat(String),

    #[error("Schema dependency cycle between tables: {0}")]
    SchemaCycle(String),

    #[error("Schema inconsistency: {0}")]
    Schema(String),

    #[error("Storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Timestamp error: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl Error {
    /// Stable error kind name reported to collaborators
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFoundError",
            Error::InvalidFormat(_) => "InvalidFormatError",
            Error::SchemaCycle(_) => "SchemaCycleError",
            Error::Schema(_) => "SchemaError",
            Error::Store(_) | Error::Constraint(_) => "StoreError",
            Error::Io(_) => "IoError",
            Error::Serialize(_) | Error::Timestamp(_) => "SerializationError",
        }
    }
}
