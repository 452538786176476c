//! Database schema definitions
//!
//! Table and column names must agree with [`crate::table::Table`]; the store
//! checks the live schema against it when opened.

/// SQL to create the references table
pub const CREATE_REFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "references" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT,
    year INTEGER,
    entry_type TEXT,
    journal TEXT,
    volume TEXT,
    pages TEXT,
    publisher TEXT,
    doi TEXT,
    url TEXT,
    notes TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the evidence table
/// A reference delete takes its evidence with it
pub const CREATE_EVIDENCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "evidence" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    page_number TEXT,
    reference_id INTEGER REFERENCES "references"(id) ON DELETE CASCADE,
    rating_strength INTEGER,
    rating_reliability INTEGER,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the statements table
pub const CREATE_STATEMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "statements" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the documents table
pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "documents" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT,
    excerpt TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the tags table
pub const CREATE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "tags" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the evidence_statement join table
pub const CREATE_EVIDENCE_STATEMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "evidence_statement" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evidence_id INTEGER NOT NULL REFERENCES "evidence"(id) ON DELETE CASCADE,
    statement_id INTEGER NOT NULL REFERENCES "statements"(id) ON DELETE CASCADE
)
"#;

/// SQL to create the document_statement join table
/// `order` is the position of the statement within its document
pub const CREATE_DOCUMENT_STATEMENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "document_statement" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES "documents"(id) ON DELETE CASCADE,
    statement_id INTEGER NOT NULL REFERENCES "statements"(id) ON DELETE CASCADE,
    "order" INTEGER NOT NULL,
    UNIQUE(document_id, "order")
)
"#;

/// SQL to create the evidence_tag join table
pub const CREATE_EVIDENCE_TAG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "evidence_tag" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evidence_id INTEGER NOT NULL REFERENCES "evidence"(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES "tags"(id) ON DELETE CASCADE,
    UNIQUE(evidence_id, tag_id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_evidence_reference ON \"evidence\"(reference_id)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_statement_evidence ON \"evidence_statement\"(evidence_id)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_statement_statement ON \"evidence_statement\"(statement_id)",
    "CREATE INDEX IF NOT EXISTS idx_document_statement_statement ON \"document_statement\"(statement_id)",
    "CREATE INDEX IF NOT EXISTS idx_evidence_tag_tag ON \"evidence_tag\"(tag_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_REFERENCES_TABLE,
        CREATE_EVIDENCE_TABLE,
        CREATE_STATEMENTS_TABLE,
        CREATE_DOCUMENTS_TABLE,
        CREATE_TAGS_TABLE,
        CREATE_EVIDENCE_STATEMENT_TABLE,
        CREATE_DOCUMENT_STATEMENT_TABLE,
        CREATE_EVIDENCE_TAG_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
