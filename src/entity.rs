//! Typed views of the primary entities
//!
//! The store keeps rows generically (see `storage::rows`); these structs are
//! what the collaborator surface hands out. Conversion goes through the
//! same JSON row form used by bundles.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bundle::Row;
use crate::table::Table;
use crate::{Error, Result};

/// A primary entity stored in one table
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: Table;

    fn id(&self) -> i64;

    fn to_row(&self) -> Result<Row> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidFormat(format!("{} did not serialize to a row", Self::TABLE))),
        }
    }

    fn from_row(row: Row) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(row))
            .map_err(|e| Error::InvalidFormat(format!("bad {} row: {}", Self::TABLE, e)))
    }
}

/// Bibliographic source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Reference {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Short citation: `author (year), title`
    pub fn citation(&self) -> String {
        let mut out = String::new();
        if let Some(author) = &self.author {
            out.push_str(author);
            out.push(' ');
        }
        if let Some(year) = self.year {
            out.push_str(&format!("({}) ", year));
        }
        if !out.is_empty() {
            out.truncate(out.trim_end().len());
            out.push_str(", ");
        }
        out.push_str(&self.title);
        out
    }
}

impl Entity for Reference {
    const TABLE: Table = Table::References;

    fn id(&self) -> i64 {
        self.id
    }
}

/// A quote or note extracted from a reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub page_number: Option<String>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub rating_strength: Option<i64>,
    #[serde(default)]
    pub rating_reliability: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Evidence {
    pub fn new(content: impl Into<String>, reference_id: Option<i64>) -> Self {
        Self {
            content: content.into(),
            reference_id,
            ..Self::default()
        }
    }
}

impl Entity for Evidence {
    const TABLE: Table = Table::Evidence;

    fn id(&self) -> i64 {
        self.id
    }
}

/// An argumentative claim
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Statement {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

impl Entity for Statement {
    const TABLE: Table = Table::Statements;

    fn id(&self) -> i64 {
        self.id
    }
}

/// A narrative composed from ordered statements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Document {
    const TABLE: Table = Table::Documents;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for Tag {
    const TABLE: Table = Table::Tags;

    fn id(&self) -> i64 {
        self.id
    }
}
