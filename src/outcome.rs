//! Structured results handed back to collaborators
//!
//! ```text
//! { "success": true, ...payload }
//! { "success": false, "error": "<message>", "kind": "<error kind>" }
//! { "success": false, "cancelled": true }
//! ```

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::table::Table;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Map<String, Value>),
    Failure { error: String, kind: String },
    /// The user backed out of choosing a file; not an error
    Cancelled,
}

impl Outcome {
    /// Success carrying the fields of `payload`; a non-object payload is
    /// placed under `data`.
    pub fn success(payload: impl Serialize) -> Self {
        match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => Outcome::Success(map),
            Ok(Value::Null) => Outcome::Success(Map::new()),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                Outcome::Success(map)
            }
            Err(e) => Outcome::failure(&Error::Serialize(e)),
        }
    }

    pub fn failure(error: &Error) -> Self {
        Outcome::Failure {
            error: error.to_string(),
            kind: error.kind().to_string(),
        }
    }

    pub fn cancelled() -> Self {
        Outcome::Cancelled
    }

    /// Fold an operation result into an outcome
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result {
            Ok(payload) => Outcome::success(payload),
            Err(e) => {
                tracing::debug!("Operation failed: {}", e);
                Outcome::failure(&e)
            }
        }
    }

    /// Failure for an error raised outside the interchange operations
    /// (config loading, opening the store, reading a prompt answer).
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let kind = error
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<Error>() {
                    Some(e.kind())
                } else if cause.is::<std::io::Error>() {
                    Some("IoError")
                } else if cause.is::<toml::de::Error>() || cause.is::<toml::ser::Error>() {
                    Some("InvalidFormatError")
                } else if cause.is::<rusqlite::Error>() {
                    Some("StoreError")
                } else {
                    None
                }
            })
            .unwrap_or("ConfigError");
        Outcome::Failure {
            error: format!("{:#}", error),
            kind: kind.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Outcome::Success(payload) => {
                let mut map = Map::new();
                map.insert("success".to_string(), Value::Bool(true));
                for (key, value) in payload {
                    if key != "success" {
                        map.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(map)
            }
            Outcome::Failure { error, kind } => json!({
                "success": false,
                "error": error,
                "kind": kind,
            }),
            Outcome::Cancelled => json!({
                "success": false,
                "cancelled": true,
            }),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Per-table counts keyed by table name, zero counts included
pub fn counts_json(counts: &BTreeMap<Table, usize>) -> Value {
    let map: Map<String, Value> = Table::all()
        .iter()
        .map(|t| (t.as_str().to_string(), Value::from(counts.get(t).copied().unwrap_or(0))))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flattens_payload() {
        let outcome = Outcome::success(json!({"path": "backup.json", "success": "ignored"}));
        assert_eq!(outcome.to_json(), json!({"success": true, "path": "backup.json"}));
    }

    #[test]
    fn test_failure_carries_kind() {
        let outcome = Outcome::from_result::<()>(Err(Error::NotFound("documents #4".into())));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "NotFoundError");
        assert!(value["error"].as_str().unwrap().contains("documents #4"));
    }

    #[test]
    fn test_failure_from_setup_errors() {
        let store: anyhow::Error = Error::Schema("references is missing column title".into()).into();
        assert_eq!(
            Outcome::from_anyhow(&store).to_json(),
            json!({
                "success": false,
                "error": "Schema inconsistency: references is missing column title",
                "kind": "SchemaError",
            })
        );

        let io = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "stdin closed"))
            .context("reading answer");
        let value = Outcome::from_anyhow(&io).to_json();
        assert_eq!(value["kind"], "IoError");
        assert_eq!(value["error"], "reading answer: stdin closed");

        let toml_err = toml::from_str::<toml::Value>("database = ").unwrap_err();
        assert_eq!(Outcome::from_anyhow(&toml_err.into()).to_json()["kind"], "InvalidFormatError");

        let refused = anyhow::anyhow!("config already exists at proof.toml");
        let value = Outcome::from_anyhow(&refused).to_json();
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "ConfigError");
        assert!(value.get("cancelled").is_none());
    }

    #[test]
    fn test_cancelled_is_not_an_error() {
        let value = Outcome::cancelled().to_json();
        assert_eq!(value, json!({"success": false, "cancelled": true}));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_counts_json_lists_every_table() {
        let mut counts = BTreeMap::new();
        counts.insert(Table::Tags, 3);
        let value = counts_json(&counts);
        assert_eq!(value["tags"], 3);
        assert_eq!(value["references"], 0);
        assert_eq!(value.as_object().unwrap().len(), Table::all().len());
    }
}
