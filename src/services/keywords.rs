use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

const BUILTIN_KEYWORDS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/keywords.json"));

#[derive(Debug, Error)]
pub enum KeywordTableError {
    #[error("Keyword table io: {0}")]
    Io(#[from] std::io::Error),
    #[error("Keyword table json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Keyword table schema: {0}")]
    Schema(String),
    #[error("Keyword table pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Keyword sets used by the line classifier.
///
/// Supporting a new locale is a data change: add its words to the JSON table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub total: Vec<String>,
    pub subtotal: Vec<String>,
    pub cash_change: Vec<String>,
    pub ignorable: Vec<String>,
    pub currency_symbols: Vec<String>,
}

impl KeywordTable {
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_KEYWORDS).expect("Invalid built-in keyword table")
    }

    pub fn load(path: &Path) -> Result<Self, KeywordTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, KeywordTableError> {
        let value: Value = serde_json::from_str(raw)?;
        validate_json(&keyword_schema(), &value)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Loads `path` when given, otherwise the built-in table.
    pub fn resolve(path: Option<&str>) -> Result<Self, KeywordTableError> {
        match path {
            Some(path) if !path.trim().is_empty() => Self::load(Path::new(path)),
            _ => Ok(Self::builtin()),
        }
    }
}

fn keyword_schema() -> JSONSchema {
    let word_list = json!({
        "type": "array",
        "minItems": 1,
        "items": {"type": "string", "minLength": 1}
    });
    let schema = json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["total", "subtotal", "cash_change", "ignorable", "currency_symbols"],
        "properties": {
            "total": word_list,
            "subtotal": word_list,
            "cash_change": word_list,
            "ignorable": word_list,
            "currency_symbols": word_list
        }
    });

    JSONSchema::compile(&schema).expect("Invalid JSON schema")
}

fn validate_json(schema: &JSONSchema, value: &Value) -> Result<(), KeywordTableError> {
    if let Err(errors) = schema.validate(value) {
        let messages = errors.map(|e| e.to_string()).collect::<Vec<_>>();
        return Err(KeywordTableError::Schema(messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let table = KeywordTable::builtin();
        assert!(table.total.iter().any(|k| k == "total"));
        assert!(table.subtotal.iter().any(|k| k == "subtotal"));
        assert!(table.currency_symbols.iter().any(|k| k == "$"));
    }

    #[test]
    fn rejects_missing_sets() {
        let err = KeywordTable::from_json(r#"{"total": ["total"]}"#).unwrap_err();
        assert!(matches!(err, KeywordTableError::Schema(_)));
    }

    #[test]
    fn rejects_empty_keywords() {
        let raw = r#"{
            "total": [""], "subtotal": ["subtotal"], "cash_change": ["cash"],
            "ignorable": ["tel"], "currency_symbols": ["$"]
        }"#;
        assert!(matches!(
            KeywordTable::from_json(raw),
            Err(KeywordTableError::Schema(_))
        ));
    }

    #[test]
    fn loads_custom_table_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        std::fs::write(
            &path,
            r#"{"total": ["totaal"], "subtotal": ["subtotaal"], "cash_change": ["contant"],
                "ignorable": ["btw"], "currency_symbols": ["€"]}"#,
        )
        .unwrap();
        let table = KeywordTable::resolve(path.to_str()).unwrap();
        assert_eq!(table.total, vec!["totaal".to_string()]);
    }
}
