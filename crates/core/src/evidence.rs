//! Evidence records: the unit every other component moves around.
//!
//! A record is one retrievable fragment of source text with an identifier,
//! provenance, scalar metadata, and an optional relevance score. Records are
//! validated on construction and immutable afterwards; the `with_*` methods
//! consume the record and are meant for the construction phase only.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata keys consulted (in order) for a record's page number.
const PAGE_KEYS: [&str; 2] = ["page_number", "page"];

/// Ordered, string-keyed scalar metadata.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl MetadataValue {
    /// Coerce an arbitrary JSON value into a scalar.
    ///
    /// Lists are joined with `", "`, objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::Text(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Interpret the value as an integer page number, if it is one.
    pub fn as_page(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value carries nothing worth printing.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => Ok(()),
        }
    }
}

impl From<&MetadataValue> for serde_json::Value {
    fn from(value: &MetadataValue) -> Self {
        match value {
            MetadataValue::Bool(b) => Self::Bool(*b),
            MetadataValue::Int(i) => Self::from(*i),
            MetadataValue::Float(x) => Self::from(*x),
            MetadataValue::Text(s) => Self::String(s.clone()),
            MetadataValue::Null => Self::Null,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// One retrievable unit of source text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    id: String,
    text: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: Metadata,
    #[serde(skip_serializing_if = "String::is_empty")]
    source: String,
    /// Lower is more relevant (a vector-store distance when retrieved).
    #[serde(skip_serializing_if = "Option::is_none")]
    relevance: Option<f64>,
}

impl EvidenceRecord {
    /// Create a record. The id must be non-blank and the text must not be
    /// empty after trimming.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Result<Self, ContextError> {
        let id = id.into().trim().to_string();
        let text = text.into();
        if id.is_empty() {
            return Err(ContextError::InvalidRecord("record id is empty".into()));
        }
        if text.trim().is_empty() {
            return Err(ContextError::InvalidRecord(format!(
                "record '{id}' has empty text"
            )));
        }
        Ok(Self {
            id,
            text,
            metadata: Metadata::new(),
            source: String::new(),
            relevance: None,
        })
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn relevance(&self) -> Option<f64> {
        self.relevance
    }

    /// Raw page value: `page_number` wins over `page`.
    pub fn page(&self) -> Option<&MetadataValue> {
        PAGE_KEYS.iter().find_map(|key| self.metadata.get(*key))
    }

    /// Page number used for ordering; missing or unparsable pages sort as 0.
    pub fn page_number(&self) -> i64 {
        self.page().and_then(MetadataValue::as_page).unwrap_or(0)
    }

    /// The record's source, falling back to `metadata.source`.
    pub fn effective_source(&self) -> Option<&str> {
        if !self.source.is_empty() {
            return Some(&self.source);
        }
        self.metadata
            .get("source")
            .and_then(MetadataValue::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_id_rejected() {
        assert!(EvidenceRecord::new("  ", "text").is_err());
    }

    #[test]
    fn whitespace_text_rejected() {
        let err = EvidenceRecord::new("c1", " \n\t ").unwrap_err();
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn id_is_trimmed() {
        let rec = EvidenceRecord::new(" c1 ", "body").unwrap();
        assert_eq!(rec.id(), "c1");
    }

    #[test]
    fn page_number_prefers_page_number_key() {
        let rec = EvidenceRecord::new("c1", "body")
            .unwrap()
            .with_meta("page", 9_i64)
            .with_meta("page_number", "4");
        assert_eq!(rec.page_number(), 4);
    }

    #[test]
    fn unparsable_page_defaults_to_zero() {
        let rec = EvidenceRecord::new("c1", "body")
            .unwrap()
            .with_meta("page", "iv");
        assert_eq!(rec.page_number(), 0);

        let bare = EvidenceRecord::new("c2", "body").unwrap();
        assert_eq!(bare.page_number(), 0);
    }

    #[test]
    fn float_page_truncates() {
        assert_eq!(MetadataValue::Float(3.9).as_page(), Some(3));
    }

    #[test]
    fn json_list_is_joined() {
        let v = MetadataValue::from_json(&json!(["a", 1, "b"]));
        assert_eq!(v, MetadataValue::Text("a, 1, b".into()));
    }

    #[test]
    fn json_object_is_stringified() {
        let v = MetadataValue::from_json(&json!({"k": 1}));
        assert_eq!(v, MetadataValue::Text("{\"k\":1}".into()));
    }

    #[test]
    fn effective_source_falls_back_to_metadata() {
        let rec = EvidenceRecord::new("c1", "body")
            .unwrap()
            .with_meta("source", "paper.pdf");
        assert_eq!(rec.effective_source(), Some("paper.pdf"));

        let own = rec.clone().with_source("Article_1");
        assert_eq!(own.effective_source(), Some("Article_1"));
    }

    #[test]
    fn record_serializes_without_empty_fields() {
        let rec = EvidenceRecord::new("c1", "body").unwrap();
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"id":"c1","text":"body"}"#);
    }
}
