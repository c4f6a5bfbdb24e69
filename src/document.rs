//! Document references returned by the retrieval backends and the corpus
//! lookup table used to build reference texts.
//!
//! The lexical backend returns multi-valued fields as JSON arrays while the
//! vector backend returns plain strings, so text fields are read through
//! [`MultiText`] and flattened with a single space.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single document in a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document identifier.
    pub id: String,
    /// Backend-native retrieval score.
    pub score: f64,
    /// Section title, if the backend returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Raw section text, if the backend returned it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DocumentRef {
    /// Create a reference without metadata.
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
            title: None,
            text: None,
        }
    }

    /// Attach a title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Attach raw text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Text with the title prepended when requested, trimmed.
    pub fn combined_text(&self, with_title: bool) -> String {
        let text = self.text.as_deref().unwrap_or("");
        match (&self.title, with_title) {
            (Some(title), true) => format!("{} {}", title, text).trim().to_string(),
            _ => text.trim().to_string(),
        }
    }
}

/// Ordered documents for one (target, query) pair. Rank is the position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    /// The query as sent to the backend.
    pub query: String,
    /// Documents in rank order.
    pub documents: Vec<DocumentRef>,
}

impl RankedList {
    /// Create a ranked list.
    pub fn new(query: impl Into<String>, documents: Vec<DocumentRef>) -> Self {
        Self {
            query: query.into(),
            documents,
        }
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document ids in rank order.
    pub fn ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.id.clone()).collect()
    }

    /// Non-empty document texts joined with a single space.
    pub fn joined_text(&self, with_titles: bool) -> String {
        self.documents
            .iter()
            .map(|d| d.combined_text(with_titles))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Keep at most `k` documents.
    pub fn truncate(&mut self, k: usize) {
        self.documents.truncate(k);
    }
}

/// A text field that may arrive as a string, a list of strings or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MultiText {
    Single(String),
    Many(Vec<serde_json::Value>),
    Number(serde_json::Number),
}

impl MultiText {
    /// Flatten to one string; list items are joined with a single space.
    pub fn into_text(self) -> String {
        match self {
            MultiText::Single(s) => s,
            MultiText::Number(n) => n.to_string(),
            MultiText::Many(items) => items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Flatten an optional multi-valued field, dropping empty results.
pub fn flatten_text(field: Option<MultiText>) -> Option<String> {
    field.map(MultiText::into_text).filter(|s| !s.is_empty())
}

/// A corpus section as stored in the corpus JSONL files.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusEntry {
    /// Section identifier (matches the backends' document ids).
    pub section_id: MultiText,
    /// Raw section text.
    #[serde(default)]
    pub text_raw: Option<MultiText>,
}

/// Read-only id -> text lookup table.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    texts: HashMap<String, String>,
}

impl Corpus {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a section.
    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.texts.insert(id.into(), text.into());
    }

    /// Add a parsed corpus entry.
    pub fn add_entry(&mut self, entry: CorpusEntry) {
        let id = entry.section_id.into_text();
        let text = flatten_text(entry.text_raw).unwrap_or_default();
        self.texts.insert(id, text);
    }

    /// Raw text for a section id.
    pub fn text(&self, id: &str) -> Result<&str> {
        self.texts
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| EvalError::MissingCorpusEntry(id.to_string()))
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Whether the corpus has no sections.
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multitext_flattening() {
        let single: MultiText = serde_json::from_str(r#""plain text""#).unwrap();
        assert_eq!(single.into_text(), "plain text");

        let many: MultiText = serde_json::from_str(r#"["first part", "second part"]"#).unwrap();
        assert_eq!(many.into_text(), "first part second part");

        let number: MultiText = serde_json::from_str("42").unwrap();
        assert_eq!(number.into_text(), "42");
    }

    #[test]
    fn test_combined_text() {
        let doc = DocumentRef::new("d1", 1.0)
            .with_title("Capítulo 1")
            .with_text("  El texto  ");
        assert_eq!(doc.combined_text(false), "El texto");
        assert_eq!(doc.combined_text(true), "Capítulo 1   El texto");

        let bare = DocumentRef::new("d2", 0.5);
        assert_eq!(bare.combined_text(true), "");
    }

    #[test]
    fn test_joined_text_skips_empty_documents() {
        let list = RankedList::new(
            "q",
            vec![
                DocumentRef::new("a", 3.0).with_text("alpha"),
                DocumentRef::new("b", 2.0),
                DocumentRef::new("c", 1.0).with_text("gamma"),
            ],
        );
        assert_eq!(list.joined_text(false), "alpha gamma");
        assert_eq!(list.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_corpus_lookup() {
        let mut corpus = Corpus::new();
        let entry: CorpusEntry = serde_json::from_str(
            r#"{"section_id": "s1", "section_title": "Intro", "text_raw": ["uno", "dos"]}"#,
        )
        .unwrap();
        corpus.add_entry(entry);

        assert_eq!(corpus.text("s1").unwrap(), "uno dos");
        assert!(matches!(
            corpus.text("missing"),
            Err(EvalError::MissingCorpusEntry(id)) if id == "missing"
        ));
    }
}
