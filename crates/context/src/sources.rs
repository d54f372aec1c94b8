//! Chunk source files produced by ingestion.
//!
//! Each `*.chunks.json` file describes one ingested source document:
//!
//! ```json
//! { "source": "paper.pdf",
//!   "chunks": [ { "chunk_id": "paper_p1_c0", "text": "...",
//!                 "metadata": { "page_number": 1 } } ] }
//! ```
//!
//! Malformed entries (non-object, blank id, blank text) are skipped without
//! failing the file. A file whose `chunks` field is not a list is rejected.

use evidex_core::error::ContextError;
use evidex_core::{EvidenceRecord, Metadata, MetadataValue};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix identifying chunk source files.
pub const CHUNK_FILE_SUFFIX: &str = ".chunks.json";

/// One parsed chunk source file.
#[derive(Debug, Clone)]
pub struct ChunkDocument {
    pub path: PathBuf,
    /// Document-level source label (empty when absent).
    pub source: String,
    /// Raw chunk entries, not yet validated.
    pub chunks: Vec<Value>,
}

/// Sorted `*.chunks.json` files in `dir`.
///
/// A missing directory or one without chunk files is
/// [`ContextError::MissingChunks`].
pub fn list_chunk_files(dir: &Path) -> Result<Vec<PathBuf>, ContextError> {
    let missing = || ContextError::MissingChunks {
        dir: dir.to_path_buf(),
    };
    let entries = std::fs::read_dir(dir).map_err(|_| missing())?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(CHUNK_FILE_SUFFIX))
        })
        .collect();

    if files.is_empty() {
        return Err(missing());
    }
    files.sort();
    Ok(files)
}

/// Read and parse one chunk source file.
pub fn load_chunk_document(path: &Path) -> Result<ChunkDocument, ContextError> {
    let invalid = |reason: String| ContextError::InvalidChunkFile {
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let payload: Value = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(mut payload) = payload else {
        return Err(invalid("top-level value must be an object".into()));
    };

    let chunks = match payload.remove("chunks") {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid("'chunks' must be a list".into())),
    };
    let source = payload.get("source").map(label).unwrap_or_default();

    Ok(ChunkDocument {
        path: path.to_path_buf(),
        source,
        chunks,
    })
}

/// Validate and convert a document's entries into records.
///
/// Ids come from `chunk_id` (or `id`); text is trimmed; non-object metadata
/// becomes empty; source falls back from the entry to `metadata.source` to
/// the document-level source.
pub fn records_from_document(doc: &ChunkDocument) -> Vec<EvidenceRecord> {
    let mut records = Vec::with_capacity(doc.chunks.len());
    let mut skipped = 0usize;

    for entry in &doc.chunks {
        match record_from_entry(entry, &doc.source) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(
            path = %doc.path.display(),
            skipped,
            kept = records.len(),
            "Skipped malformed chunk entries"
        );
    }
    records
}

/// Load records from every file, concatenated in the given order.
pub fn load_records(paths: &[PathBuf]) -> Result<Vec<EvidenceRecord>, ContextError> {
    let mut records = Vec::new();
    for path in paths {
        let doc = load_chunk_document(path)?;
        records.extend(records_from_document(&doc));
    }
    Ok(records)
}

fn record_from_entry(entry: &Value, doc_source: &str) -> Option<EvidenceRecord> {
    let Value::Object(fields) = entry else {
        return None;
    };

    let id = fields
        .get("chunk_id")
        .or_else(|| fields.get("id"))
        .map(label)
        .unwrap_or_default();
    let text = fields
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();

    let metadata: Metadata = match fields.get("metadata") {
        Some(Value::Object(meta)) => meta
            .iter()
            .map(|(k, v)| (k.clone(), MetadataValue::from_json(v)))
            .collect(),
        _ => Metadata::new(),
    };

    let source = [
        fields.get("source").map(label),
        metadata.get("source").map(|v| v.to_string()),
        Some(doc_source.to_string()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .unwrap_or_default();

    EvidenceRecord::new(id, text)
        .ok()
        .map(|record| record.with_metadata(metadata).with_source(source))
}

/// String form of a JSON scalar used as an id or label.
fn label(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, body: &Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn missing_dir_is_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_chunk_files(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ContextError::MissingChunks { .. }));
    }

    #[test]
    fn empty_dir_is_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        let err = list_chunk_files(dir.path()).unwrap_err();
        assert!(err.to_string().contains("run ingestion first"));
    }

    #[test]
    fn chunk_files_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.pdf.chunks.json", &json!({"chunks": []}));
        write(dir.path(), "a.pdf.chunks.json", &json!({"chunks": []}));
        write(dir.path(), "other.json", &json!({}));

        let files = list_chunk_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf.chunks.json", "b.pdf.chunks.json"]);
    }

    #[test]
    fn chunks_must_be_a_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "x.chunks.json", &json!({"chunks": {"a": 1}}));
        let err = load_chunk_document(&path).unwrap_err();
        assert!(err.to_string().contains("'chunks' must be a list"));
    }

    #[test]
    fn unparsable_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.chunks.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_chunk_document(&path),
            Err(ContextError::InvalidChunkFile { .. })
        ));
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let doc = ChunkDocument {
            path: PathBuf::from("doc.chunks.json"),
            source: "doc.pdf".into(),
            chunks: vec![
                json!({"chunk_id": "c1", "text": "  first  "}),
                json!("not an object"),
                json!({"chunk_id": "  ", "text": "no id"}),
                json!({"chunk_id": "c4", "text": "   "}),
                json!({"id": "c5", "text": "legacy id key"}),
            ],
        };
        let records = records_from_document(&doc);
        let ids: Vec<_> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["c1", "c5"]);
        assert_eq!(records[0].text(), "first");
    }

    #[test]
    fn source_fallback_chain() {
        let doc = ChunkDocument {
            path: PathBuf::from("doc.chunks.json"),
            source: "doc.pdf".into(),
            chunks: vec![
                json!({"chunk_id": "own", "text": "t", "source": "entry.pdf",
                       "metadata": {"source": "meta.pdf"}}),
                json!({"chunk_id": "meta", "text": "t", "metadata": {"source": "meta.pdf"}}),
                json!({"chunk_id": "doc", "text": "t", "source": ""}),
            ],
        };
        let sources: Vec<_> = records_from_document(&doc)
            .iter()
            .map(|r| r.source().to_string())
            .collect();
        assert_eq!(sources, vec!["entry.pdf", "meta.pdf", "doc.pdf"]);
    }

    #[test]
    fn metadata_is_coerced_to_scalars() {
        let doc = ChunkDocument {
            path: PathBuf::from("doc.chunks.json"),
            source: String::new(),
            chunks: vec![
                json!({"chunk_id": "c1", "text": "t",
                       "metadata": {"page_number": 2, "authors": ["A", "B"], "bbox": {"x": 1}}}),
                json!({"chunk_id": "c2", "text": "t", "metadata": "oops"}),
            ],
        };
        let records = records_from_document(&doc);
        let meta = records[0].metadata();
        assert_eq!(meta["page_number"], MetadataValue::Int(2));
        assert_eq!(meta["authors"], MetadataValue::Text("A, B".into()));
        assert_eq!(meta["bbox"], MetadataValue::Text("{\"x\":1}".into()));
        assert!(records[1].metadata().is_empty());
    }

    #[test]
    fn load_records_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(
            dir.path(),
            "a.chunks.json",
            &json!({"source": "a.pdf", "chunks": [{"chunk_id": "a1", "text": "x"}]}),
        );
        let b = write(
            dir.path(),
            "b.chunks.json",
            &json!({"source": "b.pdf", "chunks": [{"chunk_id": "b1", "text": "y"},
                                                  {"chunk_id": "b2", "text": "z"}]}),
        );
        let records = load_records(&[b, a]).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b1", "b2", "a1"]);
        assert_eq!(records[2].source(), "a.pdf");
    }
}
