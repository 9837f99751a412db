//! Document and chunk value types shared across the pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A source document as supplied by the caller
///
/// Immutable once ingested; removed by id. Metadata values are scalars
/// (string, number, bool) used for exact-match filtering at search time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique id within a corpus
    pub id: String,

    /// Full document text
    pub content: String,

    /// Caller-supplied metadata, copied onto every derived chunk
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    /// Create a document with a generated UUID id
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Create a document with an explicit id
    pub fn with_id(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata key/value pair
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Short preview of the content (first `max_chars` characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let cut: String = self.content.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

/// A retrievable unit of text derived from a document
///
/// The id is derived from the parent id and the chunk index, so re-chunking
/// the same document always produces the same ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk id: `<document_id>::<index>`
    pub id: String,

    /// Id of the parent document
    pub document_id: String,

    /// Zero-based position among the document's chunks
    pub index: usize,

    /// Byte offset of the chunk content in the parent document
    pub offset: usize,

    /// Chunk text
    pub content: String,
}

impl Chunk {
    /// Build a chunk, deriving its id from parent id and index
    pub fn new(
        document_id: impl Into<String>,
        index: usize,
        offset: usize,
        content: impl Into<String>,
    ) -> Self {
        let document_id = document_id.into();
        Self {
            id: chunk_id(&document_id, index),
            document_id,
            index,
            offset,
            content: content.into(),
        }
    }
}

/// Derive the chunk id for a (document, index) pair
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}::{}", document_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_derivation() {
        let chunk = Chunk::new("doc-1", 3, 120, "text");
        assert_eq!(chunk.id, "doc-1::3");
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.index, 3);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Document::new("a");
        let b = Document::new("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let doc = Document::with_id("d", "重要信息：宝藏在山顶");
        assert_eq!(doc.preview(4), "重要信息...");
        assert_eq!(doc.preview(100), "重要信息：宝藏在山顶");
    }
}
