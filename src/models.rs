//! Core data models that flow through the retrieval pipeline.
//!
//! A [`Document`] is extracted to plain text, split into [`Chunk`]s, and
//! indexed per session. Queries return ranked [`SearchHit`]s; every
//! persisted session carries a [`SessionDescriptor`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ExtractError;

/// Declared document type. Only these four are accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Doc,
    Txt,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Doc => "doc",
            DocumentType::Txt => "txt",
        }
    }

    /// Infer the type from a file name's extension.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ExtractError::UnsupportedFormat(path.display().to_string()))?;
        ext.parse()
    }
}

impl FromStr for DocumentType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "docx" => Ok(DocumentType::Docx),
            "doc" => Ok(DocumentType::Doc),
            "txt" => Ok(DocumentType::Txt),
            _ => Err(ExtractError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file, bound to the session it was uploaded into.
#[derive(Debug, Clone)]
pub struct Document {
    pub session_id: String,
    pub file_name: String,
    pub declared_type: DocumentType,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn from_bytes(
        session_id: &str,
        file_name: &str,
        declared_type: DocumentType,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            declared_type,
            bytes,
        }
    }

    /// Read a document from disk, inferring its type from the extension
    /// unless `declared_type` is given.
    pub async fn from_path(
        session_id: &str,
        path: &Path,
        declared_type: Option<DocumentType>,
    ) -> anyhow::Result<Self> {
        let declared_type = match declared_type {
            Some(t) => t,
            None => DocumentType::from_path(path)?,
        };
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::from_bytes(session_id, &file_name, declared_type, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Size in megabytes, rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        let mb = self.bytes.len() as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    }

    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// The atomic retrievable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based emission index.
    pub chunk_id: usize,
    pub text: String,
    /// Length of the tokenizer's encoding of `text`.
    pub token_count: usize,
}

/// One retrieved chunk with its similarity and 1-based rank.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Inner product of normalised vectors, roughly `[-1, 1]`.
    pub similarity_score: f32,
    pub rank: usize,
}

/// Small JSON descriptor stored next to every session index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub num_chunks: usize,
    pub embedding_model: String,
    pub index_dimension: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub source_sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declared_types_case_insensitively() {
        assert_eq!("PDF".parse::<DocumentType>().unwrap(), DocumentType::Pdf);
        assert_eq!(".docx".parse::<DocumentType>().unwrap(), DocumentType::Docx);
        assert_eq!("doc".parse::<DocumentType>().unwrap(), DocumentType::Doc);
        assert_eq!(" txt ".parse::<DocumentType>().unwrap(), DocumentType::Txt);
    }

    #[test]
    fn rejects_unknown_types() {
        let err = "xlsx".parse::<DocumentType>().unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(ref t) if t == "xlsx"));
        assert!(DocumentType::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn type_from_path_extension() {
        let t = DocumentType::from_path(Path::new("/tmp/report.Pdf")).unwrap();
        assert_eq!(t, DocumentType::Pdf);
    }

    #[test]
    fn size_mb_rounds_to_two_decimals() {
        let doc = Document::from_bytes("s1", "a.txt", DocumentType::Txt, vec![0u8; 1_572_864]);
        assert_eq!(doc.size(), 1_572_864);
        assert_eq!(doc.size_mb(), 1.5);
    }

    #[test]
    fn descriptor_tolerates_missing_optional_fields() {
        let json = r#"{
            "session_id": "abc",
            "num_chunks": 3,
            "embedding_model": "text-embedding-3-small",
            "index_dimension": 1536,
            "created_at": "2024-05-01T12:00:00Z"
        }"#;
        let d: SessionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.num_chunks, 3);
        assert!(d.source_file.is_none());
    }
}
