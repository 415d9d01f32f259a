//! Upload pipeline orchestration.
//!
//! Coordinates the full flow for one uploaded file: size check →
//! extraction → chunking → embedding → storage. Extraction and chunking
//! are CPU/IO bound and run on the blocking pool so async hosts stay
//! responsive.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::error::IngestError;
use crate::extract::Extractor;
use crate::models::{Chunk, Document, SessionDescriptor};
use crate::vector_store::VectorIndex;

/// Summary of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub descriptor: SessionDescriptor,
    pub chars_extracted: usize,
    pub total_tokens: usize,
}

pub struct Pipeline {
    extractor: Arc<Extractor>,
    chunker: Arc<Chunker>,
    index: Arc<VectorIndex>,
    max_file_size_mb: u64,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<Extractor>,
        chunker: Arc<Chunker>,
        index: Arc<VectorIndex>,
        max_file_size_mb: u64,
    ) -> Self {
        Self {
            extractor,
            chunker,
            index,
            max_file_size_mb,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(Extractor::from_config(&config.extraction)),
            Arc::new(Chunker::from_config(&config.chunking)?),
            Arc::new(VectorIndex::from_config(config)?),
            config.extraction.max_file_size_mb,
        ))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn check_size(&self, doc: &Document) -> Result<(), IngestError> {
        let limit_bytes = self.max_file_size_mb.saturating_mul(1024 * 1024);
        if doc.size() as u64 > limit_bytes {
            return Err(IngestError::FileTooLarge {
                size_mb: doc.size_mb(),
                limit_mb: self.max_file_size_mb,
            });
        }
        Ok(())
    }

    pub async fn extract(&self, doc: &Document) -> Result<String, IngestError> {
        let extractor = self.extractor.clone();
        let bytes = doc.bytes.clone();
        let doc_type = doc.declared_type;
        let text =
            tokio::task::spawn_blocking(move || extractor.extract_text(&bytes, doc_type)).await??;
        Ok(text)
    }

    pub async fn chunk(&self, text: String) -> Result<Vec<Chunk>, IngestError> {
        let chunker = self.chunker.clone();
        Ok(tokio::task::spawn_blocking(move || chunker.chunk(&text)).await?)
    }

    /// Run the whole pipeline, replacing the session's index on success.
    pub async fn ingest(&self, doc: &Document) -> Result<IngestReport, IngestError> {
        self.check_size(doc)?;
        info!(
            session_id = %doc.session_id,
            file = %doc.file_name,
            doc_type = %doc.declared_type,
            size_mb = doc.size_mb(),
            "processing upload"
        );

        let text = self.extract(doc).await?;
        let chars_extracted = text.chars().count();
        if text.trim().is_empty() {
            warn!(file = %doc.file_name, "no text could be extracted");
        }

        let chunks = self.chunk(text).await?;
        let total_tokens = chunks.iter().map(|c| c.token_count).sum();
        info!(
            file = %doc.file_name,
            chunks = chunks.len(),
            total_tokens,
            "chunked document"
        );

        let descriptor = self.index.index_document(&chunks, doc).await?;
        Ok(IngestReport {
            descriptor,
            chars_extracted,
            total_tokens,
        })
    }
}
