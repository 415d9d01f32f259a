//! Error taxonomy for the retrieval core.
//!
//! Extraction and index-build failures are hard errors surfaced to the
//! caller. Query-time failures never appear here: [`VectorIndex::search`]
//! degrades them to an empty result set instead.
//!
//! [`VectorIndex::search`]: crate::vector_store::VectorIndex::search

use thiserror::Error;

/// Failure to turn a document into plain text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Declared type is not one of `pdf`, `docx`, `doc`, `txt`.
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Parse or I/O failure after every fallback strategy was exhausted.
    #[error("extraction failed: {reason}")]
    ExtractionFailed {
        reason: String,
        #[source]
        source: anyhow::Error,
    },

    /// No encoding in the priority list could decode the text file.
    #[error("could not decode text file with any supported encoding")]
    UndecodableText,
}

impl ExtractError {
    pub(crate) fn failed(reason: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ExtractError::ExtractionFailed {
            reason: reason.into(),
            source: source.into(),
        }
    }
}

/// Failure to build or manage a session index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// An embedding batch errored or returned malformed vectors. Nothing was persisted.
    #[error("embedding build failed: {0}")]
    EmbeddingBuildFailed(String),

    #[error("no chunks provided for embedding")]
    NoChunks,

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Another build for the same session is still running.
    #[error("session {0} is already being indexed")]
    SessionBusy(String),

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Failure of the upload pipeline (load → extract → chunk → index).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("file is {size_mb:.2} MB, limit is {limit_mb} MB")]
    FileTooLarge { size_mb: f64, limit_mb: u64 },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
