//! # docqa
//!
//! Retrieval core for question answering over uploaded documents.
//!
//! An uploaded PDF, Word, or plain-text file is turned into plain text
//! (with OCR for scanned PDF pages), split into overlapping token-bounded
//! chunks, embedded, and stored as a per-session vector index. Queries
//! against a session return the most similar chunks, ranked.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ Document │──▶│ Extractor │──▶│ Chunker  │──▶│ VectorIndex  │
//! │ pdf/docx │   │ +OCR      │   │ sentences│   │ embed+store  │
//! └──────────┘   └───────────┘   └──────────┘   └──────┬───────┘
//!                                                      │
//!                                   ┌──────────────────┤
//!                                   ▼                  ▼
//!                             ┌──────────┐      ┌──────────────┐
//!                             │ search() │      │ SessionStore │
//!                             │ top-k    │      │ fs / memory  │
//!                             └──────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest report.pdf --session 42     # extract, chunk, embed, store
//! docqa search "payment terms" --session 42 -k 5
//! docqa info --session 42
//! docqa delete --session 42
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Typed errors for extraction, indexing, ingest |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX/TXT text extraction with OCR fallback |
//! | [`tokenize`] | Sentence segmentation and BPE tokenization |
//! | [`chunk`] | Sentence-based, token-bounded chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat inner-product vector index |
//! | [`store`] | Session artifact persistence |
//! | [`vector_store`] | Per-session index build and search |
//! | [`ingest`] | Upload pipeline orchestration |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod store;
pub mod tokenize;
pub mod vector_store;
