//! Session artifact storage.
//!
//! The [`SessionStore`] trait persists everything a session needs for
//! retrieval (vector index, ordered chunks, descriptor) as one unit, so
//! the vector store never sees a half-written session. Backends:
//!
//! - [`fs::FsSessionStore`]: one directory per session under a root.
//! - [`memory::InMemorySessionStore`]: `RwLock<HashMap>`, for tests and
//!   hosts that manage their own persistence.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod fs;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::IndexError;
use crate::index::FlatIndex;
use crate::models::{Chunk, SessionDescriptor};

const MAX_SESSION_ID_LEN: usize = 128;

/// Everything persisted for one session. Index position `i` is `chunks[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionArtifacts {
    pub index: FlatIndex,
    pub chunks: Vec<Chunk>,
    pub descriptor: SessionDescriptor,
}

/// Abstract per-session storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](SessionStore::put) | Atomically replace a session's artifacts |
/// | [`get`](SessionStore::get) | Load all artifacts, `None` if absent |
/// | [`delete`](SessionStore::delete) | Remove a session; `true` if it existed |
/// | [`exists`](SessionStore::exists) | Index and chunks are both present |
/// | [`descriptor`](SessionStore::descriptor) | Read only the descriptor |
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, session_id: &str, artifacts: &SessionArtifacts) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionArtifacts>>;

    async fn delete(&self, session_id: &str) -> Result<bool>;

    async fn exists(&self, session_id: &str) -> Result<bool>;

    async fn descriptor(&self, session_id: &str) -> Result<Option<SessionDescriptor>>;
}

/// Session ids become directory names: ASCII alphanumerics, `-` and `_`,
/// 1 to 128 characters.
pub fn validate_session_id(session_id: &str) -> Result<(), IndexError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidSessionId(session_id.to_string()))
    }
}
