//! Per-session embedding index.
//!
//! [`VectorIndex`] turns a session's chunks into an L2-normalised
//! [`FlatIndex`] via an [`EmbeddingProvider`], persists it through a
//! [`SessionStore`], and answers top-k similarity queries against it.
//!
//! Build failures are typed [`IndexError`]s and leave any previously
//! stored session untouched. Query-time failures (no index for the
//! session, corrupt artifacts, an embedding error) are logged and
//! surface as an empty result list.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::error::IndexError;
use crate::index::{normalize_l2, FlatIndex};
use crate::models::{Chunk, Document, SearchHit, SessionDescriptor};
use crate::store::fs::FsSessionStore;
use crate::store::{validate_session_id, SessionArtifacts, SessionStore};

pub struct VectorIndex {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    building: Mutex<HashSet<String>>,
}

/// Marks a session as being built; released on drop.
struct BuildGuard<'a> {
    building: &'a Mutex<HashSet<String>>,
    session_id: String,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        lock_ignoring_poison(self.building).remove(&self.session_id);
    }
}

fn lock_ignoring_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            batch_size: batch_size.max(1),
            building: Mutex::new(HashSet::new()),
        }
    }

    /// Filesystem store under `storage.root` and the configured provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Ok(Self::new(
            Arc::new(FsSessionStore::new(&config.storage.root)),
            Arc::from(provider),
            config.embedding.batch_size,
        ))
    }

    /// Embed `chunks` and store them as the index for `session_id`,
    /// replacing any previous index for that session.
    pub async fn index(
        &self,
        chunks: &[Chunk],
        session_id: &str,
    ) -> Result<SessionDescriptor, IndexError> {
        self.build(chunks, session_id, None).await
    }

    /// [`index`](Self::index) for chunks of `document`, recording its file
    /// name and content hash in the descriptor.
    pub async fn index_document(
        &self,
        chunks: &[Chunk],
        document: &Document,
    ) -> Result<SessionDescriptor, IndexError> {
        let source = (document.file_name.clone(), document.sha256());
        self.build(chunks, &document.session_id, Some(source)).await
    }

    fn acquire(&self, session_id: &str) -> Result<BuildGuard<'_>, IndexError> {
        let mut building = lock_ignoring_poison(&self.building);
        if !building.insert(session_id.to_string()) {
            return Err(IndexError::SessionBusy(session_id.to_string()));
        }
        Ok(BuildGuard {
            building: &self.building,
            session_id: session_id.to_string(),
        })
    }

    async fn build(
        &self,
        chunks: &[Chunk],
        session_id: &str,
        source: Option<(String, String)>,
    ) -> Result<SessionDescriptor, IndexError> {
        validate_session_id(session_id)?;
        if chunks.is_empty() {
            return Err(IndexError::NoChunks);
        }
        let _guard = self.acquire(session_id)?;

        let dims = self.provider.dims();
        let total_batches = chunks.len().div_ceil(self.batch_size);
        let mut index = FlatIndex::new(dims);

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            info!(
                session_id,
                "embedding batch {}/{} ({} chunks)",
                i + 1,
                total_batches,
                batch.len()
            );
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.provider.embed(&texts).await.map_err(|e| {
                IndexError::EmbeddingBuildFailed(format!(
                    "batch {}/{}: {:#}",
                    i + 1,
                    total_batches,
                    e
                ))
            })?;

            if vectors.len() != texts.len() {
                return Err(IndexError::EmbeddingBuildFailed(format!(
                    "batch {}/{}: expected {} embeddings, got {}",
                    i + 1,
                    total_batches,
                    texts.len(),
                    vectors.len()
                )));
            }
            for mut vector in vectors {
                if vector.len() != dims {
                    return Err(IndexError::EmbeddingBuildFailed(format!(
                        "batch {}/{}: embedding has {} dimensions, expected {}",
                        i + 1,
                        total_batches,
                        vector.len(),
                        dims
                    )));
                }
                normalize_l2(&mut vector);
                index
                    .add(&vector)
                    .map_err(|e| IndexError::EmbeddingBuildFailed(e.to_string()))?;
            }
        }

        let (source_file, source_sha256) = match source {
            Some((file, sha)) => (Some(file), Some(sha)),
            None => (None, None),
        };
        let descriptor = SessionDescriptor {
            session_id: session_id.to_string(),
            num_chunks: chunks.len(),
            embedding_model: self.provider.model_name().to_string(),
            index_dimension: dims,
            created_at: Utc::now(),
            source_file,
            source_sha256,
        };
        let artifacts = SessionArtifacts {
            index,
            chunks: chunks.to_vec(),
            descriptor: descriptor.clone(),
        };
        self.store
            .put(session_id, &artifacts)
            .await
            .map_err(IndexError::Storage)?;

        info!(
            session_id,
            chunks = descriptor.num_chunks,
            dims,
            "saved session index"
        );
        Ok(descriptor)
    }

    /// Top-`k` chunks of `session_id` most similar to `query`.
    ///
    /// Never fails: problems are logged and yield an empty list.
    pub async fn search(&self, query: &str, session_id: &str, k: usize) -> Vec<SearchHit> {
        match self.try_search(query, session_id, k).await {
            Ok(hits) => {
                info!(session_id, results = hits.len(), "search complete");
                hits
            }
            Err(e) => {
                warn!(session_id, error = %e, "search failed, returning no results");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, session_id: &str, k: usize) -> Result<Vec<SearchHit>> {
        validate_session_id(session_id)?;
        let Some(artifacts) = self.store.get(session_id).await? else {
            info!(session_id, "no index for session");
            return Ok(Vec::new());
        };
        debug!(
            session_id,
            vectors = artifacts.index.len(),
            chunks = artifacts.chunks.len(),
            "loaded session index"
        );
        if k == 0 || artifacts.index.is_empty() {
            return Ok(Vec::new());
        }
        if artifacts.index.len() != artifacts.chunks.len() {
            warn!(
                session_id,
                vectors = artifacts.index.len(),
                chunks = artifacts.chunks.len(),
                "index and chunk list disagree; unmatched positions are skipped"
            );
        }

        let mut query_vec = embed_query(self.provider.as_ref(), query).await?;
        normalize_l2(&mut query_vec);
        let scored = artifacts.index.search(&query_vec, k)?;

        Ok(scored
            .into_iter()
            .filter_map(|(pos, score)| artifacts.chunks.get(pos).map(|c| (c.clone(), score)))
            .enumerate()
            .map(|(i, (chunk, similarity_score))| SearchHit {
                chunk,
                similarity_score,
                rank: i + 1,
            })
            .collect())
    }

    /// Remove a session's artifacts. `true` if something was deleted.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        if let Err(e) = validate_session_id(session_id) {
            warn!(error = %e, "refusing to delete session");
            return false;
        }
        match self.store.delete(session_id).await {
            Ok(deleted) => {
                if deleted {
                    info!(session_id, "deleted session");
                }
                deleted
            }
            Err(e) => {
                warn!(session_id, error = %e, "failed to delete session");
                false
            }
        }
    }

    /// Whether both the index and the chunk list exist for `session_id`.
    pub async fn session_exists(&self, session_id: &str) -> bool {
        if validate_session_id(session_id).is_err() {
            return false;
        }
        self.store.exists(session_id).await.unwrap_or_else(|e| {
            warn!(session_id, error = %e, "could not check session");
            false
        })
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionDescriptor> {
        if validate_session_id(session_id).is_err() {
            return None;
        }
        match self.store.descriptor(session_id).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(session_id, error = %e, "could not read session descriptor");
                None
            }
        }
    }
}
