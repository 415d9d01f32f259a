//! Filesystem [`SessionStore`]: one directory per session.
//!
//! ```text
//! <root>/<session_id>/index.bin     flat index (see crate::index)
//! <root>/<session_id>/chunks.json   ordered Vec<Chunk>
//! <root>/<session_id>/session.json  SessionDescriptor
//! ```
//!
//! `put` writes all three files into a staging directory next to the
//! session and renames it into place, so readers see either the previous
//! complete session or the new one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::index::FlatIndex;
use crate::models::{Chunk, SessionDescriptor};

use super::{validate_session_id, SessionArtifacts, SessionStore};

pub const INDEX_FILE: &str = "index.bin";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const DESCRIPTOR_FILE: &str = "session.json";

pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    async fn write_artifacts(dir: &Path, artifacts: &SessionArtifacts) -> Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(INDEX_FILE), artifacts.index.to_bytes()).await?;
        tokio::fs::write(
            dir.join(CHUNKS_FILE),
            serde_json::to_vec(&artifacts.chunks)?,
        )
        .await?;
        tokio::fs::write(
            dir.join(DESCRIPTOR_FILE),
            serde_json::to_vec_pretty(&artifacts.descriptor)?,
        )
        .await?;
        Ok(())
    }
}

async fn path_exists(path: &Path) -> Result<bool> {
    Ok(tokio::fs::try_exists(path).await?)
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn put(&self, session_id: &str, artifacts: &SessionArtifacts) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create storage root {}", self.root.display()))?;

        let staging = self
            .root
            .join(format!(".staging-{}-{}", session_id, uuid::Uuid::new_v4()));
        if let Err(e) = Self::write_artifacts(&staging, artifacts).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e.context(format!("Failed to write session {}", session_id)));
        }

        // Move any previous build aside first; rename cannot replace a
        // non-empty directory.
        let retired = if path_exists(&dir).await? {
            let retired = self
                .root
                .join(format!(".retired-{}-{}", session_id, uuid::Uuid::new_v4()));
            tokio::fs::rename(&dir, &retired).await?;
            Some(retired)
        } else {
            None
        };

        if let Err(e) = tokio::fs::rename(&staging, &dir).await {
            if let Some(retired) = &retired {
                let _ = tokio::fs::rename(retired, &dir).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(anyhow::Error::from(e)
                .context(format!("Failed to move session {} into place", session_id)));
        }

        if let Some(retired) = retired {
            if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "could not remove replaced session");
            }
        }
        debug!(session_id, dir = %dir.display(), "session written");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionArtifacts>> {
        if !self.exists(session_id).await? {
            return Ok(None);
        }
        let dir = self.session_dir(session_id)?;

        let index_bytes = tokio::fs::read(dir.join(INDEX_FILE)).await?;
        let index = FlatIndex::from_bytes(&index_bytes)
            .with_context(|| format!("Corrupt index for session {}", session_id))?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&tokio::fs::read(dir.join(CHUNKS_FILE)).await?)
            .with_context(|| format!("Corrupt chunk list for session {}", session_id))?;
        let descriptor = match self.descriptor(session_id).await? {
            Some(d) => d,
            None => SessionDescriptor {
                session_id: session_id.to_string(),
                num_chunks: chunks.len(),
                embedding_model: String::new(),
                index_dimension: index.dims(),
                created_at: chrono::Utc::now(),
                source_file: None,
                source_sha256: None,
            },
        };

        Ok(Some(SessionArtifacts {
            index,
            chunks,
            descriptor,
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let dir = self.session_dir(session_id)?;
        if !path_exists(&dir).await? {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to delete {}", dir.display()))?;
        Ok(true)
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        let dir = self.session_dir(session_id)?;
        Ok(path_exists(&dir.join(INDEX_FILE)).await? && path_exists(&dir.join(CHUNKS_FILE)).await?)
    }

    async fn descriptor(&self, session_id: &str) -> Result<Option<SessionDescriptor>> {
        let path = self.session_dir(session_id)?.join(DESCRIPTOR_FILE);
        if !path_exists(&path).await? {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path).await?;
        let descriptor = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt descriptor {}", path.display()))?;
        Ok(Some(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifacts(session_id: &str, texts: &[&str]) -> SessionArtifacts {
        let mut index = FlatIndex::new(2);
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                index.add(&[i as f32, 1.0]).unwrap();
                Chunk {
                    chunk_id: i,
                    text: t.to_string(),
                    token_count: 1,
                }
            })
            .collect::<Vec<_>>();
        SessionArtifacts {
            index,
            descriptor: SessionDescriptor {
                session_id: session_id.into(),
                num_chunks: chunks.len(),
                embedding_model: "test-model".into(),
                index_dimension: 2,
                created_at: chrono::Utc::now(),
                source_file: Some("notes.txt".into()),
                source_sha256: None,
            },
            chunks,
        }
    }

    #[tokio::test]
    async fn writes_three_artifacts_and_reads_them_back() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path());
        let stored = artifacts("abc", &["one", "two"]);
        store.put("abc", &stored).await.unwrap();

        let dir = tmp.path().join("abc");
        for f in [INDEX_FILE, CHUNKS_FILE, DESCRIPTOR_FILE] {
            assert!(dir.join(f).is_file(), "{} missing", f);
        }
        let info: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join(DESCRIPTOR_FILE)).unwrap()).unwrap();
        assert_eq!(info["num_chunks"], 2);
        assert_eq!(info["embedding_model"], "test-model");
        assert_eq!(info["index_dimension"], 2);

        assert_eq!(store.get("abc").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn put_replaces_previous_session_and_leaves_no_staging() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path());
        store.put("s", &artifacts("s", &["old"])).await.unwrap();
        store.put("s", &artifacts("s", &["new", "newer"])).await.unwrap();

        let loaded = store.get("s").await.unwrap().unwrap();
        assert_eq!(loaded.chunks.len(), 2);
        assert_eq!(loaded.chunks[0].text, "new");

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["s".to_string()]);
    }

    #[tokio::test]
    async fn exists_requires_index_and_chunks() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path());
        assert!(!store.exists("nope").await.unwrap());

        store.put("s", &artifacts("s", &["a"])).await.unwrap();
        std::fs::remove_file(tmp.path().join("s").join(CHUNKS_FILE)).unwrap();
        assert!(!store.exists("s").await.unwrap());
        assert!(store.get("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path());
        store.put("s", &artifacts("s", &["a"])).await.unwrap();
        assert!(store.delete("s").await.unwrap());
        assert!(!store.delete("s").await.unwrap());
        assert!(!tmp.path().join("s").exists());
    }

    #[tokio::test]
    async fn corrupt_index_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path());
        store.put("s", &artifacts("s", &["a"])).await.unwrap();
        std::fs::write(tmp.path().join("s").join(INDEX_FILE), b"garbage").unwrap();
        assert!(store.get("s").await.is_err());
    }

    #[tokio::test]
    async fn traversal_ids_never_touch_the_filesystem() {
        let tmp = TempDir::new().unwrap();
        let store = FsSessionStore::new(tmp.path().join("root"));
        assert!(store.delete("..").await.is_err());
        assert!(store.exists("../x").await.is_err());
        assert!(tmp.path().exists());
    }
}
