//! In-memory [`SessionStore`] for tests and embedding in other hosts.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`; nothing survives the process.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::SessionDescriptor;

use super::{SessionArtifacts, SessionStore};

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionArtifacts>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, SessionArtifacts>>> {
        self.sessions
            .read()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, SessionArtifacts>>> {
        self.sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, session_id: &str, artifacts: &SessionArtifacts) -> Result<()> {
        self.write()?
            .insert(session_id.to_string(), artifacts.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionArtifacts>> {
        Ok(self.read()?.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.write()?.remove(session_id).is_some())
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(session_id))
    }

    async fn descriptor(&self, session_id: &str) -> Result<Option<SessionDescriptor>> {
        Ok(self
            .read()?
            .get(session_id)
            .map(|a| a.descriptor.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use crate::models::Chunk;

    fn artifacts(session_id: &str) -> SessionArtifacts {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        SessionArtifacts {
            index,
            chunks: vec![Chunk {
                chunk_id: 0,
                text: "hello".into(),
                token_count: 1,
            }],
            descriptor: SessionDescriptor {
                session_id: session_id.into(),
                num_chunks: 1,
                embedding_model: "test".into(),
                index_dimension: 2,
                created_at: chrono::Utc::now(),
                source_file: None,
                source_sha256: None,
            },
        }
    }

    #[tokio::test]
    async fn put_get_delete_cycle() {
        let store = InMemorySessionStore::new();
        assert!(!store.exists("s1").await.unwrap());

        let stored = artifacts("s1");
        store.put("s1", &stored).await.unwrap();
        assert!(store.exists("s1").await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), Some(stored));
        assert_eq!(store.descriptor("s1").await.unwrap().unwrap().num_chunks, 1);

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
    }
}
