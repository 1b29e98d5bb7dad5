//! Artifact store wrappers with injected failures.

use std::collections::HashSet;

use async_trait::async_trait;
use herald_core::{
    report::GeneratedReportArtifact,
    store::{ArtifactStore, MemoryArtifactStore, StoreError},
};
use parking_lot::RwLock;

/// In-memory store whose writes fail for selected definitions and whose deletes can be
/// switched off entirely.
#[derive(Default)]
pub struct SelectiveFailingStore {
    inner: MemoryArtifactStore,
    failing_definitions: RwLock<HashSet<String>>,
    fail_deletes: RwLock<bool>,
}

impl SelectiveFailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `put` for `definition_id` fail.
    pub fn fail_writes_for(&self, definition_id: &str) {
        self.failing_definitions.write().insert(definition_id.to_string());
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write() = fail;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for SelectiveFailingStore {
    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        meta: &GeneratedReportArtifact,
    ) -> Result<(), StoreError> {
        if self.failing_definitions.read().contains(&meta.definition_id) {
            return Err(StoreError::Unavailable("disk quota exceeded".to_string()));
        }
        self.inner.put(key, payload, meta).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if *self.fail_deletes.read() {
            return Err(StoreError::Unavailable("bucket is read-only".to_string()));
        }
        self.inner.delete(key).await
    }

    async fn load_index(&self) -> Result<Vec<GeneratedReportArtifact>, StoreError> {
        self.inner.load_index().await
    }
}
