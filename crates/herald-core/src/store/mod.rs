//! Record registries and artifact persistence.
//!
//! - [`Repository`]: in-memory registry keyed by id. Every write replaces the stored
//!   `Arc<T>` as a whole, so a reader holding a record never observes a half-applied update.
//! - [`artifacts`]: the [`ArtifactStore`] contract for generated report payloads, with an
//!   in-memory and a `SQLite` backend.

pub mod artifacts;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

pub use artifacts::{ArtifactStore, MemoryArtifactStore, SqliteArtifactStore};

/// Errors raised by artifact storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored metadata for '{key}' is invalid: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// A record that can live in a [`Repository`].
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Concurrent id-keyed registry with copy-then-swap updates.
pub struct Repository<T: Record> {
    records: DashMap<String, Arc<T>>,
}

impl<T: Record> Repository<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Returns a point-in-time copy of every record handle.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<T>> {
        self.records.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> Vec<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Inserts a record only if its id is unused.
    ///
    /// Returns `false` when a record with the same id already exists.
    #[must_use]
    pub fn insert_new(&self, record: T) -> bool {
        match self.records.entry(record.id().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(record));
                true
            }
        }
    }

    /// Inserts or replaces a record, returning the previous version.
    pub fn upsert(&self, record: T) -> Option<Arc<T>> {
        self.records.insert(record.id().to_string(), Arc::new(record))
    }

    /// Clones the current record, applies `apply` to the copy and swaps it in.
    ///
    /// The shard lock is held for the duration of `apply`, so concurrent updates to the same
    /// id are serialized. Returns the new version, or `None` if the id is unknown.
    pub fn update<F>(&self, id: &str, apply: F) -> Option<Arc<T>>
    where
        F: FnOnce(&mut T),
    {
        let mut entry = self.records.get_mut(id)?;
        let mut next = T::clone(entry.value());
        apply(&mut next);
        let next = Arc::new(next);
        *entry.value_mut() = Arc::clone(&next);
        Some(next)
    }

    /// Like [`update`](Self::update), but leaves the stored record untouched when `apply`
    /// fails.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `apply`.
    pub fn try_update<F, E>(&self, id: &str, apply: F) -> Result<Option<Arc<T>>, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
    {
        let Some(mut entry) = self.records.get_mut(id) else {
            return Ok(None);
        };
        let mut next = T::clone(entry.value());
        apply(&mut next)?;
        let next = Arc::new(next);
        *entry.value_mut() = Arc::clone(&next);
        Ok(Some(next))
    }

    pub fn delete(&self, id: &str) -> Option<Arc<T>> {
        self.records.remove(id).map(|(_, record)| record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Record> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}
