//! Remote document store seam.
//!
//! Every stored document carries a version that increases on each write.
//! `replace_if_version` is the compare-and-swap the transaction helper is
//! built on; it is the only way documents change after creation.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use super::error::StoreError;

/// A type stored as one document in a named collection.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const COLLECTION: &'static str;

    fn document_id(&self) -> &str;
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub document: T,
}

#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError>;

    /// Create at version 1. Returns false if the id is already taken.
    async fn insert(&self, document: &T) -> Result<bool, StoreError>;

    /// Replace only if the stored version still equals `expected_version`.
    /// Returns false when another writer got there first or the document is gone.
    async fn replace_if_version(
        &self,
        id: &str,
        expected_version: u64,
        document: &T,
    ) -> Result<bool, StoreError>;

    /// Returns false if nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<T>, StoreError>;
}

/// In-process store for tests and offline runs.
pub struct MemoryDocumentStore<T> {
    documents: Mutex<HashMap<String, Versioned<T>>>,
}

impl<T> Default for MemoryDocumentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryDocumentStore<T> {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Versioned<T>>>, StoreError> {
        self.documents
            .lock()
            .map_err(|e| StoreError::Internal(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MemoryDocumentStore<T> {
    async fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn insert(&self, document: &T) -> Result<bool, StoreError> {
        let mut documents = self.lock()?;
        let id = document.document_id();
        if documents.contains_key(id) {
            return Ok(false);
        }
        documents.insert(
            id.to_string(),
            Versioned {
                version: 1,
                document: document.clone(),
            },
        );
        Ok(true)
    }

    async fn replace_if_version(
        &self,
        id: &str,
        expected_version: u64,
        document: &T,
    ) -> Result<bool, StoreError> {
        let mut documents = self.lock()?;
        match documents.get_mut(id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.document = document.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .map(|v| v.document.clone())
            .collect())
    }
}
