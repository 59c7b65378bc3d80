use crate::domain::ports::{Mutation, StorageBackend};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Vec<u8>>;

/// A thread-safe in-memory document store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same data. `modify` holds the
/// write lock for the whole read-modify-write, which serializes concurrent
/// credits to the same campaign.
#[derive(Default, Clone)]
pub struct InMemoryBackend {
    collections: Arc<RwLock<HashMap<&'static str, Collection>>>,
}

impl InMemoryBackend {
    /// Creates a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn insert(&self, collection: &'static str, id: &str, doc: Vec<u8>) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), doc);
        Ok(true)
    }

    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn remove(&self, collection: &'static str, id: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn scan(&self, collection: &'static str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().map(|(id, doc)| (id.clone(), doc.clone())).collect())
            .unwrap_or_default())
    }

    async fn modify(
        &self,
        collection: &'static str,
        id: &str,
        mutate: Mutation<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        let updated = mutate(doc.as_slice())?;
        *doc = updated.clone();
        Ok(Some(updated))
    }
}
