use crate::domain::ports::{BackendHandle, Entity, EntityIter, FindQuery, Repository};
use crate::error::StorageError;
use async_trait::async_trait;
use std::marker::PhantomData;

/// `Repository<T>` over any [`StorageBackend`](crate::domain::ports::StorageBackend),
/// storing each entity as a JSON document in `T::COLLECTION`.
pub struct DocumentRepository<T> {
    backend: BackendHandle,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> DocumentRepository<T> {
    pub fn new(backend: BackendHandle) -> Self {
        Self {
            backend,
            _entity: PhantomData,
        }
    }

    fn decode(bytes: &[u8]) -> Result<T, StorageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for DocumentRepository<T> {
    async fn create(&self, mut entity: T) -> Result<String, StorageError> {
        if entity.id().is_empty() {
            entity.assign_id(uuid::Uuid::new_v4().simple().to_string());
        }
        let id = entity.id().to_string();
        let doc = serde_json::to_vec(&entity)?;
        if !self.backend.insert(T::COLLECTION, &id, doc).await? {
            return Err(StorageError::Duplicate {
                collection: T::COLLECTION,
                id,
            });
        }
        Ok(id)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError> {
        self.backend
            .get(T::COLLECTION, id)
            .await?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    async fn find_all(&self, query: FindQuery<T>) -> Result<EntityIter<T>, StorageError> {
        let docs = self.backend.scan(T::COLLECTION).await?;
        let limit = query.max_results();

        if query.is_sorted() {
            let mut matched = Vec::new();
            for (_, bytes) in &docs {
                let entity = Self::decode(bytes)?;
                if query.matches(&entity) {
                    matched.push(entity);
                }
            }
            matched.sort_by(|a, b| query.compare(a, b));
            matched.truncate(limit);
            return Ok(Box::new(matched.into_iter().map(Ok)));
        }

        let iter = docs
            .into_iter()
            .map(|(_, bytes)| Self::decode(&bytes))
            .filter(move |decoded| match decoded {
                Ok(entity) => query.matches(entity),
                Err(_) => true,
            })
            .take(limit);
        Ok(Box::new(iter))
    }

    async fn update(&self, id: &str, patch: T::Patch) -> Result<Option<T>, StorageError> {
        let mut updated: Option<T> = None;
        let mut mutate = |bytes: &[u8]| -> Result<Vec<u8>, StorageError> {
            let mut entity = Self::decode(bytes)?;
            entity.apply(&patch);
            let doc = serde_json::to_vec(&entity)?;
            updated = Some(entity);
            Ok(doc)
        };
        let written = self.backend.modify(T::COLLECTION, id, &mut mutate).await?;
        Ok(written.and(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.backend.remove(T::COLLECTION, id).await
    }
}
