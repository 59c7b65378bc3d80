use crate::error::StorageError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::sync::Arc;

/// Read-modify-write callback handed to [`StorageBackend::modify`].
pub type Mutation<'a> = &'a mut (dyn FnMut(&[u8]) -> Result<Vec<u8>, StorageError> + Send);

/// Raw document store shared by every repository.
///
/// Documents are opaque bytes grouped by collection. A backend guarantees
/// atomicity of a single document write; `modify` in particular must not
/// interleave with another `modify` on the same document.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inserts a new document. Returns `false` without writing if the id is taken.
    async fn insert(&self, collection: &'static str, id: &str, doc: Vec<u8>) -> Result<bool, StorageError>;

    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns `true` if a document was removed.
    async fn remove(&self, collection: &'static str, id: &str) -> Result<bool, StorageError>;

    /// Point-in-time copy of a collection in key order.
    async fn scan(&self, collection: &'static str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Atomically replaces a document with `mutate(current)`. `None` if absent.
    async fn modify(
        &self,
        collection: &'static str,
        id: &str,
        mutate: Mutation<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError>;
}

pub type BackendHandle = Arc<dyn StorageBackend>;

/// A persisted aggregate with a string id and a typed partial update.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    type Patch: Send + Sync;

    fn id(&self) -> &str;
    fn assign_id(&mut self, id: String);
    fn apply(&mut self, patch: &Self::Patch);
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Filter, sort and limit for [`Repository::find_all`].
pub struct FindQuery<T> {
    filter: Option<Predicate<T>>,
    sort: Option<Comparator<T>>,
    limit: Option<usize>,
}

impl<T> Default for FindQuery<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            limit: None,
        }
    }
}

impl<T> FindQuery<T> {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    pub fn sort_by(mut self, compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        self.sort = Some(Box::new(compare));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entity: &T) -> bool {
        self.filter.as_ref().is_none_or(|f| f(entity))
    }

    pub fn is_sorted(&self) -> bool {
        self.sort.is_some()
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.sort.as_ref().map_or(Ordering::Equal, |cmp| cmp(a, b))
    }

    pub fn max_results(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}

/// Lazily decoded results of a single `find_all` call. Calling `find_all`
/// again starts a fresh iteration.
pub type EntityIter<T> = Box<dyn Iterator<Item = Result<T, StorageError>> + Send>;

/// Typed CRUD over one entity type. No business rules live here.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Stores `entity`, generating an id when it has none. Returns the id.
    async fn create(&self, entity: T) -> Result<String, StorageError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StorageError>;

    async fn find_all(&self, query: FindQuery<T>) -> Result<EntityIter<T>, StorageError>;

    /// Applies `patch` atomically. `None` if no entity has that id; never creates.
    async fn update(&self, id: &str, patch: T::Patch) -> Result<Option<T>, StorageError>;

    /// Idempotent: `false` if there was nothing to delete.
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    async fn count(&self, query: FindQuery<T>) -> Result<usize, StorageError> {
        let mut total = 0;
        for entity in self.find_all(query).await? {
            entity?;
            total += 1;
        }
        Ok(total)
    }
}

pub type RepositoryBox<T> = Arc<dyn Repository<T>>;
