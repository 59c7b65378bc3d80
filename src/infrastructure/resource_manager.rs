use super::in_memory::InMemoryBackend;
use super::repository::DocumentRepository;
use crate::domain::campaign::Campaign;
use crate::domain::donation::DonationRecord;
use crate::domain::ports::{BackendHandle, RepositoryBox, StorageBackend};
use crate::domain::user::User;
use std::sync::Arc;

/// The one storage handle of a process.
///
/// Built once at startup and passed explicitly to whatever needs
/// repositories. Cloning is cheap and every clone talks to the same backend.
#[derive(Clone)]
pub struct ResourceManager {
    backend: BackendHandle,
}

impl ResourceManager {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_handle(backend: BackendHandle) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryBackend::new())
    }

    /// Opens (or creates) a RocksDB store at `path`.
    #[cfg(feature = "storage-rocksdb")]
    pub fn open_rocksdb<P: AsRef<std::path::Path>>(path: P) -> Result<Self, crate::error::StorageError> {
        Ok(Self::new(super::rocksdb::RocksDbBackend::open(path)?))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> BackendHandle {
        self.backend.clone()
    }

    pub fn campaigns(&self) -> RepositoryBox<Campaign> {
        Arc::new(DocumentRepository::<Campaign>::new(self.backend.clone()))
    }

    pub fn donations(&self) -> RepositoryBox<DonationRecord> {
        Arc::new(DocumentRepository::<DonationRecord>::new(self.backend.clone()))
    }

    pub fn users(&self) -> RepositoryBox<User> {
        Arc::new(DocumentRepository::<User>::new(self.backend.clone()))
    }
}
