use crate::domain::ports::{Mutation, StorageBackend};
use crate::error::StorageError;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column families created on open, one per entity collection.
pub const COLLECTIONS: [&str; 3] = ["campaigns", "donations", "users"];

/// A persistent document store backed by RocksDB.
///
/// Each collection lives in its own column family. Writes that depend on the
/// current value (`insert`, `modify`) go through `write_lock` so two
/// read-modify-write cycles never interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbBackend {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLLECTIONS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, collection: &'static str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(collection)
            .ok_or_else(|| StorageError::Backend(format!("column family `{collection}` not found")))
    }
}

#[async_trait]
impl StorageBackend for RocksDbBackend {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    async fn insert(&self, collection: &'static str, id: &str, doc: Vec<u8>) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(collection)?;
        if self.db.get_pinned_cf(cf, id)?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, id, doc)?;
        Ok(true)
    }

    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(collection)?;
        Ok(self.db.get_cf(cf, id)?)
    }

    async fn remove(&self, collection: &'static str, id: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(collection)?;
        if self.db.get_pinned_cf(cf, id)?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(cf, id)?;
        Ok(true)
    }

    async fn scan(&self, collection: &'static str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let cf = self.cf(collection)?;
        let mut docs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = String::from_utf8(key.into_vec())
                .map_err(|e| StorageError::Backend(format!("non UTF-8 key in `{collection}`: {e}")))?;
            docs.push((id, value.into_vec()));
        }
        Ok(docs)
    }

    async fn modify(
        &self,
        collection: &'static str,
        id: &str,
        mutate: Mutation<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(collection)?;
        let Some(current) = self.db.get_cf(cf, id)? else {
            return Ok(None);
        };
        let updated = mutate(current.as_slice())?;
        self.db.put_cf(cf, id, &updated)?;
        Ok(Some(updated))
    }
}
