//! Storage adapters behind the domain ports.

pub mod in_memory;
pub mod repository;
pub mod resource_manager;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
