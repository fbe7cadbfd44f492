//! Adapters implementing the domain ports.

pub mod clock;
pub mod in_memory;
pub mod notifier;
pub mod provider;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
