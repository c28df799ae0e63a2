//! Storage layer for disaster-watch.
//!
//! Provides RocksDB-backed event persistence with:
//! - Column family isolation for documents, id lookups, schema and checkpoints
//! - Sequence keys whose byte order equals insertion order
//! - Atomic per-document writes via WriteBatch
//! - Similarity lookup through a `disaster-vector` index keyed by sequence

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod store;

pub use db::Storage;
pub use error::StorageError;
pub use keys::{CheckpointKey, EventIdKey, EventKey};
pub use store::{
    EventStore, InsertFailure, InsertReport, RocksEventStore, StoreConfig, StoreStats,
    DEFAULT_NUM_CANDIDATES,
};
