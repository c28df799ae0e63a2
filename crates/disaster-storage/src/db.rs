//! RocksDB wrapper for disaster-watch storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Atomic event writes (document + id lookup in one WriteBatch)
//! - Single-key and full-scan reads in insertion order
//! - Schema metadata and job checkpoints

use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use ulid::Ulid;

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_CHECKPOINTS, CF_EVENTS, CF_EVENT_IDS, CF_META,
};
use crate::error::StorageError;
use crate::keys::{
    decode_sequence, encode_sequence, CheckpointKey, EventIdKey, EventKey,
    META_EMBEDDING_DIMENSION,
};

/// Low-level storage interface
pub struct Storage {
    db: DB,
    /// Next insertion sequence
    sequence: AtomicU64,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!(path = ?path, "Opening storage");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Universal compaction suits the append-only workload.
        db_opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        let sequence = Self::load_next_sequence(&db)?;
        debug!(next_sequence = sequence, "Storage opened");

        Ok(Self {
            db,
            sequence: AtomicU64::new(sequence),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Sequence after the highest stored event key
    fn load_next_sequence(db: &DB) -> Result<u64, StorageError> {
        let cf = db
            .cf_handle(CF_EVENTS)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_EVENTS.to_string()))?;

        let mut iter = db.iterator_cf(cf, IteratorMode::End);
        if let Some(result) = iter.next() {
            let (key, _) = result?;
            return Ok(EventKey::from_bytes(&key)?.sequence + 1);
        }
        Ok(0)
    }

    /// Reserve the next insertion sequence
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Store an event document and its id lookup atomically.
    pub fn put_event(
        &self,
        sequence: u64,
        ulid: Ulid,
        event_bytes: &[u8],
    ) -> Result<EventKey, StorageError> {
        let events_cf = self.cf(CF_EVENTS)?;
        let ids_cf = self.cf(CF_EVENT_IDS)?;

        let key = EventKey::new(sequence);
        let mut batch = WriteBatch::default();
        batch.put_cf(events_cf, key.to_bytes(), event_bytes);
        batch.put_cf(ids_cf, EventIdKey::new(ulid).to_bytes(), encode_sequence(sequence));
        self.db.write(batch)?;

        debug!(sequence, id = %ulid, "Stored event");
        Ok(key)
    }

    /// Get an event document by sequence
    pub fn get_event(&self, sequence: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_EVENTS)?;
        Ok(self.db.get_cf(cf, EventKey::new(sequence).to_bytes())?)
    }

    /// Resolve a public event id to its sequence
    pub fn sequence_for_id(&self, event_id: &str) -> Result<Option<u64>, StorageError> {
        let cf = self.cf(CF_EVENT_IDS)?;
        let key = EventIdKey::parse(event_id)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(decode_sequence(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Visit every event document in insertion order.
    ///
    /// The visitor returns `false` to stop early.
    pub fn scan_events<F>(&self, mut visit: F) -> Result<(), StorageError>
    where
        F: FnMut(u64, &[u8]) -> Result<bool, StorageError>,
    {
        let cf = self.cf(CF_EVENTS)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = EventKey::from_bytes(&key)?;
            if !visit(key.sequence, &value)? {
                break;
            }
        }
        Ok(())
    }

    /// Stored embedding dimension, if one was recorded
    pub fn embedding_dimension(&self) -> Result<Option<usize>, StorageError> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(cf, META_EMBEDDING_DIMENSION)? {
            Some(bytes) => {
                let s = String::from_utf8_lossy(&bytes);
                let dim = s
                    .parse::<usize>()
                    .map_err(|e| StorageError::Serialization(format!("dimension '{}': {}", s, e)))?;
                Ok(Some(dim))
            }
            None => Ok(None),
        }
    }

    pub fn put_embedding_dimension(&self, dimension: usize) -> Result<(), StorageError> {
        let cf = self.cf(CF_META)?;
        self.db
            .put_cf(cf, META_EMBEDDING_DIMENSION, dimension.to_string())?;
        Ok(())
    }

    /// Store a checkpoint for a background job
    pub fn put_checkpoint(&self, job_name: &str, checkpoint_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        self.db
            .put_cf(cf, CheckpointKey::new(job_name).to_bytes(), checkpoint_bytes)?;
        Ok(())
    }

    /// Get a background job checkpoint
    pub fn get_checkpoint(&self, job_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        Ok(self.db.get_cf(cf, CheckpointKey::new(job_name).to_bytes())?)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            self.db.flush_cf(self.cf(cf_name)?)?;
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction");
        for cf_name in ALL_CF_NAMES {
            self.db
                .compact_range_cf::<&[u8], &[u8]>(self.cf(cf_name)?, None, None);
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Number of stored event documents
    pub fn event_count(&self) -> Result<u64, StorageError> {
        let mut count = 0u64;
        self.scan_events(|_, _| {
            count += 1;
            Ok(true)
        })?;
        Ok(count)
    }

    /// Total size of files in the database directory
    pub fn disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}
