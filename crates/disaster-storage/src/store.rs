//! Event store: validated writes, structural listing and similarity lookup.
//!
//! Documents live in RocksDB keyed by insertion sequence. Embeddings are
//! mirrored into a [`VectorIndex`] keyed by the same sequence, so the
//! sequence doubles as the tie-breaker for equal similarity scores.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use disaster_embeddings::cosine_similarity;
use disaster_types::{Event, EventFilter, ScoredEvent, Settings, VectorBackend};
use disaster_vector::{open_index, IndexStats, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::db::Storage;
use crate::error::StorageError;

/// Candidate count requested from approximate indexes before re-ranking
pub const DEFAULT_NUM_CANDIDATES: usize = 100;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Embedding dimension every stored embedding must have
    pub dimension: usize,
    pub backend: VectorBackend,
    /// Directory for the persisted HNSW index
    pub index_path: PathBuf,
    pub num_candidates: usize,
}

impl StoreConfig {
    /// Flat-index configuration for the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            backend: VectorBackend::Flat,
            index_path: PathBuf::from("./vector-index"),
            num_candidates: DEFAULT_NUM_CANDIDATES,
        }
    }

    pub fn with_backend(mut self, backend: VectorBackend, index_path: impl Into<PathBuf>) -> Self {
        self.backend = backend;
        self.index_path = index_path.into();
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dimension: settings.embedding.dimension,
            backend: settings.vector.backend,
            index_path: settings.expanded_vector_index_path(),
            num_candidates: settings.vector.num_candidates,
        }
    }
}

/// A document `insert_many` refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub reason: String,
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertReport {
    /// Ids of stored events, in submission order
    pub inserted_ids: Vec<String>,
    pub failures: Vec<InsertFailure>,
}

impl InsertReport {
    pub fn inserted(&self) -> usize {
        self.inserted_ids.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub event_count: u64,
    /// Events carrying an embedding
    pub embedded_count: u64,
    pub dimension: usize,
    pub index: IndexStats,
    pub disk_usage_bytes: u64,
}

/// Persistence boundary shared by ingestion, detection and queries.
///
/// Implementations are synchronous; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait EventStore: Send + Sync {
    /// Embedding dimension this store accepts.
    fn dimension(&self) -> usize;

    /// Validate and insert each event independently.
    ///
    /// Rejected documents are reported in [`InsertReport::failures`];
    /// `Err` means the store itself failed.
    fn insert_many(&self, events: Vec<Event>) -> Result<InsertReport, StorageError>;

    /// Insert a single event, returning its id. A rejected document is an error.
    fn insert_one(&self, event: Event) -> Result<String, StorageError>;

    /// Events matching `filter`, in insertion order.
    fn find_all(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError>;

    /// The `k` embedded events most similar to `query`, best first.
    fn nearest_by_embedding(&self, query: &[f32], k: usize)
        -> Result<Vec<ScoredEvent>, StorageError>;

    fn get(&self, id: &str) -> Result<Option<Event>, StorageError>;

    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Clear the vector index and re-add every stored embedding.
    /// Returns the number of vectors indexed.
    fn rebuild_index(&self) -> Result<usize, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;

    fn put_checkpoint(&self, job_name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn get_checkpoint(&self, job_name: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// RocksDB-backed [`EventStore`].
pub struct RocksEventStore {
    storage: Storage,
    index: RwLock<Box<dyn VectorIndex>>,
    config: StoreConfig,
}

impl RocksEventStore {
    /// Open the store at `path`.
    ///
    /// The first open records `config.dimension`; later opens with a
    /// different dimension fail with [`StorageError::SchemaMismatch`].
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, StorageError> {
        let storage = Storage::open(path)?;

        match storage.embedding_dimension()? {
            Some(stored) if stored != config.dimension => {
                return Err(StorageError::SchemaMismatch {
                    stored,
                    configured: config.dimension,
                });
            }
            Some(_) => {}
            None => storage.put_embedding_dimension(config.dimension)?,
        }

        let index = open_index(config.backend, config.dimension, &config.index_path)?;
        let store = Self {
            storage,
            index: RwLock::new(index),
            config,
        };

        let embedded = store.embedded_count()?;
        let indexed = store.read_index()?.len() as u64;
        if indexed != embedded {
            info!(indexed, embedded, "Vector index out of date, rebuilding");
            store.rebuild_index()?;
        }

        info!(
            dimension = store.config.dimension,
            backend = ?store.config.backend,
            embedded,
            "Event store opened"
        );
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Trigger manual compaction of the underlying database.
    pub fn compact(&self) -> Result<(), StorageError> {
        self.storage.compact()
    }

    fn read_index(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, Box<dyn VectorIndex>>, StorageError> {
        self.index.read().map_err(|_| StorageError::Poisoned)
    }

    fn embedded_count(&self) -> Result<u64, StorageError> {
        let mut count = 0u64;
        self.storage.scan_events(|_, bytes| {
            if Event::from_bytes(bytes)?.embedding.is_some() {
                count += 1;
            }
            Ok(true)
        })?;
        Ok(count)
    }

    /// Document-level checks applied before any write.
    fn check_event(&self, event: &Event) -> Result<(), StorageError> {
        event
            .validate()
            .map_err(|e| StorageError::InvalidEvent(e.to_string()))?;
        if let Some(embedding) = &event.embedding {
            if embedding.len() != self.config.dimension {
                return Err(StorageError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: embedding.len(),
                });
            }
        }
        Ok(())
    }

    /// Write one validated event and index its embedding.
    ///
    /// Caller holds the index write lock, which keeps sequence order equal
    /// to write order across threads.
    fn write_event(
        &self,
        index: &mut Box<dyn VectorIndex>,
        mut event: Event,
    ) -> Result<String, StorageError> {
        let ulid = Ulid::new();
        let id = ulid.to_string();
        event.id = Some(id.clone());

        let bytes = event.to_bytes()?;
        let sequence = self.storage.next_sequence();
        self.storage.put_event(sequence, ulid, &bytes)?;

        if let Some(embedding) = &event.embedding {
            index.add(sequence, embedding)?;
        }
        debug!(id = %id, sequence, "Inserted event");
        Ok(id)
    }

    fn load(&self, sequence: u64) -> Result<Option<Event>, StorageError> {
        match self.storage.get_event(sequence)? {
            Some(bytes) => Ok(Some(Event::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// An invalid document is a per-item failure; anything else is the store failing.
fn is_document_error(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::InvalidEvent(_) | StorageError::DimensionMismatch { .. }
    )
}

impl EventStore for RocksEventStore {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn insert_many(&self, events: Vec<Event>) -> Result<InsertReport, StorageError> {
        let mut report = InsertReport::default();
        let mut index = self.index.write().map_err(|_| StorageError::Poisoned)?;

        for (i, event) in events.into_iter().enumerate() {
            if let Err(e) = self.check_event(&event) {
                if !is_document_error(&e) {
                    return Err(e);
                }
                warn!(index = i, error = %e, "Rejected event");
                report.failures.push(InsertFailure {
                    index: i,
                    reason: e.to_string(),
                });
                continue;
            }
            let id = self.write_event(&mut index, event)?;
            report.inserted_ids.push(id);
        }

        info!(
            inserted = report.inserted(),
            failed = report.failed(),
            "Batch insert complete"
        );
        Ok(report)
    }

    fn insert_one(&self, event: Event) -> Result<String, StorageError> {
        self.check_event(&event)?;
        let mut index = self.index.write().map_err(|_| StorageError::Poisoned)?;
        self.write_event(&mut index, event)
    }

    fn find_all(&self, filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut events = Vec::new();
        if limit == 0 {
            return Ok(events);
        }

        self.storage.scan_events(|_, bytes| {
            let event = Event::from_bytes(bytes)?;
            if filter.matches(&event) {
                events.push(event);
            }
            Ok(events.len() < limit)
        })?;

        debug!(count = events.len(), "find_all complete");
        Ok(events)
    }

    fn nearest_by_embedding(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEvent>, StorageError> {
        if query.len() != self.config.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(StorageError::InvalidQuery(
                "query embedding must be finite".to_string(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = {
            let index = self.read_index()?;
            let fetch = if index.is_exact() {
                k
            } else {
                k.max(self.config.num_candidates)
            };
            index.search(query, fetch)?
        };

        // Re-score from the stored embedding so approximate indexes still
        // yield an exact order; ties fall back to insertion sequence.
        let mut ranked: Vec<(u64, ScoredEvent)> = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(event) = self.load(hit.vector_id)? else {
                warn!(sequence = hit.vector_id, "Index refers to a missing event");
                continue;
            };
            let Some(embedding) = &event.embedding else {
                continue;
            };
            let score = cosine_similarity(query, embedding);
            ranked.push((hit.vector_id, ScoredEvent { event, score }));
        }
        ranked.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score.total_cmp(&a.score).then_with(|| seq_a.cmp(seq_b))
        });
        ranked.truncate(k);

        debug!(k, found = ranked.len(), "Nearest search complete");
        Ok(ranked.into_iter().map(|(_, scored)| scored).collect())
    }

    fn get(&self, id: &str) -> Result<Option<Event>, StorageError> {
        match self.storage.sequence_for_id(id)? {
            Some(sequence) => self.load(sequence),
            None => Ok(None),
        }
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let mut event_count = 0u64;
        let mut embedded_count = 0u64;
        self.storage.scan_events(|_, bytes| {
            event_count += 1;
            if Event::from_bytes(bytes)?.embedding.is_some() {
                embedded_count += 1;
            }
            Ok(true)
        })?;

        Ok(StoreStats {
            event_count,
            embedded_count,
            dimension: self.config.dimension,
            index: self.read_index()?.stats(),
            disk_usage_bytes: self.storage.disk_usage(),
        })
    }

    fn rebuild_index(&self) -> Result<usize, StorageError> {
        let mut index = self.index.write().map_err(|_| StorageError::Poisoned)?;
        index.clear()?;

        let mut vectors = Vec::new();
        self.storage.scan_events(|sequence, bytes| {
            if let Some(embedding) = Event::from_bytes(bytes)?.embedding {
                if embedding.len() == self.config.dimension {
                    vectors.push((sequence, embedding));
                } else {
                    warn!(sequence, len = embedding.len(), "Skipping embedding with stale dimension");
                }
            }
            Ok(true)
        })?;

        index.add_batch(&vectors)?;
        index.save()?;
        info!(vectors = vectors.len(), "Rebuilt vector index");
        Ok(vectors.len())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.storage.flush()?;
        self.read_index()?.save()?;
        Ok(())
    }

    fn put_checkpoint(&self, job_name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.storage.put_checkpoint(job_name, bytes)
    }

    fn get_checkpoint(&self, job_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.storage.get_checkpoint(job_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use disaster_types::{BoundingBox, DisasterType, Geometry};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_test_store(dimension: usize) -> (RocksEventStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store =
            RocksEventStore::open(&temp_dir.path().join("db"), StoreConfig::new(dimension)).unwrap();
        (store, temp_dir)
    }

    fn flood(lon: f64, lat: f64) -> Event {
        Event::new(
            DisasterType::Flood,
            Geometry::point(lon, lat),
            Utc.with_ymd_and_hms(2026, 7, 14, 6, 0, 0).unwrap(),
            0.85,
            "satellite",
        )
    }

    fn embedded(label: &str, embedding: Vec<f32>) -> Event {
        flood(78.0, 22.0)
            .with_description(label)
            .with_embedding(embedding)
    }

    fn labels(results: &[ScoredEvent]) -> Vec<String> {
        results
            .iter()
            .map(|r| r.event.description.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_insert_many_and_find_all() {
        let (store, _temp) = create_test_store(2);
        let report = store
            .insert_many(vec![flood(70.0, 10.0), flood(80.0, 20.0), flood(90.0, 30.0)])
            .unwrap();

        assert_eq!(report.inserted(), 3);
        assert!(report.failures.is_empty());

        let all = store.find_all(&EventFilter::new()).unwrap();
        assert_eq!(all.len(), 3);
        let ids: Vec<String> = all.iter().filter_map(|e| e.id.clone()).collect();
        assert_eq!(ids, report.inserted_ids);
    }

    #[test]
    fn test_find_all_filters_and_limits() {
        let (store, _temp) = create_test_store(2);
        let fire = Event::new(
            DisasterType::Fire,
            Geometry::point(75.0, 15.0),
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            0.5,
            "classifier",
        );
        store
            .insert_many(vec![flood(70.0, 10.0), fire, flood(90.0, 30.0)])
            .unwrap();

        let floods = store
            .find_all(&EventFilter::new().with_type(DisasterType::Flood))
            .unwrap();
        assert_eq!(floods.len(), 2);

        let bbox = BoundingBox::new(69.0, 9.0, 76.0, 16.0).unwrap();
        let in_box = store.find_all(&EventFilter::new().with_bbox(bbox)).unwrap();
        assert_eq!(in_box.len(), 2);

        let limited = store.find_all(&EventFilter::new().with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].location, Geometry::point(70.0, 10.0));
    }

    #[test]
    fn test_invalid_documents_are_reported() {
        let (store, _temp) = create_test_store(2);
        let mut bad_confidence = flood(70.0, 10.0);
        bad_confidence.confidence = 1.5;
        let wrong_dim = flood(70.0, 10.0).with_embedding(vec![1.0, 0.0, 0.0]);

        let report = store
            .insert_many(vec![bad_confidence, flood(80.0, 20.0), wrong_dim])
            .unwrap();

        assert_eq!(report.inserted(), 1);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![0, 2]);
        assert_eq!(store.find_all(&EventFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_one_rejects_invalid() {
        let (store, _temp) = create_test_store(2);
        let mut event = flood(70.0, 10.0);
        event.source = " ".to_string();
        assert!(matches!(
            store.insert_one(event),
            Err(StorageError::InvalidEvent(_))
        ));

        let id = store.insert_one(flood(70.0, 10.0)).unwrap();
        let fetched = store.get(&id).unwrap().unwrap();
        assert_eq!(fetched.id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_nearest_ranks_by_cosine() {
        let (store, _temp) = create_test_store(2);
        store
            .insert_many(vec![
                embedded("event1", vec![1.0, 0.0]),
                embedded("event2", vec![0.0, 1.0]),
                embedded("event3", vec![0.9, 0.1]),
            ])
            .unwrap();

        let results = store.nearest_by_embedding(&[1.0, 0.0], 3).unwrap();
        assert_eq!(labels(&results), vec!["event1", "event3", "event2"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[1].score > results[2].score);
    }

    #[test]
    fn test_nearest_ties_keep_insertion_order() {
        let (store, _temp) = create_test_store(2);
        store
            .insert_many(vec![
                embedded("first", vec![1.0, 0.0]),
                embedded("second", vec![2.0, 0.0]),
                embedded("third", vec![0.5, 0.0]),
            ])
            .unwrap();

        let results = store.nearest_by_embedding(&[1.0, 0.0], 2).unwrap();
        assert_eq!(labels(&results), vec!["first", "second"]);
    }

    #[test]
    fn test_nearest_excludes_unembedded_and_clamps_k() {
        let (store, _temp) = create_test_store(2);
        store
            .insert_many(vec![
                flood(70.0, 10.0),
                embedded("a", vec![0.0, 1.0]),
                flood(71.0, 11.0),
                embedded("b", vec![1.0, 1.0]),
            ])
            .unwrap();

        let results = store.nearest_by_embedding(&[1.0, 0.0], 10).unwrap();
        assert_eq!(labels(&results), vec!["b", "a"]);
        assert!(store.nearest_by_embedding(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_rejects_bad_query() {
        let (store, _temp) = create_test_store(2);
        assert!(matches!(
            store.nearest_by_embedding(&[1.0, 0.0, 0.0], 3),
            Err(StorageError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            store.nearest_by_embedding(&[f32::NAN, 0.0], 3),
            Err(StorageError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_reopen_rebuilds_flat_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db");
        {
            let store = RocksEventStore::open(&path, StoreConfig::new(2)).unwrap();
            store
                .insert_many(vec![
                    embedded("east", vec![1.0, 0.0]),
                    embedded("north", vec![0.0, 1.0]),
                ])
                .unwrap();
            store.flush().unwrap();
        }

        let store = RocksEventStore::open(&path, StoreConfig::new(2)).unwrap();
        let results = store.nearest_by_embedding(&[0.0, 1.0], 1).unwrap();
        assert_eq!(labels(&results), vec!["north"]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.embedded_count, 2);
        assert_eq!(stats.index.vector_count, 2);
    }

    #[test]
    fn test_dimension_change_refuses_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db");
        drop(RocksEventStore::open(&path, StoreConfig::new(2)).unwrap());

        let result = RocksEventStore::open(&path, StoreConfig::new(384));
        assert!(matches!(
            result,
            Err(StorageError::SchemaMismatch { stored: 2, configured: 384 })
        ));
    }

    #[test]
    fn test_rebuild_index_counts_embedded() {
        let (store, _temp) = create_test_store(2);
        store
            .insert_many(vec![
                embedded("a", vec![1.0, 0.0]),
                flood(70.0, 10.0),
                embedded("b", vec![0.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(store.rebuild_index().unwrap(), 2);
        assert_eq!(store.nearest_by_embedding(&[1.0, 0.0], 5).unwrap().len(), 2);
    }

    #[test]
    fn test_hnsw_backend_reranks_exactly() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new(2)
            .with_backend(VectorBackend::Hnsw, temp_dir.path().join("index"));
        let store = RocksEventStore::open(&temp_dir.path().join("db"), config).unwrap();
        store
            .insert_many(vec![
                embedded("event1", vec![1.0, 0.0]),
                embedded("event2", vec![0.0, 1.0]),
                embedded("event3", vec![0.9, 0.1]),
            ])
            .unwrap();

        let results = store.nearest_by_embedding(&[1.0, 0.0], 3).unwrap();
        assert_eq!(labels(&results), vec!["event1", "event3", "event2"]);
    }

    #[test]
    fn test_checkpoints_roundtrip() {
        let (store, _temp) = create_test_store(2);
        store.put_checkpoint("ingestion", b"{\"inserted\":1}").unwrap();
        assert_eq!(
            store.get_checkpoint("ingestion").unwrap(),
            Some(b"{\"inserted\":1}".to_vec())
        );
    }
}
