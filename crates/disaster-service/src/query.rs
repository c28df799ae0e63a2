//! Similarity query service.
//!
//! Free text is embedded and matched against stored event embeddings:
//!
//! ```text
//! ReceiveText -> Embed -> QueryStore -> RankedResult
//!      \           \          \
//!       +-----------+----------+-> Failed
//! ```
//!
//! Each request is independent. There are no retries and no partial
//! results; both capability calls run on blocking threads.

use std::fmt;
use std::sync::Arc;

use disaster_embeddings::EmbeddingModel;
use disaster_storage::EventStore;
use disaster_types::ScoredEvent;
use tracing::debug;

use crate::error::ServiceError;

/// Default number of results, as served by `/get_similar_disasters`
pub const DEFAULT_TOP_K: usize = 3;

/// Request lifecycle states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    ReceiveText,
    Embed,
    QueryStore,
    RankedResult,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::ReceiveText => "receive_text",
            QueryState::Embed => "embed",
            QueryState::QueryStore => "query_store",
            QueryState::RankedResult => "ranked_result",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(from: QueryState, to: QueryState) -> QueryState {
    debug!(from = %from, to = %to, "Similarity query transition");
    to
}

pub struct SimilarityQueryService {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EventStore>,
    top_k: usize,
}

impl SimilarityQueryService {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn EventStore>,
        top_k: usize,
    ) -> Result<Self, ServiceError> {
        if top_k == 0 {
            return Err(ServiceError::Validation("top_k must be at least 1".to_string()));
        }
        if embedder.dimension() != store.dimension() {
            return Err(ServiceError::Validation(format!(
                "embedder produces {} dimensions, store expects {}",
                embedder.dimension(),
                store.dimension()
            )));
        }
        Ok(Self {
            embedder,
            store,
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Up to `top_k` stored events ranked by similarity to `description`.
    pub async fn find_similar(&self, description: &str) -> Result<Vec<ScoredEvent>, ServiceError> {
        self.find_similar_k(description, self.top_k).await
    }

    /// Same as [`find_similar`](Self::find_similar) with an explicit `k`.
    pub async fn find_similar_k(
        &self,
        description: &str,
        k: usize,
    ) -> Result<Vec<ScoredEvent>, ServiceError> {
        let mut state = QueryState::ReceiveText;

        let text = description.trim();
        if text.is_empty() {
            transition(state, QueryState::Failed);
            return Err(ServiceError::Validation(
                "description must not be empty".to_string(),
            ));
        }
        if k == 0 {
            transition(state, QueryState::Failed);
            return Err(ServiceError::Validation("k must be at least 1".to_string()));
        }

        state = transition(state, QueryState::Embed);
        let embedder = Arc::clone(&self.embedder);
        let owned = text.to_string();
        let embedded = tokio::task::spawn_blocking(move || embedder.embed(&owned)).await;
        let query = match embedded {
            Ok(Ok(embedding)) => embedding.into_vec(),
            Ok(Err(e)) => {
                transition(state, QueryState::Failed);
                return Err(e.into());
            }
            Err(e) => {
                transition(state, QueryState::Failed);
                return Err(e.into());
            }
        };

        state = transition(state, QueryState::QueryStore);
        let store = Arc::clone(&self.store);
        let searched =
            tokio::task::spawn_blocking(move || store.nearest_by_embedding(&query, k)).await;
        let ranked = match searched {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => {
                transition(state, QueryState::Failed);
                return Err(ServiceError::StoreUnavailable(e.to_string()));
            }
            Err(e) => {
                transition(state, QueryState::Failed);
                return Err(e.into());
            }
        };

        transition(state, QueryState::RankedResult);
        debug!(results = ranked.len(), k, "Similarity query answered");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use disaster_embeddings::{HashEmbedder, MockEmbedder};
    use disaster_storage::{
        EventStore, InsertReport, RocksEventStore, StorageError, StoreConfig, StoreStats,
    };
    use disaster_types::{DisasterType, Event, EventFilter, Geometry};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Store whose column families have gone away.
    struct BrokenStore;

    fn gone() -> StorageError {
        StorageError::ColumnFamilyNotFound("events".to_string())
    }

    impl EventStore for BrokenStore {
        fn dimension(&self) -> usize {
            2
        }
        fn insert_many(&self, _events: Vec<Event>) -> Result<InsertReport, StorageError> {
            Err(gone())
        }
        fn insert_one(&self, _event: Event) -> Result<String, StorageError> {
            Err(gone())
        }
        fn find_all(&self, _filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
            Err(gone())
        }
        fn nearest_by_embedding(
            &self,
            _query: &[f32],
            _k: usize,
        ) -> Result<Vec<ScoredEvent>, StorageError> {
            Err(gone())
        }
        fn get(&self, _id: &str) -> Result<Option<Event>, StorageError> {
            Err(gone())
        }
        fn stats(&self) -> Result<StoreStats, StorageError> {
            Err(gone())
        }
        fn rebuild_index(&self) -> Result<usize, StorageError> {
            Err(gone())
        }
        fn flush(&self) -> Result<(), StorageError> {
            Err(gone())
        }
        fn put_checkpoint(&self, _job_name: &str, _bytes: &[u8]) -> Result<(), StorageError> {
            Err(gone())
        }
        fn get_checkpoint(&self, _job_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Err(gone())
        }
    }

    fn store(temp: &TempDir) -> Arc<RocksEventStore> {
        Arc::new(RocksEventStore::open(&temp.path().join("db"), StoreConfig::new(2)).unwrap())
    }

    fn event(label: &str, embedding: Vec<f32>) -> Event {
        Event::new(
            DisasterType::Flood,
            Geometry::point(78.0, 22.0),
            Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
            0.85,
            "satellite",
        )
        .with_description(label)
        .with_embedding(embedding)
    }

    #[tokio::test]
    async fn test_empty_description_never_embeds() {
        let temp = TempDir::new().unwrap();
        let embedder = Arc::new(MockEmbedder::new(2));
        let service = SimilarityQueryService::new(embedder.clone(), store(&temp), 3).unwrap();

        for text in ["", "   \n"] {
            let result = service.find_similar(text).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_ranks_by_cosine() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .insert_many(vec![
                event("event1", vec![1.0, 0.0]),
                event("event2", vec![0.0, 1.0]),
                event("event3", vec![0.9, 0.1]),
            ])
            .unwrap();
        let embedder = Arc::new(MockEmbedder::new(2).with_vector("river flood", vec![1.0, 0.0]));
        let service = SimilarityQueryService::new(embedder, store, 3).unwrap();

        let ranked = service.find_similar("river flood").await.unwrap();
        let labels: Vec<&str> = ranked
            .iter()
            .map(|s| s.event.description.as_deref().unwrap())
            .collect();
        assert_eq!(labels, vec!["event1", "event3", "event2"]);
        assert!(ranked[0].score >= ranked[1].score && ranked[1].score >= ranked[2].score);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .insert_many((0..5).map(|i| event(&format!("e{}", i), vec![1.0, i as f32])).collect())
            .unwrap();
        let service =
            SimilarityQueryService::new(Arc::new(MockEmbedder::new(2)), store, 3).unwrap();

        assert_eq!(service.find_similar("flood").await.unwrap().len(), 3);
        assert_eq!(service.find_similar_k("flood", 10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_upstream() {
        let temp = TempDir::new().unwrap();
        let embedder = Arc::new(MockEmbedder::new(2));
        embedder.set_failing(true);
        let service = SimilarityQueryService::new(embedder, store(&temp), 3).unwrap();

        let result = service.find_similar("flooded fields").await;
        assert!(matches!(result, Err(ServiceError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_store_unavailable() {
        let embedder = Arc::new(MockEmbedder::new(2));
        let service =
            SimilarityQueryService::new(embedder.clone(), Arc::new(BrokenStore), 3).unwrap();

        let result = service.find_similar("flooded fields").await;
        match result {
            Err(ServiceError::StoreUnavailable(msg)) => assert!(msg.contains("events")),
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
        assert_eq!(embedder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_symbol_only_description_is_answered() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.insert_one(event("event1", vec![1.0, 0.0])).unwrap();
        let service =
            SimilarityQueryService::new(Arc::new(HashEmbedder::new(2).unwrap()), store, 3)
                .unwrap();

        assert_eq!(service.find_similar("???").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let temp = TempDir::new().unwrap();
        let service =
            SimilarityQueryService::new(Arc::new(MockEmbedder::new(2)), store(&temp), 3).unwrap();
        assert!(service.find_similar("anything").await.unwrap().is_empty());
    }

    #[test]
    fn test_rejects_mismatched_dimension() {
        let temp = TempDir::new().unwrap();
        let result = SimilarityQueryService::new(Arc::new(MockEmbedder::new(3)), store(&temp), 3);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(QueryState::QueryStore.to_string(), "query_store");
        assert_eq!(QueryState::RankedResult.to_string(), "ranked_result");
    }
}
