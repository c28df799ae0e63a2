//! Shared handler state.

use std::sync::Arc;

use disaster_embeddings::EmbeddingModel;
use disaster_ingest::DisasterClassifier;
use disaster_scheduler::JobRegistry;
use disaster_storage::EventStore;
use disaster_types::Settings;

use crate::detect::DetectionService;
use crate::error::ServiceError;
use crate::ingest::IngestionTrigger;
use crate::query::SimilarityQueryService;

/// Everything the HTTP handlers need, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub query: Arc<SimilarityQueryService>,
    pub detector: Arc<DetectionService>,
    /// Absent when no imagery source is configured
    pub ingestion: Option<Arc<IngestionTrigger>>,
    /// Scheduler job statuses for `/health`
    pub jobs: Option<Arc<JobRegistry>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        embedder: Arc<dyn EmbeddingModel>,
        classifier: Arc<dyn DisasterClassifier>,
        settings: &Settings,
    ) -> Result<Self, ServiceError> {
        let query = SimilarityQueryService::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            settings.query.top_k,
        )?;
        let detector =
            DetectionService::new(classifier, embedder, Arc::clone(&store), &settings.detect);

        Ok(Self {
            store,
            query: Arc::new(query),
            detector: Arc::new(detector),
            ingestion: None,
            jobs: None,
        })
    }

    pub fn with_ingestion(mut self, trigger: IngestionTrigger) -> Self {
        self.ingestion = Some(Arc::new(trigger));
        self
    }

    pub fn with_jobs(mut self, registry: Arc<JobRegistry>) -> Self {
        self.jobs = Some(registry);
        self
    }
}
