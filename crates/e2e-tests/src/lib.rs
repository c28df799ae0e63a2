//! End-to-end test infrastructure for disaster-watch.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering scene ingestion, storage, and the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use disaster_embeddings::{EmbeddingModel, HashEmbedder};
use disaster_ingest::{
    ImagerySource, IngestionPipeline, MockClassifier, PipelineConfig, SceneRecord,
};
use disaster_service::{serve, AppState, IngestionTrigger};
use disaster_storage::{
    EventStore, InsertReport, RocksEventStore, StorageError, StoreConfig, StoreStats,
};
use disaster_types::{
    BoundingBox, DisasterType, Event, EventFilter, Geometry, RegionOfInterest, ScoredEvent,
    Settings,
};

/// Embedding width used unless a test asks for another
pub const DEFAULT_DIMENSION: usize = 32;

/// Region every fixture scene and region-based test uses
pub const TEST_BBOX: &str = "78,22,79,23";

/// Shared test harness for E2E tests.
///
/// Owns a temp directory with an open event store and settings pointing at it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: Arc<RocksEventStore>,
    pub settings: Settings,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");

        let mut settings = Settings::default();
        settings.db_path = temp_dir.path().join("db").to_string_lossy().into_owned();
        settings.embedding.dimension = dimension;
        settings.request_timeout_secs = 10;

        let store = Arc::new(
            RocksEventStore::open(&settings.expanded_db_path(), StoreConfig::new(dimension))
                .expect("Failed to open test store"),
        );

        Self {
            _temp_dir: temp_dir,
            store,
            settings,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.settings.expanded_db_path()
    }

    /// Deterministic embedder matching the store's dimension.
    pub fn embedder(&self) -> Arc<dyn EmbeddingModel> {
        Arc::new(
            HashEmbedder::new(self.settings.embedding.dimension)
                .expect("Failed to create hash embedder"),
        )
    }

    /// Handler state with the default mock classifier.
    pub fn app_state(&self, embedder: Arc<dyn EmbeddingModel>) -> AppState {
        AppState::new(
            self.store.clone(),
            embedder,
            Arc::new(MockClassifier::new()),
            &self.settings,
        )
        .expect("Failed to build app state")
    }

    /// Pipeline over this harness's store.
    pub fn pipeline(
        &self,
        config: PipelineConfig,
        source: Arc<dyn ImagerySource>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Arc<IngestionPipeline> {
        Arc::new(
            IngestionPipeline::new(config, source, embedder, self.store.clone())
                .expect("Failed to build ingestion pipeline"),
        )
    }

    /// Handler state with manual ingestion wired to `source`.
    pub fn app_state_with_ingestion(&self, source: Arc<dyn ImagerySource>) -> AppState {
        let embedder = self.embedder();
        let pipeline = self.pipeline(PipelineConfig::default(), source, Arc::clone(&embedder));
        self.app_state(embedder)
            .with_ingestion(IngestionTrigger::new(pipeline, test_region()))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Event store whose every operation fails, as after losing its disk.
pub struct UnavailableStore {
    dimension: usize,
}

impl UnavailableStore {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn error() -> StorageError {
        StorageError::ColumnFamilyNotFound("events".to_string())
    }
}

impl EventStore for UnavailableStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert_many(&self, _events: Vec<Event>) -> Result<InsertReport, StorageError> {
        Err(Self::error())
    }

    fn insert_one(&self, _event: Event) -> Result<String, StorageError> {
        Err(Self::error())
    }

    fn find_all(&self, _filter: &EventFilter) -> Result<Vec<Event>, StorageError> {
        Err(Self::error())
    }

    fn nearest_by_embedding(
        &self,
        _query: &[f32],
        _k: usize,
    ) -> Result<Vec<ScoredEvent>, StorageError> {
        Err(Self::error())
    }

    fn get(&self, _id: &str) -> Result<Option<Event>, StorageError> {
        Err(Self::error())
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        Err(Self::error())
    }

    fn rebuild_index(&self) -> Result<usize, StorageError> {
        Err(Self::error())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Err(Self::error())
    }

    fn put_checkpoint(&self, _job_name: &str, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(Self::error())
    }

    fn get_checkpoint(&self, _job_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Err(Self::error())
    }
}

/// Running HTTP server bound to an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>,
}

impl TestServer {
    pub async fn start(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr: SocketAddr = listener.local_addr().expect("Listener has no address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(serve(listener, state, Duration::from_secs(10), async {
            shutdown_rx.await.ok();
        }));

        Self {
            base_url: format!("http://{}", addr),
            shutdown_tx: Some(shutdown_tx),
            _handle: handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub fn test_bbox() -> BoundingBox {
    BoundingBox::parse(TEST_BBOX).expect("Invalid test bbox")
}

/// Fixture region over [`TEST_BBOX`] with a 30 day window.
pub fn test_region() -> RegionOfInterest {
    RegionOfInterest::new(test_bbox(), 30).expect("Invalid test region")
}

pub fn capture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 5, 30, 0).unwrap()
}

/// Scene whose every cell is water (NDWI 0.67).
pub fn flooded_scene(rows: usize, cols: usize) -> SceneRecord {
    SceneRecord::uniform("S2A_FLOODED", capture_time(), rows, cols, 0.5, 0.1)
        .with_bbox(&test_bbox())
}

/// Scene with no water at the default threshold.
pub fn dry_scene(rows: usize, cols: usize) -> SceneRecord {
    SceneRecord::uniform("S2A_DRY", capture_time(), rows, cols, 0.1, 0.5).with_bbox(&test_bbox())
}

/// Scene with water in every even column, giving `cols / 2` separate regions.
pub fn striped_scene(rows: usize, cols: usize) -> SceneRecord {
    let mut record = dry_scene(rows, cols);
    record.scene_id = "S2A_STRIPED".to_string();
    for row in 0..rows {
        for col in (0..cols).step_by(2) {
            record.green[row * cols + col] = 0.5;
            record.nir[row * cols + col] = 0.1;
        }
    }
    record
}

/// Create N point events scattered inside `bbox`.
///
/// Types alternate flood/fire; timestamps are one hour apart, newest last.
/// The same `seed` always yields the same positions.
pub fn create_test_events(count: usize, bbox: &BoundingBox, seed: u64) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = capture_time();

    (0..count)
        .map(|i| {
            let lon = rng.random_range(bbox.min_lon..bbox.max_lon);
            let lat = rng.random_range(bbox.min_lat..bbox.max_lat);
            let disaster_type = if i % 2 == 0 {
                DisasterType::Flood
            } else {
                DisasterType::Fire
            };
            let timestamp = base + chrono::Duration::hours(i as i64);
            let description = format!("{} report number {}", disaster_type, i);

            Event::new(disaster_type, Geometry::point(lon, lat), timestamp, 0.8, "report")
                .with_description(description)
        })
        .collect()
}

/// Embed each event's text and insert it; returns ids in insertion order.
pub fn seed_events(
    store: &dyn EventStore,
    embedder: &dyn EmbeddingModel,
    events: Vec<Event>,
) -> Vec<String> {
    events
        .into_iter()
        .map(|event| {
            let vector = embedder
                .embed(&event.embedding_text())
                .expect("Failed to embed event")
                .into_vec();
            store
                .insert_one(event.with_embedding(vector))
                .expect("Failed to insert event")
        })
        .collect()
}
