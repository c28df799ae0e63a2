//! HTTP API for disaster-watch.
//!
//! Endpoints:
//! - `GET /ping`, `GET /health`
//! - `GET /api/disasters` lists stored events by bbox, type and recency
//! - `POST /detect` classifies and stores one detection
//! - `POST /get_similar_disasters` ranks events against free text
//! - `POST /api/ingest` triggers a manual ingestion run
//!
//! Errors are returned as `{"error": "<message>"}`.

pub mod detect;
pub mod error;
pub mod ingest;
pub mod query;
pub mod routes;
pub mod server;
pub mod state;

pub use detect::{DetectRegion, DetectRequest, DetectResponse, DetectionService};
pub use error::ServiceError;
pub use ingest::{IngestRequest, IngestionTrigger};
pub use query::{QueryState, SimilarityQueryService, DEFAULT_TOP_K};
pub use routes::HealthResponse;
pub use server::{build_router, run_server_with_shutdown, serve};
pub use state::AppState;
