//! HTTP handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use disaster_ingest::IngestionReport;
use disaster_scheduler::JobStatus;
use disaster_types::{
    lookback_start, BoundingBox, DisasterType, Event, EventFilter, ScoredEvent,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::{DetectRequest, DetectResponse};
use crate::error::ServiceError;
use crate::ingest::IngestRequest;
use crate::state::AppState;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::Validation(rejection.body_text()))
}

async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, disaster_storage::StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await?
        .map_err(|e| ServiceError::StoreUnavailable(e.to_string()))
}

pub async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexHealth {
    pub kind: String,
    pub vectors: usize,
    pub available: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub events: u64,
    pub embedded_events: u64,
    pub dimension: usize,
    pub index: IndexHealth,
    pub disk_usage_bytes: u64,
    pub ingestion_enabled: bool,
    #[serde(default)]
    pub jobs: Vec<JobStatus>,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ServiceError> {
    let store = Arc::clone(&state.store);
    let stats = blocking(move || store.stats()).await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        events: stats.event_count,
        embedded_events: stats.embedded_count,
        dimension: stats.dimension,
        index: IndexHealth {
            kind: stats.index.kind.to_string(),
            vectors: stats.index.vector_count,
            available: stats.index.available,
            size_bytes: stats.index.size_bytes,
        },
        disk_usage_bytes: stats.disk_usage_bytes,
        ingestion_enabled: state.ingestion.is_some(),
        jobs: state
            .jobs
            .as_ref()
            .map(|registry| registry.get_all_status())
            .unwrap_or_default(),
    }))
}

/// Query string of `GET /api/disasters`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub bbox: Option<String>,
    #[serde(rename = "type")]
    pub disaster_type: Option<String>,
    /// Only events from the last N days
    pub days: Option<u32>,
    pub limit: Option<usize>,
}

impl ListParams {
    pub fn to_filter(&self) -> Result<EventFilter, ServiceError> {
        let mut filter = EventFilter::new();
        if let Some(text) = &self.bbox {
            let bbox =
                BoundingBox::parse(text).map_err(|e| ServiceError::Validation(e.to_string()))?;
            filter = filter.with_bbox(bbox);
        }
        if let Some(label) = &self.disaster_type {
            let disaster_type = label
                .parse::<DisasterType>()
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
            filter = filter.with_type(disaster_type);
        }
        if let Some(days) = self.days {
            let since = lookback_start(Utc::now(), days)
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
            filter = filter.with_since(since);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}

pub async fn list_disasters(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<Vec<Event>>, ServiceError> {
    let Query(params) = params.map_err(|e| ServiceError::Validation(e.body_text()))?;
    let filter = params.to_filter()?;
    debug!(?filter, "Listing disasters");

    let store = Arc::clone(&state.store);
    let events = blocking(move || store.find_all(&filter)).await?;
    Ok(Json(events.iter().map(Event::public_view).collect()))
}

pub async fn detect(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>, ServiceError> {
    let request = body(payload)?;
    Ok(Json(state.detector.detect(request).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct SimilarRequest {
    #[serde(default)]
    pub description: Option<String>,
}

/// Ranked matches; embeddings are left out of the response.
pub async fn similar_disasters(
    State(state): State<AppState>,
    payload: Result<Json<SimilarRequest>, JsonRejection>,
) -> Result<Json<Vec<ScoredEvent>>, ServiceError> {
    let request = body(payload)?;
    let description = request
        .description
        .ok_or_else(|| ServiceError::Validation("description is required".to_string()))?;

    let ranked = state.query.find_similar(&description).await?;
    Ok(Json(
        ranked
            .into_iter()
            .map(|mut scored| {
                scored.event.embedding = None;
                scored
            })
            .collect(),
    ))
}

/// `POST /api/ingest`; an empty body runs the configured region.
pub async fn trigger_ingest(
    State(state): State<AppState>,
    raw: Bytes,
) -> Result<Json<IngestionReport>, ServiceError> {
    let trigger = state.ingestion.as_ref().ok_or_else(|| {
        ServiceError::UpstreamUnavailable("no imagery source is configured".to_string())
    })?;
    let request: IngestRequest = if raw.iter().all(u8::is_ascii_whitespace) {
        IngestRequest::default()
    } else {
        serde_json::from_slice(&raw).map_err(|e| ServiceError::Validation(e.to_string()))?
    };
    Ok(Json(trigger.run(&request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_to_filter() {
        let params = ListParams {
            bbox: Some("78,22,79,23".to_string()),
            disaster_type: Some("flood".to_string()),
            days: Some(7),
            limit: Some(10),
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.bbox, Some(BoundingBox::new(78.0, 22.0, 79.0, 23.0).unwrap()));
        assert_eq!(filter.disaster_type, Some(DisasterType::Flood));
        assert_eq!(filter.limit, Some(10));
        let since = filter.since.unwrap();
        assert!(since < Utc::now() - chrono::Duration::days(6));
    }

    #[test]
    fn test_list_params_rejects_bad_bbox() {
        let params = ListParams {
            bbox: Some("1,2,3".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            params.to_filter(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_list_params_rejects_huge_days() {
        let params = ListParams {
            days: Some(u32::MAX),
            ..Default::default()
        };
        assert!(matches!(
            params.to_filter(),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_params_match_everything() {
        assert_eq!(ListParams::default().to_filter().unwrap(), EventFilter::new());
    }
}
