//! Periodic ingestion job.
//!
//! Runs the ingestion pipeline over the configured region of interest on
//! a cron schedule (default every six hours). The run's counts become the
//! job's registry metadata.

use std::sync::Arc;

use disaster_ingest::{IngestionPipeline, IngestionReport};
use disaster_types::{IngestionSettings, RegionOfInterest};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    JitterConfig, JobOutput, OverlapPolicy, SchedulerError, SchedulerService, TimeoutConfig,
};

/// Registry name of the ingestion job
pub const INGESTION_JOB: &str = "ingestion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionJobConfig {
    /// 6-field cron expression (default: "0 0 */6 * * *")
    pub cron: String,
    pub timezone: String,
    /// Max jitter in seconds (default: 120)
    pub jitter_secs: u64,
    /// Run timeout in seconds, 0 for none (default: 1800)
    pub timeout_secs: u64,
}

impl Default for IngestionJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */6 * * *".to_string(),
            timezone: "UTC".to_string(),
            jitter_secs: 120,
            timeout_secs: 1800,
        }
    }
}

impl IngestionJobConfig {
    pub fn from_settings(settings: &IngestionSettings) -> Self {
        Self {
            cron: settings.cron.clone(),
            timezone: settings.timezone.clone(),
            jitter_secs: settings.jitter_secs,
            timeout_secs: settings.timeout_secs,
        }
    }
}

/// Registry metadata for a finished run.
pub fn report_output(report: &IngestionReport) -> JobOutput {
    JobOutput::new()
        .with_metadata("run_key", report.run_key.clone())
        .with_metadata("scene_id", report.scene_id.clone())
        .with_count("regions", report.regions)
        .with_count("normalized", report.normalized)
        .with_count("skipped", report.skipped)
        .with_count("inserted", report.inserted)
        .with_count("failed", report.failed)
        .with_metadata("truncated", report.truncated.to_string())
}

/// Execute one ingestion run and map it to a job outcome.
pub async fn run_ingestion(
    pipeline: &IngestionPipeline,
    roi: &RegionOfInterest,
) -> Result<JobOutput, String> {
    let report = pipeline
        .run(roi)
        .await
        .map_err(|e| format!("ingestion failed: {}", e))?;
    info!(
        run_key = %report.run_key,
        regions = report.regions,
        inserted = report.inserted,
        skipped = report.skipped,
        failed = report.failed,
        "Scheduled ingestion completed"
    );
    Ok(report_output(&report))
}

/// Register the ingestion job.
///
/// Uses `OverlapPolicy::Skip` so a slow run is never doubled up over the
/// same region and window.
pub async fn create_ingestion_job(
    scheduler: &SchedulerService,
    pipeline: Arc<IngestionPipeline>,
    roi: RegionOfInterest,
    config: IngestionJobConfig,
) -> Result<uuid::Uuid, SchedulerError> {
    let run_key = IngestionPipeline::run_key(&roi);

    let uuid = scheduler
        .register_job_with_metadata(
            INGESTION_JOB,
            &config.cron,
            Some(&config.timezone),
            OverlapPolicy::Skip,
            JitterConfig::new(config.jitter_secs),
            TimeoutConfig::new(config.timeout_secs),
            move || {
                let pipeline = Arc::clone(&pipeline);
                let roi = roi.clone();
                async move { run_ingestion(&pipeline, &roi).await }
            },
        )
        .await?;

    info!(
        run_key = %run_key,
        schedule = %config.cron,
        timezone = %config.timezone,
        "Registered ingestion job"
    );
    Ok(uuid)
}
