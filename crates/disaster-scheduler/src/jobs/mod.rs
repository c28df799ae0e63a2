//! Jobs the daemon registers with the scheduler.

pub mod ingestion;

pub use ingestion::{create_ingestion_job, report_output, run_ingestion, IngestionJobConfig, INGESTION_JOB};
