//! Error types for the scheduler crate.

use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Job configuration rejected before registration
    #[error("Invalid job configuration: {0}")]
    InvalidJob(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}
