//! Background job scheduler for the disaster-watch daemon.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware cron jobs, a status
//! registry, overlap prevention, start jitter, run timeouts and graceful
//! shutdown through a `CancellationToken`.
//!
//! # Example
//!
//! ```ignore
//! use disaster_scheduler::{JitterConfig, OverlapPolicy, SchedulerConfig, SchedulerService, TimeoutConfig};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//!
//! scheduler.register_job(
//!     "refresh",
//!     "0 0 */6 * * *",
//!     None,
//!     OverlapPolicy::Skip,
//!     JitterConfig::new(30),
//!     TimeoutConfig::new(600),
//!     || async { refresh().await.map_err(|e| e.to_string()) },
//! ).await?;
//!
//! let status = scheduler.registry().get_status("refresh");
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod overlap;
mod policy;
mod registry;
mod scheduler;

pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use policy::{JitterConfig, TimeoutConfig};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
