//! Scheduler service wrapper around tokio-cron-scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::overlap::{OverlapGuard, OverlapPolicy};
use crate::policy::{JitterConfig, TimeoutConfig};
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Validate a 6-field cron expression (sec min hour dom mon dow).
///
/// ```
/// use disaster_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 */6 * * *").is_ok());
/// assert!(validate_cron_expression("0 30 4 * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// Lifecycle owner for the daemon's cron jobs.
///
/// Every job registered through [`SchedulerService::register_job`] is
/// tracked in a shared [`JobRegistry`] and observes the service's
/// shutdown token.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create the scheduler without starting it.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        if let Err(e) = self.scheduler.start().await {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Cancel in-flight jobs and stop the scheduler.
    ///
    /// Running jobs get up to `shutdown_timeout_secs` to observe the
    /// cancellation and record their result.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.any_job_running() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.any_job_running() {
            warn!("Jobs still running at shutdown deadline");
        }

        let mut scheduler = self.scheduler.clone();
        if let Err(e) = scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    fn any_job_running(&self) -> bool {
        self.registry.get_all_status().iter().any(|s| s.is_running)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Register a cron job whose function reports only success or failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        jitter: JitterConfig,
        timeout: TimeoutConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.register_job_with_metadata(name, cron_expr, timezone, overlap, jitter, timeout, move || {
            let run = job_fn();
            async move { run.await.map(|_| JobOutput::new()) }
        })
        .await
    }

    /// Register a cron job that reports [`JobOutput`] metadata.
    ///
    /// Each tick checks the pause flag and the overlap guard, sleeps for
    /// the jitter delay, then runs `job_fn` under the timeout. The result
    /// and metadata land in the registry.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_job_with_metadata<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        jitter: JitterConfig,
        timeout: TimeoutConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz = self.resolve_timezone(timezone)?;
        validate_cron_expression(cron_expr)?;

        let job_name = name.to_string();
        let registry = Arc::clone(&self.registry);
        let guard = Arc::new(OverlapGuard::new(overlap));
        let token = self.shutdown_token.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let registry = Arc::clone(&registry);
            let guard = Arc::clone(&guard);
            let token = token.clone();
            let job_fn = Arc::clone(&job_fn);

            Box::pin(async move {
                execute_job(&name, &registry, &guard, jitter, timeout, &token, || (*job_fn)())
                    .await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        self.registry.register(name, cron_expr);
        info!(
            job = %name,
            uuid = %uuid,
            cron = %cron_expr,
            timezone = %tz.name(),
            overlap = ?overlap,
            "Job registered"
        );

        Ok(uuid)
    }

    fn resolve_timezone(&self, timezone: Option<&str>) -> Result<Tz, SchedulerError> {
        match timezone {
            Some(tz) => Self::parse_timezone(tz),
            None => self.config.parse_timezone(),
        }
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }
}

/// Run one tick of a job under its policies and record the result.
pub(crate) async fn execute_job<F, Fut>(
    name: &str,
    registry: &JobRegistry,
    guard: &OverlapGuard,
    jitter: JitterConfig,
    timeout: TimeoutConfig,
    shutdown: &CancellationToken,
    job_fn: F,
) -> JobResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<JobOutput, String>>,
{
    if shutdown.is_cancelled() {
        return JobResult::Skipped("shutting down".to_string());
    }

    let Some(_run) = guard.try_acquire() else {
        info!(job = %name, "Previous run still active, skipping");
        let result = JobResult::Skipped("previous run still active".to_string());
        registry.record_complete(name, result.clone(), 0);
        return result;
    };

    let delay = jitter.generate_jitter();
    if !delay.is_zero() {
        debug!(job = %name, jitter_ms = delay.as_millis() as u64, "Applying jitter delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => return JobResult::Skipped("shutting down".to_string()),
        }
    }

    registry.record_start(name);
    info!(job = %name, "Job started");
    let started = Instant::now();

    let run = async {
        match timeout.duration() {
            Some(limit) => tokio::time::timeout(limit, job_fn())
                .await
                .unwrap_or_else(|_| Err(format!("timed out after {}s", limit.as_secs()))),
            None => job_fn().await,
        }
    };
    let outcome = tokio::select! {
        outcome = run => outcome,
        _ = shutdown.cancelled() => Err("cancelled by shutdown".to_string()),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let (result, metadata) = match outcome {
        Ok(output) => {
            info!(job = %name, duration_ms, "Job completed");
            (JobResult::Success, output.metadata)
        }
        Err(e) => {
            warn!(job = %name, duration_ms, error = %e, "Job failed");
            (JobResult::Failed(e), Default::default())
        }
    };
    registry.record_complete_with_metadata(name, result.clone(), duration_ms, metadata);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_stop() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
        assert!(token.is_cancelled());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_timezone_config() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        let result = SchedulerService::new(config).await;
        assert!(matches!(result, Err(SchedulerError::InvalidTimezone(_))));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 0 * * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("0 0 0 * * SUN").is_ok());
        assert!(validate_cron_expression("* * *").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_tracks_status() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        scheduler
            .register_job(
                "ingestion",
                "0 0 */6 * * *",
                Some("Asia/Kolkata"),
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                || async { Ok(()) },
            )
            .await
            .unwrap();

        let status = scheduler.registry().get_status("ingestion").unwrap();
        assert_eq!(status.cron_expr, "0 0 */6 * * *");
        assert_eq!(status.run_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_job_rejects_bad_input() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();

        let bad_cron = scheduler
            .register_job(
                "bad",
                "not-cron",
                None,
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                || async { Ok(()) },
            )
            .await;
        assert!(matches!(bad_cron, Err(SchedulerError::InvalidCron(_))));

        let bad_tz = scheduler
            .register_job(
                "bad",
                "0 0 * * * *",
                Some("Mars/Olympus"),
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                || async { Ok(()) },
            )
            .await;
        assert!(matches!(bad_tz, Err(SchedulerError::InvalidTimezone(_))));
        assert!(!scheduler.registry().is_registered("bad"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_fires_on_schedule() {
        use std::sync::atomic::AtomicU32;

        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&counter);

        scheduler
            .register_job(
                "tick",
                "* * * * * *",
                None,
                OverlapPolicy::Skip,
                JitterConfig::none(),
                TimeoutConfig::none(),
                move || {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(counter.load(Ordering::SeqCst) >= 1);
        let status = scheduler.registry().get_status("tick").unwrap();
        assert!(status.run_count >= 1);
        assert_eq!(status.error_count, 0);
    }

    fn registry_with(name: &str) -> JobRegistry {
        let registry = JobRegistry::new();
        registry.register(name, "0 0 * * * *");
        registry
    }

    #[tokio::test]
    async fn test_execute_records_metadata() {
        let registry = registry_with("job");
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let token = CancellationToken::new();

        let result = execute_job(
            "job",
            &registry,
            &guard,
            JitterConfig::none(),
            TimeoutConfig::none(),
            &token,
            || async { Ok(JobOutput::new().with_count("inserted", 3)) },
        )
        .await;

        assert_eq!(result, JobResult::Success);
        let status = registry.get_status("job").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_run_metadata.get("inserted").unwrap(), "3");
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn test_execute_skips_overlapping_run() {
        let registry = registry_with("job");
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let token = CancellationToken::new();
        let _held = guard.try_acquire().unwrap();

        let result = execute_job(
            "job",
            &registry,
            &guard,
            JitterConfig::none(),
            TimeoutConfig::none(),
            &token,
            || async { Ok(JobOutput::new()) },
        )
        .await;

        assert!(matches!(result, JobResult::Skipped(_)));
        let status = registry.get_status("job").unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let registry = registry_with("job");
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let token = CancellationToken::new();

        let result = execute_job(
            "job",
            &registry,
            &guard,
            JitterConfig::none(),
            TimeoutConfig::new(1),
            &token,
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(JobOutput::new())
            },
        )
        .await;

        assert_eq!(result, JobResult::Failed("timed out after 1s".to_string()));
        assert_eq!(registry.get_status("job").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_execute_skips_during_shutdown() {
        let registry = registry_with("job");
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let token = CancellationToken::new();

        token.cancel();
        let cancelled = execute_job(
            "job",
            &registry,
            &guard,
            JitterConfig::none(),
            TimeoutConfig::none(),
            &token,
            || async { Ok(JobOutput::new()) },
        )
        .await;
        assert!(matches!(cancelled, JobResult::Skipped(_)));
        assert_eq!(registry.get_status("job").unwrap().run_count, 0);
    }
}
