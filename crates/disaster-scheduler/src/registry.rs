//! Job registry: schedule, run history and last-run metadata per job.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one scheduled run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// Not executed (overlap, pause or shutdown)
    Skipped(String),
}

/// Key/value stats a job reports back to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record a counter under `key`.
    pub fn with_count(self, key: impl Into<String>, count: usize) -> Self {
        self.with_metadata(key, count.to_string())
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    /// When the last run finished
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub error_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, cron_expr: String) -> Self {
        Self {
            job_name,
            cron_expr,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe registry of job statuses.
///
/// A panic while holding the lock does not disable the registry; the
/// status map is plain data and stays usable.
///
/// ```
/// use disaster_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("ingestion", "0 0 */6 * * *");
///
/// registry.record_start("ingestion");
/// assert!(registry.is_running("ingestion"));
///
/// registry.record_complete("ingestion", JobResult::Success, 1500);
/// assert!(!registry.is_running("ingestion"));
/// ```
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job, replacing any previous entry with the same name.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), cron_expr.to_string()),
        );
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    /// Record a finished run. Only `Failed` increments the error count.
    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
            status.last_run_metadata = metadata;
        }
    }

    pub fn set_next_run(&self, job_name: &str, next: DateTime<Utc>) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.next_run = Some(next);
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// All statuses, sorted by job name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read().get(job_name).is_some_and(|s| s.is_running)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("ingestion", "0 0 */6 * * *");

        let status = registry.get_status("ingestion").unwrap();
        assert_eq!(status.job_name, "ingestion");
        assert_eq!(status.cron_expr, "0 0 */6 * * *");
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
    }

    #[test]
    fn test_success_with_metadata() {
        let registry = JobRegistry::new();
        registry.register("ingestion", "0 0 * * * *");
        registry.record_start("ingestion");

        let output = JobOutput::new().with_count("inserted", 4).with_metadata("scene_id", "s-1");
        registry.record_complete_with_metadata("ingestion", JobResult::Success, 1500, output.metadata);

        let status = registry.get_status("ingestion").unwrap();
        assert!(!status.is_running);
        assert!(status.last_run.is_some());
        assert_eq!(status.last_duration_ms, Some(1500));
        assert_eq!(status.run_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_run_metadata.get("inserted").unwrap(), "4");
        assert_eq!(status.last_run_metadata.get("scene_id").unwrap(), "s-1");
    }

    #[test]
    fn test_failure_and_skip_counts() {
        let registry = JobRegistry::new();
        registry.register("ingestion", "0 0 * * * *");

        registry.record_complete("ingestion", JobResult::Failed("upstream".into()), 10);
        registry.record_complete("ingestion", JobResult::Skipped("overlap".into()), 0);

        let status = registry.get_status("ingestion").unwrap();
        assert_eq!(status.run_count, 2);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Skipped("overlap".into())));
    }

    #[test]
    fn test_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("b", "0 0 * * * *");
        registry.register("a", "0 30 * * * *");
        registry.register("c", "0 0 0 * * *");

        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.job_count(), 3);
    }

    #[test]
    fn test_unknown_job_is_noop() {
        let registry = JobRegistry::new();
        assert!(registry.get_status("unknown").is_none());
        assert!(!registry.is_running("unknown"));
        assert!(!registry.is_registered("unknown"));

        registry.record_start("unknown");
        registry.record_complete("unknown", JobResult::Success, 100);
        registry.set_next_run("unknown", Utc::now());
        assert_eq!(registry.job_count(), 0);
    }

    #[test]
    fn test_survives_poisoned_lock() {
        use std::sync::Arc;

        let registry = Arc::new(JobRegistry::new());
        registry.register("ingestion", "0 0 * * * *");

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.jobs.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        registry.record_start("ingestion");
        assert!(registry.is_running("ingestion"));
    }
}
