//! Overlap control for scheduled jobs.
//!
//! A cron tick that arrives while the previous run of the same job is
//! still in flight is either skipped or allowed to run alongside it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do when a run is due while the last one is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the new run and record it as skipped.
    #[default]
    Skip,
    /// Start the new run anyway.
    Concurrent,
}

/// Tracks whether a job currently holds its run slot.
pub struct OverlapGuard {
    busy: Arc<AtomicBool>,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            policy,
        }
    }

    /// Claim the run slot.
    ///
    /// Under `Skip` this returns `None` while another [`RunGuard`] is alive.
    /// Under `Concurrent` it always succeeds and never marks the slot busy.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Skip => self
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .ok()
                .map(|_| RunGuard {
                    flag: Some(Arc::clone(&self.busy)),
                }),
            OverlapPolicy::Concurrent => Some(RunGuard { flag: None }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Releases the run slot on drop, including when the job panics.
pub struct RunGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(flag) = &self.flag {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_blocks_second_run() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);

        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_always_acquires() {
        let guard = OverlapGuard::new(OverlapPolicy::Concurrent);
        let a = guard.try_acquire();
        let b = guard.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(!guard.is_running());
        assert_eq!(guard.policy(), OverlapPolicy::Concurrent);
    }

    #[test]
    fn test_skip_across_threads_releases() {
        let guard = Arc::new(OverlapGuard::new(OverlapPolicy::Skip));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || {
                    if let Some(_run) = guard.try_acquire() {
                        std::thread::sleep(std::time::Duration::from_millis(5));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!guard.is_running());
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(OverlapPolicy::default(), OverlapPolicy::Skip);
        assert_eq!(
            serde_json::to_string(&OverlapPolicy::Concurrent).unwrap(),
            "\"concurrent\""
        );
    }
}
