//! Scheduler configuration.

use disaster_types::IngestionSettings;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone used when a job does not name one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Grace period for running jobs once shutdown is signalled.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    /// Take the default timezone from the ingestion settings.
    pub fn from_settings(settings: &IngestionSettings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            ..Default::default()
        }
    }

    /// Parse the configured timezone.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` for an unknown IANA name.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }
}
