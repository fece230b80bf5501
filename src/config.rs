//! Runtime configuration for the monitoring engine.
//!
//! Defaults match the reference behavior (2s poll period, 60s flush period);
//! an optional TOML file can override any field, and the CLI overrides both.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between poll attempts per committed patient.
    pub poll_interval_secs: u64,
    /// Seconds between persistence flushes.
    pub flush_interval_secs: u64,
    /// Per-request timeout, milliseconds. Kept well under the poll period so
    /// a timed-out attempt is resolved before the next tick.
    pub poll_timeout_ms: u64,
    /// Path of the persisted vitals log.
    pub log_file: PathBuf,
    /// Path of the saved patient roster.
    pub roster_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            flush_interval_secs: 60,
            poll_timeout_ms: 1500,
            log_file: PathBuf::from("vitals-log.json"),
            roster_file: PathBuf::from("roster.json"),
        }
    }
}

impl MonitorConfig {
    /// Load configuration, layering an optional TOML file over the defaults.
    ///
    /// Fields absent from the file keep their default values.
    pub fn load(file: Option<&std::path::Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder.build()?.try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
