//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub agent: RawAgentConfig,

    /// Attendance inference tuning
    #[serde(default)]
    pub inference: RawInferenceConfig,

    /// Idle shutdown monitor
    #[serde(default)]
    pub shutdown: RawShutdownConfig,

    /// Host adapter settings
    #[serde(default)]
    pub host: RawHostConfig,

    /// Record store backend
    #[serde(default)]
    pub store: RawStoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAgentConfig {
    /// Directory for the local database and exemption markers
    pub data_dir: Option<PathBuf>,

    /// Delay before the first backend contact
    pub startup_delay_seconds: Option<u64>,

    /// Fixed delay between retries of any retryable failure
    pub retry_delay_seconds: Option<u64>,

    /// File names (relative to data_dir) whose presence skips shutdown monitoring
    pub exemption_markers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawInferenceConfig {
    /// Previous-event hour at or after which the late-shutdown correction runs
    pub late_hour: Option<u8>,

    /// Canonical event codes that mark an unexpected end of session
    pub target_codes: Option<Vec<u32>>,

    /// Start of the evening window scanned by the correction (HH:MM)
    pub correction_window_start: Option<String>,

    /// How far back to look for the previous event
    pub max_lookback_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawShutdownConfig {
    /// Disable the monitor entirely (attendance is still recorded)
    pub enabled: Option<bool>,

    /// End of the workday (HH:MM); nothing is triggered before it
    pub cutoff: Option<String>,

    pub idle_threshold_seconds: Option<u64>,

    pub cpu_threshold_percent: Option<f64>,

    /// Delay between the shutdown request and the actual power-off
    pub countdown_seconds: Option<u64>,

    /// Ask the user before shutting down; declining resumes monitoring
    pub interactive: Option<bool>,

    /// Sampling interval
    pub tick_seconds: Option<u64>,

    /// Never trigger on a tick where a sensor read failed
    pub block_on_sensor_fault: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHostConfig {
    /// Command printing the input idle time in milliseconds
    pub idle_command: Option<Vec<String>>,

    /// Upper bound for any external command the host adapter runs
    pub command_timeout_seconds: Option<u64>,

    /// Gap between the two /proc/stat snapshots used for CPU load
    pub cpu_sample_window_ms: Option<u64>,

    /// Extra or overriding journal MESSAGE_ID -> raw event code mappings
    #[serde(default)]
    pub journal_codes: BTreeMap<String, u32>,

    /// Command lines run in place of a program, e.g. `shutdown = ["sudo", "-n", "shutdown"]`
    #[serde(default)]
    pub command_overrides: BTreeMap<String, Vec<String>>,
}

/// Record store backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawStoreConfig {
    Sqlite {
        /// Database file, relative paths resolve against data_dir
        path: Option<PathBuf>,
    },
    Rest {
        url: String,
        api_key: String,
        roster_table: Option<String>,
        attendance_table: Option<String>,
        timeout_seconds: Option<u64>,
    },
}

impl Default for RawStoreConfig {
    fn default() -> Self {
        Self::Sqlite { path: None }
    }
}
