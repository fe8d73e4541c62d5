//! Validated settings structures

use crate::schema::{
    RawAgentConfig, RawConfig, RawHostConfig, RawInferenceConfig, RawShutdownConfig,
    RawStoreConfig,
};
use crate::validation::parse_time;
use attend_util::WallClock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default target codes: platform "unexpected session end" events
pub const DEFAULT_TARGET_CODES: [u16; 5] = [42, 26, 4001, 109, 1002];

/// Validated configuration ready for use by the agent
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    pub inference: InferenceSettings,
    pub shutdown: ShutdownSettings,
    pub host: HostSettings,
    pub store: StoreSettings,
}

impl AgentConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            agent: AgentSettings::from_raw(raw.agent),
            inference: InferenceSettings::from_raw(raw.inference),
            shutdown: ShutdownSettings::from_raw(raw.shutdown),
            host: HostSettings::from_raw(raw.host),
            store: StoreSettings::from_raw(raw.store),
        }
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub data_dir: PathBuf,
    pub startup_delay: Duration,
    pub retry_delay: Duration,
    pub exemption_markers: Vec<String>,
}

impl AgentSettings {
    fn from_raw(raw: RawAgentConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            startup_delay: raw
                .startup_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_delay),
            retry_delay: raw
                .retry_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            exemption_markers: raw.exemption_markers.unwrap_or(defaults.exemption_markers),
        }
    }

    /// Marker files whose presence exempts this run from shutdown monitoring
    pub fn exemption_paths(&self) -> Vec<PathBuf> {
        self.exemption_markers
            .iter()
            .map(|name| self.data_dir.join(name))
            .collect()
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            data_dir: attend_util::default_data_dir(),
            startup_delay: Duration::from_secs(5),
            retry_delay: attend_util::DEFAULT_RETRY_DELAY,
            exemption_markers: vec!["exempt".into(), "exempt.txt".into()],
        }
    }
}

/// Attendance inference tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceSettings {
    /// Hour at or after which the previous event is considered a late shutdown
    pub late_hour: u8,
    /// Canonical codes searched by the late-shutdown correction
    pub target_codes: BTreeSet<u16>,
    /// Start of the evening correction window; the window ends at 23:59:59
    pub correction_window_start: WallClock,
    pub max_lookback_days: u32,
}

impl InferenceSettings {
    fn from_raw(raw: RawInferenceConfig) -> Self {
        let defaults = Self::default();
        Self {
            late_hour: raw.late_hour.unwrap_or(defaults.late_hour),
            target_codes: raw
                .target_codes
                .map(|codes| codes.into_iter().filter_map(|c| u16::try_from(c).ok()).collect())
                .unwrap_or(defaults.target_codes),
            correction_window_start: raw
                .correction_window_start
                .as_deref()
                .and_then(parse_wall_clock)
                .unwrap_or(defaults.correction_window_start),
            max_lookback_days: raw.max_lookback_days.unwrap_or(defaults.max_lookback_days),
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            late_hour: 22,
            target_codes: DEFAULT_TARGET_CODES.into_iter().collect(),
            correction_window_start: WallClock { hour: 18, minute: 30 },
            max_lookback_days: 14,
        }
    }
}

/// Idle shutdown monitor settings
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownSettings {
    pub enabled: bool,
    pub cutoff: WallClock,
    pub idle_threshold: Duration,
    pub cpu_threshold_percent: f64,
    pub countdown: Duration,
    pub interactive: bool,
    pub tick_interval: Duration,
    pub block_on_sensor_fault: bool,
}

impl ShutdownSettings {
    fn from_raw(raw: RawShutdownConfig) -> Self {
        let defaults = Self::default();
        Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            cutoff: raw
                .cutoff
                .as_deref()
                .and_then(parse_wall_clock)
                .unwrap_or(defaults.cutoff),
            idle_threshold: raw
                .idle_threshold_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_threshold),
            cpu_threshold_percent: raw
                .cpu_threshold_percent
                .unwrap_or(defaults.cpu_threshold_percent),
            countdown: raw
                .countdown_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.countdown),
            interactive: raw.interactive.unwrap_or(defaults.interactive),
            tick_interval: raw
                .tick_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.tick_interval),
            block_on_sensor_fault: raw
                .block_on_sensor_fault
                .unwrap_or(defaults.block_on_sensor_fault),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cutoff: WallClock { hour: 18, minute: 30 },
            idle_threshold: Duration::from_secs(1080),
            cpu_threshold_percent: 20.0,
            countdown: Duration::from_secs(300),
            interactive: false,
            tick_interval: Duration::from_secs(60),
            block_on_sensor_fault: false,
        }
    }
}

/// Host adapter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub idle_command: Vec<String>,
    pub command_timeout: Duration,
    pub cpu_sample_window: Duration,
    /// Overrides merged on top of the adapter's built-in mapping
    pub journal_codes: BTreeMap<String, u32>,
    pub command_overrides: BTreeMap<String, Vec<String>>,
}

impl HostSettings {
    fn from_raw(raw: RawHostConfig) -> Self {
        let defaults = Self::default();
        Self {
            idle_command: raw.idle_command.unwrap_or(defaults.idle_command),
            command_timeout: raw
                .command_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            cpu_sample_window: raw
                .cpu_sample_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cpu_sample_window),
            journal_codes: raw.journal_codes,
            command_overrides: raw.command_overrides,
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            idle_command: vec!["xprintidle".into()],
            command_timeout: Duration::from_secs(10),
            cpu_sample_window: Duration::from_secs(1),
            journal_codes: BTreeMap::new(),
            command_overrides: BTreeMap::new(),
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Sqlite {
        path: PathBuf,
    },
    Rest {
        url: String,
        api_key: String,
        roster_table: String,
        attendance_table: String,
        timeout: Duration,
    },
}

impl StoreSettings {
    fn from_raw(raw: RawStoreConfig) -> Self {
        match raw {
            RawStoreConfig::Sqlite { path } => Self::Sqlite {
                path: path.unwrap_or_else(|| PathBuf::from("attendance.db")),
            },
            RawStoreConfig::Rest {
                url,
                api_key,
                roster_table,
                attendance_table,
                timeout_seconds,
            } => Self::Rest {
                url: url.trim_end_matches('/').to_string(),
                api_key,
                roster_table: roster_table.unwrap_or_else(|| "userlist".into()),
                attendance_table: attendance_table.unwrap_or_else(|| "attendance".into()),
                timeout: Duration::from_secs(timeout_seconds.unwrap_or(30)),
            },
        }
    }

    /// Resolve a relative sqlite path against the data directory
    pub fn sqlite_path(&self, data_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Sqlite { path } if path.is_absolute() => Some(path.clone()),
            Self::Sqlite { path } => Some(data_dir.join(path)),
            Self::Rest { .. } => None,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from_raw(RawStoreConfig::default())
    }
}

fn parse_wall_clock(s: &str) -> Option<WallClock> {
    parse_time(s).ok().and_then(|(h, m)| WallClock::new(h, m))
}
