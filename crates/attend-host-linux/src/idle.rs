//! Input idle time and processor load on Linux

use async_trait::async_trait;
use attend_host_api::{HostError, HostResult, IdleSource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::{CommandRunner, describe_failure, stdout_line};

const PROC_STAT: &str = "/proc/stat";

/// Aggregate CPU counters from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait
    pub idle: u64,
    /// user + nice + system + idle + iowait + irq + softirq + steal
    pub total: u64,
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_proc_stat(contents: &str) -> Option<CpuTimes> {
    let line = contents.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().ok())
        .collect::<Option<Vec<_>>>()?;

    if fields.len() < 4 {
        return None;
    }

    // guest and guest_nice are already counted in user and nice
    let total = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);

    Some(CpuTimes { idle, total })
}

/// Busy percentage between two snapshots, 0 when no time elapsed
pub fn busy_percent(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    let idle = after.idle.saturating_sub(before.idle);
    if total == 0 {
        return 0.0;
    }
    let busy = total.saturating_sub(idle);
    (busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Parse the idle command's output: milliseconds since last input
pub fn parse_idle_millis(line: &str) -> Option<Duration> {
    line.trim().parse::<u64>().ok().map(Duration::from_millis)
}

/// [`IdleSource`] using an idle-time command and `/proc/stat`
pub struct LinuxIdleSource {
    runner: CommandRunner,
    idle_command: Vec<String>,
    sample_window: Duration,
    proc_stat: PathBuf,
}

impl LinuxIdleSource {
    pub fn new(runner: CommandRunner, idle_command: Vec<String>, sample_window: Duration) -> Self {
        Self {
            runner,
            idle_command,
            sample_window,
            proc_stat: PathBuf::from(PROC_STAT),
        }
    }

    /// Read CPU counters from another file (for testing)
    pub fn with_proc_stat(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_stat = path.into();
        self
    }

    async fn read_cpu_times(&self) -> HostResult<CpuTimes> {
        let contents = tokio::fs::read_to_string(&self.proc_stat).await?;
        parse_proc_stat(&contents).ok_or_else(|| {
            HostError::QueryFailed(format!("Unrecognized format in {}", self.proc_stat.display()))
        })
    }
}

#[async_trait]
impl IdleSource for LinuxIdleSource {
    async fn idle_time(&self) -> HostResult<Duration> {
        let Some((program, args)) = self.idle_command.split_first() else {
            return Err(HostError::Unsupported("No idle command configured".into()));
        };

        let output = self.runner.output(program, args).await?;
        if !output.status.success() {
            return Err(HostError::CommandFailed(describe_failure(program, &output)));
        }

        let line = stdout_line(&output);
        parse_idle_millis(&line).ok_or_else(|| {
            HostError::QueryFailed(format!("{} printed '{}', expected milliseconds", program, line))
        })
    }

    async fn cpu_load_percent(&self) -> HostResult<f64> {
        let before = self.read_cpu_times().await?;
        tokio::time::sleep(self.sample_window).await;
        let after = self.read_cpu_times().await?;

        let percent = busy_percent(before, after);
        debug!(percent, "Sampled CPU load");
        Ok(percent)
    }
}
