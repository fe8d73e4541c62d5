//! Fault-tolerant idle and load sampling
//!
//! Sensor failures never propagate: each read degrades to 0. For idle time
//! that reads as "user active", which blocks a shutdown. For CPU load it
//! reads as "machine quiet", which does not; see
//! [`ShutdownSettings::block_on_sensor_fault`](attend_config::ShutdownSettings)
//! to close that gap.

use attend_host_api::IdleSource;
use std::sync::Arc;
use tracing::warn;

/// One reading of both sensors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleSample {
    /// Seconds since last input, always >= 0
    pub idle_seconds: f64,
    /// Always within 0-100
    pub cpu_load_percent: f64,
    /// Either read failed and was replaced by its default
    pub sensor_fault: bool,
}

/// Wraps an [`IdleSource`] so that reads always produce a value
pub struct IdleSampler {
    source: Arc<dyn IdleSource>,
}

impl IdleSampler {
    pub fn new(source: Arc<dyn IdleSource>) -> Self {
        Self { source }
    }

    /// Seconds since last input, 0 on failure
    pub async fn idle_seconds(&self) -> f64 {
        self.read_idle().await.0
    }

    /// Processor load clamped to 0-100, 0 on failure
    pub async fn cpu_load_percent(&self) -> f64 {
        self.read_cpu().await.0
    }

    pub async fn sample(&self) -> IdleSample {
        let (idle_seconds, idle_ok) = self.read_idle().await;
        let (cpu_load_percent, cpu_ok) = self.read_cpu().await;
        IdleSample {
            idle_seconds,
            cpu_load_percent,
            sensor_fault: !(idle_ok && cpu_ok),
        }
    }

    async fn read_idle(&self) -> (f64, bool) {
        match self.source.idle_time().await {
            Ok(idle) => {
                let secs = idle.as_secs_f64();
                if secs.is_finite() {
                    (secs.max(0.0), true)
                } else {
                    warn!(value = secs, "Idle sensor returned a non-finite value");
                    (0.0, false)
                }
            }
            Err(e) => {
                warn!(error = %e, "Idle sensor unavailable, assuming user is active");
                (0.0, false)
            }
        }
    }

    async fn read_cpu(&self) -> (f64, bool) {
        match self.source.cpu_load_percent().await {
            Ok(percent) if percent.is_finite() => (percent.clamp(0.0, 100.0), true),
            Ok(percent) => {
                warn!(value = percent, "CPU sensor returned a non-finite value");
                (0.0, false)
            }
            Err(e) => {
                warn!(error = %e, "CPU sensor unavailable, assuming no load");
                (0.0, false)
            }
        }
    }
}
