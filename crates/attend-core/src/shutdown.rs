//! Idle shutdown state machine
//!
//! `BeforeWindow -> Monitoring -> Triggered`. The controller never samples
//! or requests a shutdown at a time of day before the configured cutoff,
//! including after midnight while already `Monitoring`. `Triggered` is
//! terminal for the life of the process. A declined or failed shutdown
//! request returns to `Monitoring`.

use attend_config::ShutdownSettings;
use attend_host_api::{HostError, PowerControl, ShutdownResponse};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{IdleSample, IdleSampler};

/// Shutdown monitor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    BeforeWindow,
    Monitoring,
    Triggered,
}

/// Drives the shutdown state machine from idle samples
pub struct ShutdownController {
    sampler: IdleSampler,
    power: Arc<dyn PowerControl>,
    settings: ShutdownSettings,
    state: ShutdownState,
}

impl ShutdownController {
    pub fn new(
        sampler: IdleSampler,
        power: Arc<dyn PowerControl>,
        settings: ShutdownSettings,
    ) -> Self {
        Self {
            sampler,
            power,
            settings,
            state: ShutdownState::BeforeWindow,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// Whether a sample satisfies both thresholds
    pub fn should_trigger(&self, sample: &IdleSample) -> bool {
        if self.settings.block_on_sensor_fault && sample.sensor_fault {
            return false;
        }
        sample.idle_seconds >= self.settings.idle_threshold.as_secs_f64()
            && sample.cpu_load_percent <= self.settings.cpu_threshold_percent
    }

    /// Advance the state machine once at wall-clock time `now`
    pub async fn tick(&mut self, now: DateTime<Local>) -> ShutdownState {
        let cutoff_reached = self.settings.cutoff.is_reached_at(&now);

        match self.state {
            ShutdownState::Triggered => return self.state,
            ShutdownState::BeforeWindow => {
                if !cutoff_reached {
                    return self.state;
                }
                info!(cutoff = %self.settings.cutoff, "Cutoff reached, monitoring idle time");
                self.state = ShutdownState::Monitoring;
            }
            // Still running the next morning
            ShutdownState::Monitoring if !cutoff_reached => return self.state,
            ShutdownState::Monitoring => {}
        }

        let sample = self.sampler.sample().await;
        debug!(
            idle_seconds = sample.idle_seconds,
            cpu_load_percent = sample.cpu_load_percent,
            sensor_fault = sample.sensor_fault,
            "Idle sample"
        );

        if !self.should_trigger(&sample) {
            return self.state;
        }

        info!(
            idle_seconds = sample.idle_seconds,
            cpu_load_percent = sample.cpu_load_percent,
            countdown_secs = self.settings.countdown.as_secs(),
            interactive = self.settings.interactive,
            "Machine idle after cutoff, requesting shutdown"
        );

        match self
            .power
            .request_shutdown(self.settings.countdown, self.settings.interactive)
            .await
        {
            Ok(ShutdownResponse::Accepted) => {
                info!("Shutdown accepted");
                self.state = ShutdownState::Triggered;
            }
            Ok(ShutdownResponse::Declined) => {
                info!("Shutdown declined, resuming monitoring");
            }
            Err(HostError::ShutdownNotWithdrawn(msg)) => {
                error!(error = %msg, "Declined shutdown is still scheduled, not requesting again");
                self.state = ShutdownState::Triggered;
            }
            Err(e) => {
                warn!(error = %e, "Shutdown request failed, will retry next tick");
            }
        }

        self.state
    }

    /// Tick every `tick_interval` until a shutdown is accepted
    pub async fn run<C>(&mut self, clock: C)
    where
        C: Fn() -> DateTime<Local>,
    {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            cutoff = %self.settings.cutoff,
            idle_threshold_secs = self.settings.idle_threshold.as_secs(),
            cpu_threshold_percent = self.settings.cpu_threshold_percent,
            tick_secs = self.settings.tick_interval.as_secs(),
            "Shutdown monitor started"
        );

        loop {
            interval.tick().await;
            if self.tick(clock()).await == ShutdownState::Triggered {
                break;
            }
        }
    }
}
