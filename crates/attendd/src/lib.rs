//! attendd orchestration
//!
//! Runs the agent's phases in order: wait for the record store, infer
//! today's work interval, match this machine to a roster entry, store and
//! verify the attendance record, then hand over to the shutdown monitor.
//! Every phase retries retryable failures with the configured fixed delay.

use attend_config::AgentConfig;
use attend_core::{AttendanceInferencer, IdleSampler, ShutdownController, exemption_present};
use attend_host_api::{EventSource, IdentityResolver, IdleSource, PowerControl};
use attend_store::{AttendanceRecord, Employee, RecordStore, find_employee};
use attend_util::{AttendError, MachineId, Result as AttendResult, retry_until};
use chrono::{DateTime, Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Version recorded with every attendance row
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wall-clock source
pub type Clock = fn() -> DateTime<Local>;

/// Everything the agent talks to
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventSource>,
    pub idle: Arc<dyn IdleSource>,
    pub power: Arc<dyn PowerControl>,
    pub identity: Arc<dyn IdentityResolver>,
    pub store: Arc<dyn RecordStore>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An exemption marker was present; monitoring was skipped
    Exempt(PathBuf),
    /// Monitoring is disabled or a single pass was requested
    MonitoringSkipped,
    /// A shutdown was requested and accepted
    ShutdownAccepted,
}

/// The agent: one attendance hand-off followed by shutdown monitoring
pub struct Agent {
    config: AgentConfig,
    collab: Collaborators,
    clock: Clock,
}

impl Agent {
    pub fn new(config: AgentConfig, collab: Collaborators) -> Self {
        Self {
            config,
            collab,
            clock: attend_util::now,
        }
    }

    /// Use another wall-clock source (for testing)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Record attendance, then monitor for an idle shutdown unless exempt,
    /// disabled, or `once` is set
    pub async fn run(&self, once: bool) -> AttendResult<RunOutcome> {
        let record = self.record_attendance().await?;
        info!(
            date = %record.date,
            employee_id = %record.employee_id,
            "Attendance recorded"
        );

        if let Some(marker) = exemption_present(&self.config.agent.exemption_paths()) {
            info!(marker = %marker.display(), "Exemption marker present, skipping shutdown monitor");
            return Ok(RunOutcome::Exempt(marker.to_path_buf()));
        }

        if once || !self.config.shutdown.enabled {
            info!(once, enabled = self.config.shutdown.enabled, "Shutdown monitor not started");
            return Ok(RunOutcome::MonitoringSkipped);
        }

        let mut controller = ShutdownController::new(
            IdleSampler::new(self.collab.idle.clone()),
            self.collab.power.clone(),
            self.config.shutdown.clone(),
        );
        controller.run(self.clock).await;

        Ok(RunOutcome::ShutdownAccepted)
    }

    /// Run every phase up to a verified attendance record
    pub async fn record_attendance(&self) -> AttendResult<AttendanceRecord> {
        self.wait_for_store().await?;
        let (today, start, end) = self.infer_interval().await?;
        let (employee, machine) = self.identify().await?;

        let record = AttendanceRecord::new(today, &employee, machine, start, end, AGENT_VERSION);
        self.store_record(&record).await?;
        self.verify_record(&record).await?;

        Ok(record)
    }

    async fn wait_for_store(&self) -> AttendResult<()> {
        let store = &self.collab.store;
        retry_until(
            "store ping",
            self.config.agent.retry_delay,
            AttendError::is_retryable,
            move || async move { store.ping().await.map_err(AttendError::from) },
        )
        .await?;

        info!(backend = store.name(), "Record store reachable");
        Ok(())
    }

    async fn infer_interval(
        &self,
    ) -> AttendResult<(NaiveDate, DateTime<Local>, Option<DateTime<Local>>)> {
        let inferencer = &AttendanceInferencer::new(
            self.collab.events.clone(),
            self.config.inference.clone(),
        );
        let clock = self.clock;

        retry_until(
            "inference",
            self.config.agent.retry_delay,
            AttendError::is_retryable,
            move || async move {
                let today = clock().date_naive();
                inferencer
                    .infer(today)
                    .await
                    .interval()
                    .map(|interval| (today, interval.start, interval.end))
                    .ok_or(AttendError::InferenceIncomplete(today))
            },
        )
        .await
    }

    async fn identify(&self) -> AttendResult<(Employee, MachineId)> {
        let store = &self.collab.store;
        let identity = &self.collab.identity;

        let (employee, machine) = retry_until(
            "identity",
            self.config.agent.retry_delay,
            AttendError::is_retryable,
            move || async move {
                let roster = store.fetch_roster().await?;
                let machine = identity.machine_identity().await?;
                match machine {
                    Some(machine) => match find_employee(&roster, &machine) {
                        Some(employee) => Ok((employee.clone(), machine)),
                        None => Err(AttendError::IdentityMismatch(Some(machine))),
                    },
                    None => Err(AttendError::IdentityMismatch(None)),
                }
            },
        )
        .await?;

        info!(
            employee_id = %employee.employee_id,
            name = %employee.name,
            machine = %machine,
            "Machine matched to roster"
        );
        Ok((employee, machine))
    }

    async fn store_record(&self, record: &AttendanceRecord) -> AttendResult<()> {
        let store = &self.collab.store;
        retry_until(
            "upsert",
            self.config.agent.retry_delay,
            AttendError::is_retryable,
            move || async move { store.upsert(record).await.map_err(AttendError::from) },
        )
        .await
    }

    async fn verify_record(&self, record: &AttendanceRecord) -> AttendResult<()> {
        let store = &self.collab.store;
        retry_until(
            "verify",
            self.config.agent.retry_delay,
            AttendError::is_retryable,
            move || async move {
                if store.verify(record).await? {
                    return Ok(());
                }
                // Rewrite before the next read-back
                warn!(date = %record.date, "Stored record does not match, rewriting");
                store.upsert(record).await?;
                Err(AttendError::transient("stored record does not match"))
            },
        )
        .await
    }
}
