//! Mock host for testing

use async_trait::async_trait;
use attend_util::MachineId;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    EventSource, HostError, HostResult, IdentityResolver, IdleSource, PowerControl, RawEvent,
    ShutdownResponse,
};

/// A recorded call to [`PowerControl::request_shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub countdown: Duration,
    pub interactive: bool,
}

/// In-memory host implementing every collaborator trait, for unit and
/// integration testing
pub struct MockHost {
    events: Arc<Mutex<Vec<RawEvent>>>,
    idle: Arc<Mutex<Duration>>,
    cpu: Arc<Mutex<f64>>,
    identity: Arc<Mutex<Option<MachineId>>>,
    responses: Arc<Mutex<VecDeque<ShutdownResponse>>>,
    shutdown_requests: Arc<Mutex<Vec<ShutdownRequest>>>,
    event_queries: AtomicU32,

    /// Configure event queries to fail
    pub fail_events: Arc<Mutex<bool>>,

    /// Configure idle time reads to fail
    pub fail_idle: Arc<Mutex<bool>>,

    /// Configure CPU load reads to fail
    pub fail_cpu: Arc<Mutex<bool>>,

    /// Configure shutdown requests to fail
    pub fail_shutdown: Arc<Mutex<bool>>,

    /// Configure identity lookup to fail
    pub fail_identity: Arc<Mutex<bool>>,

    /// Configure declined requests to leave the shutdown scheduled
    pub fail_withdraw: Arc<Mutex<bool>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            idle: Arc::new(Mutex::new(Duration::ZERO)),
            cpu: Arc::new(Mutex::new(0.0)),
            identity: Arc::new(Mutex::new(None)),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            shutdown_requests: Arc::new(Mutex::new(Vec::new())),
            event_queries: AtomicU32::new(0),
            fail_events: Arc::new(Mutex::new(false)),
            fail_idle: Arc::new(Mutex::new(false)),
            fail_cpu: Arc::new(Mutex::new(false)),
            fail_shutdown: Arc::new(Mutex::new(false)),
            fail_identity: Arc::new(Mutex::new(false)),
            fail_withdraw: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_events(self, events: impl IntoIterator<Item = RawEvent>) -> Self {
        self.set_events(events);
        self
    }

    pub fn with_identity(self, identity: MachineId) -> Self {
        *self.identity.lock().unwrap() = Some(identity);
        self
    }

    /// Replace the event log contents
    pub fn set_events(&self, events: impl IntoIterator<Item = RawEvent>) {
        *self.events.lock().unwrap() = events.into_iter().collect();
    }

    /// Append one event to the log
    pub fn push_event(&self, raw_code: u32, timestamp: DateTime<Local>) {
        self.events
            .lock()
            .unwrap()
            .push(RawEvent::new(raw_code, timestamp));
    }

    pub fn set_idle(&self, idle: Duration) {
        *self.idle.lock().unwrap() = idle;
    }

    pub fn set_cpu(&self, percent: f64) {
        *self.cpu.lock().unwrap() = percent;
    }

    pub fn set_identity(&self, identity: Option<MachineId>) {
        *self.identity.lock().unwrap() = identity;
    }

    /// Queue the answers for upcoming shutdown requests. Once the queue is
    /// empty every request is accepted.
    pub fn queue_responses(&self, responses: impl IntoIterator<Item = ShutdownResponse>) {
        self.responses.lock().unwrap().extend(responses);
    }

    pub fn set_fail_events(&self, fail: bool) {
        *self.fail_events.lock().unwrap() = fail;
    }

    pub fn set_fail_idle(&self, fail: bool) {
        *self.fail_idle.lock().unwrap() = fail;
    }

    pub fn set_fail_cpu(&self, fail: bool) {
        *self.fail_cpu.lock().unwrap() = fail;
    }

    pub fn set_fail_shutdown(&self, fail: bool) {
        *self.fail_shutdown.lock().unwrap() = fail;
    }

    pub fn set_fail_withdraw(&self, fail: bool) {
        *self.fail_withdraw.lock().unwrap() = fail;
    }

    /// Every shutdown request received so far
    pub fn shutdown_requests(&self) -> Vec<ShutdownRequest> {
        self.shutdown_requests.lock().unwrap().clone()
    }

    /// Number of event log queries received so far
    pub fn event_query_count(&self) -> u32 {
        self.event_queries.load(Ordering::SeqCst)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for MockHost {
    async fn query_events(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> HostResult<Vec<RawEvent>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);

        if *self.fail_events.lock().unwrap() {
            return Err(HostError::QueryFailed("Mock event log unavailable".into()));
        }

        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .copied()
            .collect())
    }
}

#[async_trait]
impl IdleSource for MockHost {
    async fn idle_time(&self) -> HostResult<Duration> {
        if *self.fail_idle.lock().unwrap() {
            return Err(HostError::QueryFailed("Mock idle sensor failure".into()));
        }
        Ok(*self.idle.lock().unwrap())
    }

    async fn cpu_load_percent(&self) -> HostResult<f64> {
        if *self.fail_cpu.lock().unwrap() {
            return Err(HostError::QueryFailed("Mock CPU sensor failure".into()));
        }
        Ok(*self.cpu.lock().unwrap())
    }
}

#[async_trait]
impl PowerControl for MockHost {
    async fn request_shutdown(
        &self,
        countdown: Duration,
        interactive: bool,
    ) -> HostResult<ShutdownResponse> {
        if *self.fail_shutdown.lock().unwrap() {
            return Err(HostError::CommandFailed("Mock shutdown failure".into()));
        }

        self.shutdown_requests.lock().unwrap().push(ShutdownRequest {
            countdown,
            interactive,
        });

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ShutdownResponse::Accepted);

        if response == ShutdownResponse::Declined && *self.fail_withdraw.lock().unwrap() {
            return Err(HostError::ShutdownNotWithdrawn("Mock cancel failure".into()));
        }
        Ok(response)
    }
}

#[async_trait]
impl IdentityResolver for MockHost {
    async fn machine_identity(&self) -> HostResult<Option<MachineId>> {
        if *self.fail_identity.lock().unwrap() {
            return Err(HostError::QueryFailed("Mock identity failure".into()));
        }
        Ok(self.identity.lock().unwrap().clone())
    }
}
