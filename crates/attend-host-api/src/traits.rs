//! Host collaborator traits

use async_trait::async_trait;
use attend_util::{AttendError, MachineId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not supported on this host: {0}")]
    Unsupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The user declined, but the already scheduled shutdown could not be
    /// cancelled and will still happen
    #[error("Scheduled shutdown could not be withdrawn: {0}")]
    ShutdownNotWithdrawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

impl From<HostError> for AttendError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::Internal(msg) => AttendError::internal(msg),
            other => AttendError::platform(other.to_string()),
        }
    }
}

/// A platform event as reported by the event source, before canonicalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub raw_code: u32,
    pub timestamp: DateTime<Local>,
}

impl RawEvent {
    pub fn new(raw_code: u32, timestamp: DateTime<Local>) -> Self {
        Self {
            raw_code,
            timestamp,
        }
    }
}

/// Outcome of a shutdown request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownResponse {
    /// The shutdown is scheduled and will happen after the countdown
    Accepted,
    /// The user declined (interactive mode only); nothing is scheduled
    Declined,
}

/// The platform's persistent system event log
#[async_trait]
pub trait EventSource: Send + Sync {
    /// All events with `start <= timestamp < end`, in any order
    async fn query_events(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> HostResult<Vec<RawEvent>>;
}

/// User-input idle time and processor load
#[async_trait]
pub trait IdleSource: Send + Sync {
    /// Time since the last keyboard or mouse input
    async fn idle_time(&self) -> HostResult<Duration>;

    /// Current total processor utilization, 0-100
    async fn cpu_load_percent(&self) -> HostResult<f64>;
}

/// Scheduling a system power-off
#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Schedule a shutdown after `countdown`. With `interactive`, the user is
    /// offered a chance to decline first.
    async fn request_shutdown(
        &self,
        countdown: Duration,
        interactive: bool,
    ) -> HostResult<ShutdownResponse>;
}

/// Stable hardware identity of this machine
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` when no usable identity exists
    async fn machine_identity(&self) -> HostResult<Option<MachineId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_maps_to_platform_query() {
        let err: AttendError = HostError::Timeout(Duration::from_secs(10)).into();
        assert!(matches!(err, AttendError::PlatformQuery(_)));
        assert!(err.is_retryable());

        let err: AttendError = HostError::Internal("bug".into()).into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn shutdown_response_serialization() {
        let json = serde_json::to_string(&ShutdownResponse::Declined).unwrap();
        assert_eq!(json, "\"declined\"");
    }
}
