//! Error types for attendd

use thiserror::Error;

use crate::MachineId;

/// Core error type for attendd operations
///
/// Every variant except `Config` and `Internal` is retryable: the agent
/// prefers waiting and trying again over terminating.
#[derive(Debug, Error)]
pub enum AttendError {
    /// Backend or network unreachable
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Event, idle or load source unavailable
    #[error("Platform query failed: {0}")]
    PlatformQuery(String),

    /// No event for today has been logged yet
    #[error("No system event recorded for {0} yet")]
    InferenceIncomplete(chrono::NaiveDate),

    /// The machine identity is unknown or matches no roster entry
    #[error("No roster entry matches machine identity {}", .0.as_ref().map(|m| m.as_str()).unwrap_or("<unavailable>"))]
    IdentityMismatch(Option<MachineId>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AttendError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientIo(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::PlatformQuery(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the orchestrator should wait and try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientIo(_)
                | Self::PlatformQuery(_)
                | Self::InferenceIncomplete(_)
                | Self::IdentityMismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AttendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert!(AttendError::transient("timeout").is_retryable());
        assert!(AttendError::platform("no journal").is_retryable());
        assert!(AttendError::InferenceIncomplete(day).is_retryable());
        assert!(AttendError::IdentityMismatch(None).is_retryable());

        assert!(!AttendError::config("bad").is_retryable());
        assert!(!AttendError::internal("bug").is_retryable());
    }

    #[test]
    fn identity_mismatch_message() {
        let err = AttendError::IdentityMismatch(Some(MachineId::parse("aa-bb-cc-dd-ee-ff").unwrap()));
        assert_eq!(
            err.to_string(),
            "No roster entry matches machine identity AA:BB:CC:DD:EE:FF"
        );

        let err = AttendError::IdentityMismatch(None);
        assert!(err.to_string().contains("<unavailable>"));
    }
}
