//! Attendance record stores for attendd
//!
//! Provides:
//! - Roster lookup (employee by machine identity)
//! - Idempotent attendance upsert keyed by (date, employee)
//! - Read-back verification
//! - A local SQLite store and a remote PostgREST store

mod rest;
mod sqlite;
mod traits;

pub use rest::*;
pub use sqlite::*;
pub use traits::*;

use attend_util::AttendError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Unreachable(e.to_string())
    }
}

/// Every store failure is worth retrying later; backends come and go
impl From<StoreError> for AttendError {
    fn from(e: StoreError) -> Self {
        AttendError::transient(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
