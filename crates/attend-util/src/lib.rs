//! Shared utilities for attendd
//!
//! This crate provides:
//! - ID types (MachineId, EmployeeId)
//! - Time utilities (mockable wall clock, time-of-day helpers)
//! - The shared error taxonomy
//! - A fixed-delay retry combinator
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod retry;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use retry::*;
pub use time::*;
