//! Host collaborator trait interfaces for attendd
//!
//! This crate defines the interface between the agent core and the
//! platform: the system event log, idle/load sensors, power control and
//! machine identity. It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
