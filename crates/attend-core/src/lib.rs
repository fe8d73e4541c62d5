//! Attendance inference and idle shutdown state machine for attendd
//!
//! This crate contains the agent's decision logic:
//! - Event log reading with canonical event codes
//! - Work interval inference with late-shutdown correction
//! - Fault-tolerant idle and load sampling
//! - Shutdown state machine (BeforeWindow -> Monitoring -> Triggered)

mod exemption;
mod inference;
mod reader;
mod sampler;
mod shutdown;

pub use exemption::*;
pub use inference::*;
pub use reader::*;
pub use sampler::*;
pub use shutdown::*;
