//! Linux host adapter for attendd
//!
//! Provides:
//! - System events from the systemd journal
//! - Input idle time via an external command (`xprintidle` by default)
//! - Processor load from `/proc/stat`
//! - Scheduled power-off via `shutdown(8)`, optionally confirmed with `zenity`
//! - Machine identity from `/sys/class/net`

mod command;
mod identity;
mod idle;
mod journal;
mod power;

pub use command::*;
pub use identity::*;
pub use idle::*;
pub use journal::*;
pub use power::*;

use attend_config::HostSettings;

/// All Linux collaborators built from one set of host settings
pub struct LinuxHost {
    pub events: JournalEventSource,
    pub idle: LinuxIdleSource,
    pub power: LinuxPowerControl,
    pub identity: SysfsIdentity,
}

impl LinuxHost {
    pub fn new(settings: &HostSettings) -> Self {
        let runner =
            CommandRunner::new(settings.command_timeout).with_programs(&settings.command_overrides);

        Self {
            events: JournalEventSource::new(runner.clone(), &settings.journal_codes),
            idle: LinuxIdleSource::new(
                runner.clone(),
                settings.idle_command.clone(),
                settings.cpu_sample_window,
            ),
            power: LinuxPowerControl::new(runner),
            identity: SysfsIdentity::new(),
        }
    }
}
