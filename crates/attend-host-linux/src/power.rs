//! Scheduled power-off via `shutdown(8)`

use async_trait::async_trait;
use attend_host_api::{HostError, HostResult, PowerControl, ShutdownResponse};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{CommandRunner, describe_failure};

/// zenity exit status when the dialog timed out
const ZENITY_TIMEOUT: i32 = 5;

/// Extra time allowed for the dialog process beyond its own timeout
const DIALOG_GRACE: Duration = Duration::from_secs(30);

/// `shutdown -c` attempts after the user declined
const CANCEL_ATTEMPTS: u32 = 3;
const CANCEL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Whole minutes for `shutdown -P +N`, rounded up so the user always gets
/// at least the configured countdown
pub fn countdown_minutes(countdown: Duration) -> u64 {
    countdown.as_secs().div_ceil(60)
}

/// How the user answered the confirmation dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAnswer {
    Proceed,
    Cancel,
}

/// Map a zenity exit code. Only an explicit cancel stops the shutdown.
pub fn dialog_answer(exit_code: Option<i32>) -> DialogAnswer {
    match exit_code {
        Some(1) => DialogAnswer::Cancel,
        Some(0) | Some(ZENITY_TIMEOUT) => DialogAnswer::Proceed,
        // Killed or crashed dialog: nobody objected
        _ => DialogAnswer::Proceed,
    }
}

/// [`PowerControl`] using `shutdown(8)` and an optional `zenity` prompt
pub struct LinuxPowerControl {
    runner: CommandRunner,
}

impl LinuxPowerControl {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn schedule(&self, minutes: u64) -> HostResult<()> {
        let when = format!("+{}", minutes);
        let output = self.runner.output("shutdown", ["-P", when.as_str()]).await?;
        if !output.status.success() {
            let message = describe_failure("shutdown", &output);
            return Err(if message.contains("ermission") || message.contains("not privileged") {
                HostError::PermissionDenied(message)
            } else {
                HostError::CommandFailed(message)
            });
        }
        Ok(())
    }

    async fn cancel(&self) -> HostResult<()> {
        let output = self.runner.output("shutdown", ["-c"]).await?;
        if !output.status.success() {
            return Err(HostError::CommandFailed(describe_failure("shutdown", &output)));
        }
        Ok(())
    }

    /// Withdraw the scheduled shutdown, retrying a few times. If it stays
    /// scheduled the machine powers off regardless of the user's answer.
    async fn withdraw(&self) -> HostResult<()> {
        let mut last_error = String::new();

        for attempt in 1..=CANCEL_ATTEMPTS {
            match self.cancel().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to cancel scheduled shutdown");
                    last_error = e.to_string();
                }
            }
            if attempt < CANCEL_ATTEMPTS {
                tokio::time::sleep(CANCEL_RETRY_DELAY).await;
            }
        }

        error!(
            attempts = CANCEL_ATTEMPTS,
            error = %last_error,
            "User declined but the scheduled shutdown could not be withdrawn"
        );
        Err(HostError::ShutdownNotWithdrawn(last_error))
    }

    async fn ask(&self, countdown: Duration) -> DialogAnswer {
        let text = format!(
            "This computer has been idle after working hours and will shut down in {} minute(s).\n\nSave your work, or cancel to keep it running.",
            countdown_minutes(countdown)
        );
        let args = [
            "--question".to_string(),
            "--title=Scheduled shutdown".to_string(),
            format!("--text={}", text),
            format!("--timeout={}", countdown.as_secs().max(1)),
            "--ok-label=Continue".to_string(),
            "--cancel-label=Cancel shutdown".to_string(),
        ];

        match self
            .runner
            .output_with_timeout("zenity", args, countdown + DIALOG_GRACE)
            .await
        {
            Ok(output) => dialog_answer(output.status.code()),
            Err(HostError::Unsupported(_)) => {
                warn!("zenity not installed, shutting down without confirmation");
                DialogAnswer::Proceed
            }
            Err(e) => {
                warn!(error = %e, "Confirmation dialog failed, proceeding with shutdown");
                DialogAnswer::Proceed
            }
        }
    }
}

#[async_trait]
impl PowerControl for LinuxPowerControl {
    async fn request_shutdown(
        &self,
        countdown: Duration,
        interactive: bool,
    ) -> HostResult<ShutdownResponse> {
        let minutes = countdown_minutes(countdown);
        self.schedule(minutes).await?;
        info!(minutes, interactive, "Shutdown scheduled");

        if !interactive {
            return Ok(ShutdownResponse::Accepted);
        }

        match self.ask(countdown).await {
            DialogAnswer::Proceed => Ok(ShutdownResponse::Accepted),
            DialogAnswer::Cancel => {
                self.withdraw().await?;
                info!("Shutdown cancelled by user");
                Ok(ShutdownResponse::Declined)
            }
        }
    }
}
