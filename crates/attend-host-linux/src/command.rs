//! Bounded external command execution

use attend_host_api::{HostError, HostResult};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs external programs with a per-call time limit
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    /// Program name -> command line run in its place, e.g. `sudo -n shutdown`
    programs: BTreeMap<String, Vec<String>>,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            programs: BTreeMap::new(),
        }
    }

    /// Run `command` (followed by the caller's arguments) whenever `program`
    /// is requested. An empty command is ignored.
    pub fn with_program<I, S>(mut self, program: &str, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if !command.is_empty() {
            self.programs.insert(program.to_string(), command);
        }
        self
    }

    /// Apply every override from a program -> command map
    pub fn with_programs(self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        overrides
            .iter()
            .fold(self, |runner, (program, command)| {
                runner.with_program(program, command.iter().cloned())
            })
    }

    /// Run `program` with `args`, capturing its output.
    ///
    /// A non-zero exit status is not an error here; callers inspect
    /// `Output::status` themselves.
    pub async fn output<I, S>(&self, program: &str, args: I) -> HostResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.output_with_timeout(program, args, self.timeout).await
    }

    /// Like [`output`](Self::output) with an explicit time limit, for
    /// commands that wait on the user
    pub async fn output_with_timeout<I, S>(
        &self,
        program: &str,
        args: I,
        limit: Duration,
    ) -> HostResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = match self.programs.get(program).and_then(|c| c.split_first()) {
            Some((exe, prefix)) => {
                let mut cmd = Command::new(exe);
                cmd.args(prefix);
                cmd
            }
            None => Command::new(program),
        };
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_display_env(&mut cmd);

        debug!(program = %program, timeout_secs = limit.as_secs(), "Running command");

        match tokio::time::timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(HostError::Unsupported(
                format!("{} is not installed", program),
            )),
            Ok(Err(e)) => Err(HostError::Io(e)),
            Err(_) => Err(HostError::Timeout(limit)),
        }
    }
}

/// A daemon started outside the graphical session usually lacks the
/// variables X11 tools need to reach the display.
fn apply_display_env(cmd: &mut Command) {
    if std::env::var_os("DISPLAY").is_none() {
        cmd.env("DISPLAY", ":0");
    }
    if std::env::var_os("XAUTHORITY").is_none()
        && let Some(home) = dirs::home_dir()
    {
        let xauthority = home.join(".Xauthority");
        if xauthority.exists() {
            cmd.env("XAUTHORITY", xauthority);
        }
    }
}

/// First line of stdout, trimmed
pub fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Describe a failed command for error messages
pub fn describe_failure(program: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} exited with {}", program, output.status)
    } else {
        format!("{} exited with {}: {}", program, output.status, stderr)
    }
}
