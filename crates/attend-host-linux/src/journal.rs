//! System events from the systemd journal
//!
//! Boot, shutdown, sleep and logind session messages carry a stable catalog
//! `MESSAGE_ID`. Each id is mapped to a raw event code; the codes for
//! sleep and shutdown line up with the ones the inference correction looks
//! for by default.

use async_trait::async_trait;
use attend_host_api::{EventSource, HostError, HostResult, RawEvent};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::{CommandRunner, describe_failure};

/// systemd: startup finished
pub const MESSAGE_STARTUP_FINISHED: &str = "b07a249cd024414a82dd00cd181378ff";
/// systemd: system shutdown initiated
pub const MESSAGE_SHUTDOWN: &str = "98268866d1d54a499c4e98921d93bc40";
/// systemd: system sleep state entered
pub const MESSAGE_SLEEP_START: &str = "6bbd95ee977941e497c48be27c254128";
/// systemd: system sleep state left
pub const MESSAGE_SLEEP_STOP: &str = "8811e6df2a8e40f58a94cea26f8ebf14";
/// logind: new session
pub const MESSAGE_SESSION_START: &str = "8d45620c1a4348dbb17410da57c60c66";
/// logind: session removed
pub const MESSAGE_SESSION_STOP: &str = "3354939424b4456d9802ca8333ed424a";

/// Built-in MESSAGE_ID to raw code mapping
pub fn default_journal_codes() -> BTreeMap<String, u32> {
    [
        (MESSAGE_STARTUP_FINISHED, 6005),
        (MESSAGE_SHUTDOWN, 6006),
        (MESSAGE_SLEEP_START, 42),
        (MESSAGE_SLEEP_STOP, 1),
        (MESSAGE_SESSION_START, 7001),
        (MESSAGE_SESSION_STOP, 7002),
    ]
    .into_iter()
    .map(|(id, code)| (id.to_string(), code))
    .collect()
}

/// One line of `journalctl -o json`
#[derive(Debug, Deserialize)]
struct JournalEntry {
    #[serde(rename = "MESSAGE_ID")]
    message_id: Option<String>,
    #[serde(rename = "__REALTIME_TIMESTAMP")]
    realtime_timestamp: Option<String>,
}

/// [`EventSource`] backed by `journalctl`
pub struct JournalEventSource {
    runner: CommandRunner,
    codes: BTreeMap<String, u32>,
}

impl JournalEventSource {
    /// `overrides` are merged on top of [`default_journal_codes`]
    pub fn new(runner: CommandRunner, overrides: &BTreeMap<String, u32>) -> Self {
        let mut codes = default_journal_codes();
        codes.extend(
            overrides
                .iter()
                .map(|(id, code)| (id.to_ascii_lowercase(), *code)),
        );
        Self { runner, codes }
    }

    pub fn codes(&self) -> &BTreeMap<String, u32> {
        &self.codes
    }

    fn build_args(&self, start: DateTime<Local>, end: DateTime<Local>) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "json".to_string(),
            "--no-pager".to_string(),
            "--quiet".to_string(),
            format!("--since=@{}", start.timestamp()),
            format!("--until=@{}", end.timestamp()),
        ];
        // Repeated matches on the same field are OR-ed by journalctl
        args.extend(self.codes.keys().map(|id| format!("MESSAGE_ID={}", id)));
        args
    }
}

#[async_trait]
impl EventSource for JournalEventSource {
    async fn query_events(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> HostResult<Vec<RawEvent>> {
        let output = match self.runner.output("journalctl", self.build_args(start, end)).await {
            Ok(output) => output,
            Err(HostError::Unsupported(msg)) => {
                warn!(error = %msg, "journalctl unavailable, no system events");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            // An empty or missing journal is reported as a failure status
            // with nothing on stdout
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No journal files") || stderr.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(HostError::QueryFailed(describe_failure("journalctl", &output)));
        }

        let events: Vec<RawEvent> = parse_journal_output(&stdout, &self.codes)
            .into_iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .collect();

        debug!(
            since = %start,
            until = %end,
            count = events.len(),
            "Queried journal"
        );

        Ok(events)
    }
}

/// Parse `journalctl -o json` output, keeping entries whose MESSAGE_ID is
/// mapped. Malformed lines are skipped.
pub fn parse_journal_output(output: &str, codes: &BTreeMap<String, u32>) -> Vec<RawEvent> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping malformed journal line");
                None
            }
        })
        .filter_map(|entry| {
            let code = *codes.get(&entry.message_id?.to_ascii_lowercase())?;
            let micros: i64 = entry.realtime_timestamp?.parse().ok()?;
            let timestamp = DateTime::from_timestamp_micros(micros)?.with_timezone(&Local);
            Some(RawEvent::new(code, timestamp))
        })
        .collect()
}
