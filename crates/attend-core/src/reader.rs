//! System event log reader
//!
//! Turns the host's raw, unordered event stream into a time-ordered
//! sequence of [`SystemEvent`]s with platform-independent codes.

use attend_host_api::{EventSource, RawEvent};
use attend_util::{start_of_day, truncate_to_seconds};
use chrono::{DateTime, Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A power or session event with its canonical code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub raw_code: u32,
    /// Low 16 bits of `raw_code`
    pub canonical_code: u16,
    pub timestamp: DateTime<Local>,
}

impl SystemEvent {
    pub fn new(raw_code: u32, timestamp: DateTime<Local>) -> Self {
        Self {
            raw_code,
            canonical_code: canonical_code(raw_code),
            timestamp: truncate_to_seconds(timestamp),
        }
    }
}

impl From<RawEvent> for SystemEvent {
    fn from(raw: RawEvent) -> Self {
        Self::new(raw.raw_code, raw.timestamp)
    }
}

/// Mask a platform event code to its low 16 bits
pub fn canonical_code(raw_code: u32) -> u16 {
    (raw_code & 0xFFFF) as u16
}

/// Reads a day's events plus enough history to find the previous one
pub struct EventLogReader {
    source: Arc<dyn EventSource>,
    max_lookback_days: u32,
}

impl EventLogReader {
    pub fn new(source: Arc<dyn EventSource>, max_lookback_days: u32) -> Self {
        Self {
            source,
            max_lookback_days: max_lookback_days.max(1),
        }
    }

    /// Events of `day`, preceded by every event from the calendar day of the
    /// nearest earlier event (within the lookback limit), sorted ascending.
    ///
    /// An unavailable source yields an empty sequence.
    pub async fn events(&self, day: NaiveDate) -> Vec<SystemEvent> {
        let day_start = start_of_day(day);
        let day_end = match day.checked_add_days(Days::new(1)) {
            Some(next) => start_of_day(next),
            None => day_start + chrono::Duration::hours(24),
        };

        let mut lookback: u32 = 1;
        let mut events: Vec<SystemEvent> = Vec::new();

        loop {
            let Some(window_start) = day
                .checked_sub_days(Days::new(lookback as u64))
                .map(start_of_day)
            else {
                break;
            };

            match self.source.query_events(window_start, day_end).await {
                Ok(raw) => {
                    events = raw.into_iter().map(SystemEvent::from).collect();
                }
                Err(e) => {
                    warn!(
                        day = %day,
                        lookback_days = lookback,
                        error = %e,
                        "Event log unavailable"
                    );
                    break;
                }
            }

            let has_prior = events.iter().any(|e| e.timestamp < day_start);
            if has_prior || lookback >= self.max_lookback_days {
                break;
            }
            lookback = (lookback * 2).min(self.max_lookback_days);
        }

        events.sort_by_key(|e| e.timestamp);

        debug!(
            day = %day,
            lookback_days = lookback,
            count = events.len(),
            "Read system events"
        );

        events
    }
}
