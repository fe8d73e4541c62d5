//! Work interval inference
//!
//! The start of work is the first system event of the day. The end of the
//! previous working session is the last event before it, unless that event
//! is implausibly late: machines left asleep overnight often log their final
//! shutdown hours after the user went home. In that case the earliest
//! "unexpected session end" event of that evening is used instead.

use attend_config::InferenceSettings;
use attend_host_api::EventSource;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{EventLogReader, SystemEvent};

/// One inferred workday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkInterval {
    pub start: DateTime<Local>,
    /// End of the previous working session; precedes `start` when it
    /// belongs to an earlier day
    pub end: Option<DateTime<Local>>,
}

/// Result of one inference attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceOutcome {
    Interval(WorkInterval),
    /// No event for the requested day has been logged yet
    NoResult,
}

impl InferenceOutcome {
    pub fn interval(self) -> Option<WorkInterval> {
        match self {
            Self::Interval(interval) => Some(interval),
            Self::NoResult => None,
        }
    }
}

/// Infer the work interval for `today` from an event sequence in any order
pub fn infer_from_events(
    events: &[SystemEvent],
    today: NaiveDate,
    settings: &InferenceSettings,
) -> InferenceOutcome {
    let mut sorted = events.to_vec();
    sorted.sort_by_key(|e| e.timestamp);

    let Some(first_idx) = sorted.iter().position(|e| e.timestamp.date_naive() == today) else {
        return InferenceOutcome::NoResult;
    };
    let earliest_today = sorted[first_idx];

    let previous = sorted[..first_idx]
        .iter()
        .rev()
        .find(|e| e.timestamp < earliest_today.timestamp)
        .copied();

    let end = previous.map(|prev| {
        if prev.timestamp.hour() < settings.late_hour as u32 {
            return prev;
        }
        match late_shutdown_correction(&sorted, prev.timestamp.date_naive(), settings) {
            Some(corrected) => {
                debug!(
                    logged = %prev.timestamp,
                    corrected = %corrected.timestamp,
                    code = corrected.canonical_code,
                    "Late shutdown corrected"
                );
                corrected
            }
            None => prev,
        }
    });

    InferenceOutcome::Interval(WorkInterval {
        start: earliest_today.timestamp,
        end: end.map(|e| e.timestamp),
    })
}

/// Earliest target-code event on `date` between the window start and 23:59:59
fn late_shutdown_correction(
    sorted: &[SystemEvent],
    date: NaiveDate,
    settings: &InferenceSettings,
) -> Option<SystemEvent> {
    let window_start = settings.correction_window_start.to_naive_time();

    sorted
        .iter()
        .filter(|e| e.timestamp.date_naive() == date && e.timestamp.time() >= window_start)
        .filter(|e| settings.target_codes.contains(&e.canonical_code))
        .min_by_key(|e| e.timestamp)
        .copied()
}

/// Infers the work interval from the live event log
pub struct AttendanceInferencer {
    reader: EventLogReader,
    settings: InferenceSettings,
}

impl AttendanceInferencer {
    pub fn new(source: Arc<dyn EventSource>, settings: InferenceSettings) -> Self {
        Self {
            reader: EventLogReader::new(source, settings.max_lookback_days),
            settings,
        }
    }

    pub async fn infer(&self, today: NaiveDate) -> InferenceOutcome {
        let events = self.reader.events(today).await;
        let outcome = infer_from_events(&events, today, &self.settings);

        match &outcome {
            InferenceOutcome::Interval(interval) => info!(
                today = %today,
                start = %interval.start,
                end = ?interval.end.map(|e| e.to_string()),
                "Work interval inferred"
            ),
            InferenceOutcome::NoResult => debug!(
                today = %today,
                events = events.len(),
                "No event logged today yet"
            ),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_host_api::MockHost;
    use attend_util::WallClock;
    use chrono::TimeZone;

    fn ev(code: u32, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> SystemEvent {
        SystemEvent::new(code, Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap())
    }

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn settings() -> InferenceSettings {
        InferenceSettings::default()
    }

    #[test]
    fn late_shutdown_is_corrected() {
        let events = vec![
            ev(42, 2024, 4, 30, 19, 58),
            ev(6006, 2024, 4, 30, 23, 40),
            ev(6005, 2024, 5, 1, 8, 5),
        ];

        let outcome = infer_from_events(&events, may_first(), &settings());
        assert_eq!(
            outcome,
            InferenceOutcome::Interval(WorkInterval {
                start: ev(0, 2024, 5, 1, 8, 5).timestamp,
                end: Some(ev(0, 2024, 4, 30, 19, 58).timestamp),
            })
        );
    }

    #[test]
    fn early_previous_passes_through() {
        let events = vec![
            ev(42, 2024, 4, 30, 18, 40),
            ev(6006, 2024, 4, 30, 19, 10),
            ev(6005, 2024, 5, 1, 8, 5),
        ];

        let interval = infer_from_events(&events, may_first(), &settings())
            .interval()
            .unwrap();
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 19, 10).timestamp));
    }

    #[test]
    fn correction_picks_earliest_match() {
        let events = vec![
            ev(6006, 2024, 4, 30, 23, 50),
            ev(1002, 2024, 4, 30, 21, 15),
            ev(6005, 2024, 5, 1, 8, 5),
            ev(42, 2024, 4, 30, 20, 0),
            // Outside the window
            ev(42, 2024, 4, 30, 18, 0),
            ev(26, 2024, 4, 30, 22, 30),
        ];

        let interval = infer_from_events(&events, may_first(), &settings())
            .interval()
            .unwrap();
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 20, 0).timestamp));
    }

    #[test]
    fn correction_matches_canonical_code() {
        let events = vec![
            ev(0x8000_0000 | 4001, 2024, 4, 30, 19, 0),
            ev(6006, 2024, 4, 30, 22, 15),
            ev(6005, 2024, 5, 1, 8, 0),
        ];

        let interval = infer_from_events(&events, may_first(), &settings())
            .interval()
            .unwrap();
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 19, 0).timestamp));
    }

    #[test]
    fn late_previous_without_match_is_kept() {
        let events = vec![
            ev(7002, 2024, 4, 30, 19, 0),
            ev(6006, 2024, 4, 30, 23, 40),
            ev(6005, 2024, 5, 1, 8, 5),
        ];

        let interval = infer_from_events(&events, may_first(), &settings())
            .interval()
            .unwrap();
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 23, 40).timestamp));
    }

    #[test]
    fn threshold_is_configurable() {
        let events = vec![
            ev(42, 2024, 4, 30, 19, 58),
            ev(6006, 2024, 4, 30, 22, 40),
            ev(6005, 2024, 5, 1, 8, 5),
        ];
        let strict = InferenceSettings {
            late_hour: 23,
            ..settings()
        };

        let interval = infer_from_events(&events, may_first(), &strict)
            .interval()
            .unwrap();
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 22, 40).timestamp));

        let early_window = InferenceSettings {
            late_hour: 22,
            correction_window_start: WallClock::new(20, 0).unwrap(),
            ..settings()
        };
        let interval = infer_from_events(&events, may_first(), &early_window)
            .interval()
            .unwrap();
        // 19:58 is before the window
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 30, 22, 40).timestamp));
    }

    #[test]
    fn only_today_event_determines_start() {
        let today_event = ev(7001, 2024, 5, 1, 9, 30);
        let events = vec![
            ev(6005, 2024, 4, 29, 8, 0),
            ev(6006, 2024, 4, 29, 17, 0),
            today_event,
            ev(6005, 2024, 5, 2, 7, 0),
        ];

        let interval = infer_from_events(&events, may_first(), &settings())
            .interval()
            .unwrap();
        assert_eq!(interval.start, today_event.timestamp);
        assert_eq!(interval.end, Some(ev(0, 2024, 4, 29, 17, 0).timestamp));
    }

    #[test]
    fn no_event_today_is_no_result() {
        let events = vec![ev(6006, 2024, 4, 30, 19, 0)];
        assert_eq!(
            infer_from_events(&events, may_first(), &settings()),
            InferenceOutcome::NoResult
        );
        assert_eq!(
            infer_from_events(&[], may_first(), &settings()),
            InferenceOutcome::NoResult
        );
    }

    #[test]
    fn first_day_has_no_end() {
        let events = vec![ev(6005, 2024, 5, 1, 8, 5)];
        let outcome = infer_from_events(&events, may_first(), &settings());
        assert_ne!(outcome, InferenceOutcome::NoResult);
        assert_eq!(outcome.interval().unwrap().end, None);
    }

    #[tokio::test]
    async fn inferencer_is_idempotent() {
        let host = Arc::new(MockHost::new());
        host.push_event(6005, Local.with_ymd_and_hms(2024, 5, 1, 8, 5, 0).unwrap());
        host.push_event(6006, Local.with_ymd_and_hms(2024, 4, 30, 23, 40, 0).unwrap());
        host.push_event(42, Local.with_ymd_and_hms(2024, 4, 30, 19, 58, 0).unwrap());

        let inferencer = AttendanceInferencer::new(host, settings());
        let first = inferencer.infer(may_first()).await;
        let second = inferencer.infer(may_first()).await;

        assert_eq!(first, second);
        assert_eq!(
            first.interval().unwrap().end,
            Some(Local.with_ymd_and_hms(2024, 4, 30, 19, 58, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn inferencer_without_log_is_no_result() {
        let host = Arc::new(MockHost::new());
        host.set_fail_events(true);

        let inferencer = AttendanceInferencer::new(host, settings());
        assert_eq!(inferencer.infer(may_first()).await, InferenceOutcome::NoResult);
    }
}
