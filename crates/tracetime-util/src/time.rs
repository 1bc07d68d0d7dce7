//! Time utilities for tracetimed
//!
//! Elapsed-time accounting is defined purely in terms of successive reads of
//! a [`Clock`]. Production code uses [`SystemClock`]; tests inject a
//! [`ManualClock`] and move it by hand.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `TRACETIME_MOCK_TIME` environment variable can be set
//! to shift the system clock, which advances from the mock instant at the
//! real rate.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "TRACETIME_MOCK_TIME";

const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time, computed once per process.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of "now" for the timer engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real wall clock (with the debug mock-time offset applied).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Start at a fixed, whole-second instant.
    pub fn at_epoch() -> Self {
        let start = Local
            .with_ymd_and_hms(2025, 1, 6, 9, 0, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(start)
    }

    pub fn set(&self, instant: DateTime<Local>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += chrono::Duration::milliseconds(by.as_millis() as i64);
    }

    /// Move the clock backwards (simulates a wall-clock adjustment).
    pub fn rewind(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current -= chrono::Duration::milliseconds(by.as_millis() as i64);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whole seconds from `start` to `end`, truncated.
///
/// A negative delta (the wall clock was moved backwards) counts as zero.
pub fn whole_seconds_between(start: DateTime<Local>, end: DateTime<Local>) -> u64 {
    end.signed_duration_since(start).num_seconds().max(0) as u64
}

/// Format seconds the way the tracker expects durations: `1d2h3m4s`.
///
/// Zero components are omitted; a zero duration is `0s`. Days are 24 hours.
pub fn format_tracker_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}d", days));
    }
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format(MOCK_TIME_FORMAT).to_string()
}
