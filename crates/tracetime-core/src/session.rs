//! Session state machine
//!
//! Pure functions over [`SessionRecord`]. Every transition is computed on a
//! copy; the engine commits the copy with a single store write.

use chrono::{DateTime, Local};
use std::fmt;
use tracetime_api::{SessionStatus, SessionView};
use tracetime_store::SessionRecord;
use tracetime_util::{format_tracker_duration, whole_seconds_between};

use crate::{EngineError, EngineResult};

/// Client-requested state change on an existing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pause,
    Resume,
    Stop,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Stop => "stop",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed whole seconds of a session as of `now`
pub fn elapsed_at(record: &SessionRecord, now: DateTime<Local>) -> u64 {
    match (record.status, record.current_interval_start) {
        (SessionStatus::Running, Some(start)) => record
            .accumulated_seconds
            .saturating_add(whole_seconds_between(start, now)),
        _ => record.accumulated_seconds,
    }
}

/// Compute the record that results from applying `transition` at `now`.
///
/// The input is left untouched; on error nothing needs rolling back.
pub fn apply_transition(
    record: &SessionRecord,
    transition: Transition,
    now: DateTime<Local>,
) -> EngineResult<SessionRecord> {
    let mut next = record.clone();

    match (transition, record.status) {
        (Transition::Pause, SessionStatus::Running) => {
            next.accumulated_seconds = elapsed_at(record, now);
            next.current_interval_start = None;
            next.status = SessionStatus::Paused;
        }
        (Transition::Resume, SessionStatus::Paused) => {
            next.current_interval_start = Some(now);
            next.status = SessionStatus::Running;
        }
        (Transition::Stop, SessionStatus::Running | SessionStatus::Paused) => {
            next.accumulated_seconds = elapsed_at(record, now);
            next.current_interval_start = None;
            next.status = SessionStatus::Finished;
        }
        (operation, status) => {
            return Err(EngineError::InvalidTransition {
                id: record.id,
                status,
                operation,
            });
        }
    }

    Ok(next)
}

/// Fold the whole seconds of the live interval into the accumulated total.
///
/// The interval start advances by exactly the folded amount, so the
/// sub-second remainder stays live and `elapsed_at` is unchanged. Returns
/// `None` when there is nothing to fold.
pub fn fold_live_interval(record: &SessionRecord, now: DateTime<Local>) -> Option<SessionRecord> {
    if record.status != SessionStatus::Running {
        return None;
    }
    let start = record.current_interval_start?;
    let folded = whole_seconds_between(start, now);
    if folded == 0 {
        return None;
    }

    let mut next = record.clone();
    next.accumulated_seconds = record.accumulated_seconds.saturating_add(folded);
    next.current_interval_start = Some(start + chrono::Duration::seconds(folded as i64));
    Some(next)
}

/// Read-only projection handed to clients
pub fn to_view(record: &SessionRecord, now: DateTime<Local>) -> SessionView {
    let elapsed_seconds = elapsed_at(record, now);
    SessionView {
        session_id: record.id,
        group_id: record.group_id,
        project_id: record.project_id,
        issue_id: record.issue_id,
        label: record.label.clone(),
        status: record.status,
        elapsed_seconds,
        elapsed_formatted: format_tracker_duration(elapsed_seconds),
        created_at: record.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tracetime_util::{GroupId, IssueId, ProjectId, SessionId};

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn running_since(start: DateTime<Local>, accumulated: u64) -> SessionRecord {
        SessionRecord {
            id: SessionId::new(1),
            group_id: GroupId::new(1),
            project_id: ProjectId::new(2),
            issue_id: IssueId::new(3),
            label: "dev".into(),
            status: SessionStatus::Running,
            accumulated_seconds: accumulated,
            current_interval_start: Some(start),
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn elapsed_truncates_fractional_seconds() {
        let record = running_since(t0(), 3);
        let now = t0() + chrono::Duration::milliseconds(4_999);
        assert_eq!(elapsed_at(&record, now), 7);
    }

    #[test]
    fn elapsed_ignores_backwards_clock() {
        let record = running_since(t0(), 20);
        assert_eq!(elapsed_at(&record, t0() - secs(60)), 20);
    }

    #[test]
    fn pause_accrues_and_clears_interval() {
        let record = running_since(t0(), 5);
        let paused = apply_transition(&record, Transition::Pause, t0() + secs(8)).unwrap();

        assert_eq!(paused.status, SessionStatus::Paused);
        assert_eq!(paused.accumulated_seconds, 13);
        assert_eq!(paused.current_interval_start, None);
        // Source record is untouched
        assert_eq!(record.status, SessionStatus::Running);
    }

    #[test]
    fn pause_boundary_is_continuous() {
        let record = running_since(t0(), 0);
        let at = t0() + chrono::Duration::milliseconds(9_400);

        let before = elapsed_at(&record, at);
        let paused = apply_transition(&record, Transition::Pause, at).unwrap();
        assert_eq!(elapsed_at(&paused, at), before);
    }

    #[test]
    fn resume_starts_fresh_interval() {
        let mut record = running_since(t0(), 0);
        record = apply_transition(&record, Transition::Pause, t0() + secs(5)).unwrap();

        let resumed = apply_transition(&record, Transition::Resume, t0() + secs(15)).unwrap();
        assert_eq!(resumed.status, SessionStatus::Running);
        assert_eq!(resumed.current_interval_start, Some(t0() + secs(15)));
        assert_eq!(elapsed_at(&resumed, t0() + secs(15)), 5);
    }

    #[test]
    fn stop_from_paused_keeps_total() {
        let mut record = running_since(t0(), 0);
        record = apply_transition(&record, Transition::Pause, t0() + secs(5)).unwrap();

        let stopped = apply_transition(&record, Transition::Stop, t0() + secs(100)).unwrap();
        assert_eq!(stopped.status, SessionStatus::Finished);
        assert_eq!(stopped.accumulated_seconds, 5);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let running = running_since(t0(), 0);
        assert!(matches!(
            apply_transition(&running, Transition::Resume, t0()),
            Err(EngineError::InvalidTransition {
                status: SessionStatus::Running,
                operation: Transition::Resume,
                ..
            })
        ));

        let finished = apply_transition(&running, Transition::Stop, t0()).unwrap();
        for transition in [Transition::Pause, Transition::Resume, Transition::Stop] {
            assert!(apply_transition(&finished, transition, t0()).is_err());
        }
    }

    #[test]
    fn fold_keeps_elapsed_and_subsecond_remainder() {
        let record = running_since(t0(), 2);
        let now = t0() + chrono::Duration::milliseconds(12_700);

        let folded = fold_live_interval(&record, now).unwrap();
        assert_eq!(folded.accumulated_seconds, 14);
        assert_eq!(folded.current_interval_start, Some(t0() + secs(12)));
        assert_eq!(elapsed_at(&folded, now), elapsed_at(&record, now));

        let later = now + chrono::Duration::milliseconds(400);
        assert_eq!(elapsed_at(&folded, later), elapsed_at(&record, later));
    }

    #[test]
    fn fold_skips_paused_and_fresh_intervals() {
        let record = running_since(t0(), 0);
        assert!(fold_live_interval(&record, t0() + chrono::Duration::milliseconds(900)).is_none());

        let paused = apply_transition(&record, Transition::Pause, t0() + secs(3)).unwrap();
        assert!(fold_live_interval(&paused, t0() + secs(30)).is_none());
    }

    #[test]
    fn view_formats_elapsed() {
        let record = running_since(t0(), 3_600);
        let view = to_view(&record, t0() + secs(125));

        assert_eq!(view.elapsed_seconds, 3_725);
        assert_eq!(view.elapsed_formatted, "1h2m5s");
        assert_eq!(view.status, SessionStatus::Running);
    }
}
