//! Core timer engine

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use tracetime_api::{SessionStatus, SessionView};
use tracetime_store::{AuditEvent, AuditEventType, NewSession, SessionRecord, Store};
use tracetime_util::{Clock, GroupId, IssueId, ProjectId, SessionId};
use tracing::{debug, info, warn};

use crate::{
    apply_transition, elapsed_at, fold_live_interval, to_view, CoreEvent, EngineError,
    EngineResult, Transition,
};

/// Result of a state-changing operation
#[derive(Debug, Clone)]
pub struct Transitioned {
    /// Projection after the change was committed
    pub session: SessionView,
    pub event: CoreEvent,
}

/// Result of `resume_last` when an open session exists
#[derive(Debug, Clone)]
pub struct Recovery {
    pub session: SessionView,
    /// Present only for the first recovery of this engine instance
    pub event: Option<CoreEvent>,
}

/// State guarded by the open-session lock
#[derive(Debug, Default)]
struct Slot {
    /// Whether the open session has been picked up (or created) by this
    /// instance. Only the first pick-up re-stamps a running interval.
    recovered: bool,
}

/// The session timer engine.
///
/// Sole writer of session records. Every operation that reads or writes the
/// open session holds the slot lock for its whole check-transition-persist
/// sequence.
pub struct TimerEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    slot: Mutex<Slot>,
}

impl TimerEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        info!("Timer engine initialized");
        Self {
            store,
            clock,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        // The slot only holds a flag; a panic elsewhere cannot leave it torn
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::at(event, self.clock.now())) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    /// Open a new session and start its first interval
    pub fn start(
        &self,
        group_id: GroupId,
        project_id: ProjectId,
        issue_id: IssueId,
        label: &str,
    ) -> EngineResult<Transitioned> {
        if !group_id.is_valid() {
            return Err(EngineError::InvalidArgument(format!(
                "group id must be positive, got {}",
                group_id
            )));
        }
        if !project_id.is_valid() {
            return Err(EngineError::InvalidArgument(format!(
                "project id must be positive, got {}",
                project_id
            )));
        }
        if !issue_id.is_valid() {
            return Err(EngineError::InvalidArgument(format!(
                "issue id must be positive, got {}",
                issue_id
            )));
        }
        let label = label.trim();
        if label.is_empty() {
            return Err(EngineError::InvalidArgument("label must not be empty".into()));
        }

        let mut slot = self.lock_slot();

        if let Some(open) = self.store.get_open_session()? {
            debug!(open_session = %open.id, "Start refused, a session is already open");
            return Err(EngineError::SessionAlreadyOpen(open.id));
        }

        let now = self.clock.now();
        let record = self.store.insert_session(&NewSession {
            group_id,
            project_id,
            issue_id,
            label: label.to_string(),
            status: SessionStatus::Running,
            current_interval_start: Some(now),
            created_at: now,
        })?;
        slot.recovered = true;

        info!(
            session_id = %record.id,
            group_id = %group_id,
            project_id = %project_id,
            issue_id = %issue_id,
            label = %record.label,
            "Session started"
        );

        self.audit(AuditEventType::SessionStarted {
            session_id: record.id,
            group_id,
            project_id,
            issue_id,
            label: record.label.clone(),
        });

        let session = to_view(&record, now);
        Ok(Transitioned {
            event: CoreEvent::SessionStarted {
                session: session.clone(),
            },
            session,
        })
    }

    pub fn pause(&self, id: SessionId) -> EngineResult<Transitioned> {
        self.transition(id, Transition::Pause)
    }

    pub fn resume(&self, id: SessionId) -> EngineResult<Transitioned> {
        self.transition(id, Transition::Resume)
    }

    /// Finish a session. Finished sessions are terminal.
    pub fn stop(&self, id: SessionId) -> EngineResult<Transitioned> {
        self.transition(id, Transition::Stop)
    }

    fn transition(&self, id: SessionId, transition: Transition) -> EngineResult<Transitioned> {
        let mut slot = self.lock_slot();

        let current = self.store.get_session(id)?;
        let now = self.clock.now();
        let mut next = apply_transition(&current, transition, now)?;
        self.store.put_session(&mut next, now)?;
        slot.recovered = true;

        let elapsed_seconds = elapsed_at(&next, now);
        info!(
            session_id = %id,
            operation = %transition,
            from = %current.status,
            to = %next.status,
            elapsed_seconds,
            "Session transitioned"
        );

        let event = match transition {
            Transition::Pause => {
                self.audit(AuditEventType::SessionPaused {
                    session_id: id,
                    accumulated_seconds: next.accumulated_seconds,
                });
                CoreEvent::SessionPaused {
                    session_id: id,
                    elapsed_seconds,
                }
            }
            Transition::Resume => {
                self.audit(AuditEventType::SessionResumed { session_id: id });
                CoreEvent::SessionResumed {
                    session_id: id,
                    elapsed_seconds,
                }
            }
            Transition::Stop => {
                self.audit(AuditEventType::SessionFinished {
                    session_id: id,
                    elapsed_seconds,
                });
                CoreEvent::SessionFinished {
                    session_id: id,
                    elapsed_seconds,
                }
            }
        };

        Ok(Transitioned {
            session: to_view(&next, now),
            event,
        })
    }

    /// Elapsed whole seconds of a session. Read only.
    pub fn elapsed(&self, id: SessionId) -> EngineResult<u64> {
        let _slot = self.lock_slot();
        let record = self.store.get_session(id)?;
        Ok(elapsed_at(&record, self.clock.now()))
    }

    /// Pick up the open session, if any.
    ///
    /// The first call on an engine instance re-stamps a running interval to
    /// now, so time between an unclean shutdown and this call is not counted.
    /// Later calls only read.
    pub fn resume_last(&self) -> EngineResult<Option<Recovery>> {
        let mut slot = self.lock_slot();

        let record = match self.store.get_open_session()? {
            Some(record) if record.is_open() => record,
            _ => {
                slot.recovered = true;
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if slot.recovered {
            return Ok(Some(Recovery {
                session: to_view(&record, now),
                event: None,
            }));
        }

        let previous_status = record.status;
        let record = self.restamp(record, now)?;
        slot.recovered = true;

        info!(
            session_id = %record.id,
            status = %record.status,
            accumulated_seconds = record.accumulated_seconds,
            "Recovered open session"
        );
        self.audit(AuditEventType::SessionRecovered {
            session_id: record.id,
            status: record.status,
            accumulated_seconds: record.accumulated_seconds,
        });

        let session = to_view(&record, now);
        Ok(Some(Recovery {
            event: Some(CoreEvent::SessionRecovered {
                session: session.clone(),
                previous_status,
            }),
            session,
        }))
    }

    fn restamp(&self, mut record: SessionRecord, now: DateTime<Local>) -> EngineResult<SessionRecord> {
        if record.status == SessionStatus::Running {
            if let Some(stale) = record.current_interval_start {
                debug!(
                    session_id = %record.id,
                    stale_start = %stale,
                    "Discarding interval interrupted by shutdown"
                );
            }
            record.current_interval_start = Some(now);
            self.store.put_session(&mut record, now)?;
        }
        Ok(record)
    }

    /// Fold completed seconds of the running interval into the stored total.
    ///
    /// Returns whether a write happened. `elapsed` is unchanged by a checkpoint.
    pub fn checkpoint(&self) -> EngineResult<bool> {
        let _slot = self.lock_slot();

        let Some(record) = self.store.get_open_session()? else {
            return Ok(false);
        };
        let now = self.clock.now();
        let Some(mut next) = fold_live_interval(&record, now) else {
            return Ok(false);
        };

        self.store.put_session(&mut next, now)?;
        debug!(
            session_id = %next.id,
            accumulated_seconds = next.accumulated_seconds,
            "Checkpointed running session"
        );
        Ok(true)
    }

    /// Projection of the open session, if any. Read only.
    pub fn open_session(&self) -> EngineResult<Option<SessionView>> {
        let _slot = self.lock_slot();
        let now = self.clock.now();
        Ok(self
            .store
            .get_open_session()?
            .map(|record| to_view(&record, now)))
    }

    /// Most recently touched sessions, newest first
    pub fn history(&self, limit: usize) -> EngineResult<Vec<SessionView>> {
        let now = self.clock.now();
        Ok(self
            .store
            .recent_sessions(limit)?
            .iter()
            .map(|record| to_view(record, now))
            .collect())
    }

    pub fn is_store_healthy(&self) -> bool {
        self.store.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracetime_store::SqliteStore;
    use tracetime_util::ManualClock;

    fn make_engine() -> (TimerEngine, Arc<ManualClock>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::at_epoch());
        let engine = TimerEngine::new(store.clone(), clock.clone());
        (engine, clock, store)
    }

    fn start_default(engine: &TimerEngine) -> EngineResult<Transitioned> {
        engine.start(GroupId::new(1), ProjectId::new(2), IssueId::new(3), "dev")
    }

    #[test]
    fn test_start_creates_running_session() {
        let (engine, _clock, store) = make_engine();

        let started = start_default(&engine).unwrap();
        assert_eq!(started.session.session_id, SessionId::new(1));
        assert_eq!(started.session.status, SessionStatus::Running);
        assert_eq!(started.session.elapsed_seconds, 0);
        assert!(matches!(started.event, CoreEvent::SessionStarted { .. }));

        let stored = store.get_session(started.session.session_id).unwrap();
        assert_eq!(stored.accumulated_seconds, 0);
        assert!(stored.current_interval_start.is_some());
    }

    #[test]
    fn test_start_validates_arguments() {
        let (engine, _clock, store) = make_engine();

        let bad = [
            engine.start(GroupId::new(0), ProjectId::new(2), IssueId::new(3), "dev"),
            engine.start(GroupId::new(1), ProjectId::new(-2), IssueId::new(3), "dev"),
            engine.start(GroupId::new(1), ProjectId::new(2), IssueId::new(0), "dev"),
            engine.start(GroupId::new(1), ProjectId::new(2), IssueId::new(3), "   "),
        ];
        for result in bad {
            assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
        }
        assert!(store.get_open_session().unwrap().is_none());
    }

    #[test]
    fn test_label_is_trimmed() {
        let (engine, _clock, _store) = make_engine();
        let started = engine
            .start(GroupId::new(1), ProjectId::new(2), IssueId::new(3), "  review ")
            .unwrap();
        assert_eq!(started.session.label, "review");
    }

    #[test]
    fn test_elapsed_advances_with_clock() {
        let (engine, clock, _store) = make_engine();
        let id = start_default(&engine).unwrap().session.session_id;

        clock.advance(Duration::from_millis(2_500));
        assert_eq!(engine.elapsed(id).unwrap(), 2);
        clock.advance(Duration::from_millis(600));
        assert_eq!(engine.elapsed(id).unwrap(), 3);
    }

    #[test]
    fn test_elapsed_unknown_session() {
        let (engine, _clock, _store) = make_engine();
        assert!(matches!(
            engine.elapsed(SessionId::new(7)),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_resume_last_with_empty_store() {
        let (engine, _clock, _store) = make_engine();
        assert!(engine.resume_last().unwrap().is_none());
    }

    #[test]
    fn test_resume_last_in_same_process_does_not_restamp() {
        let (engine, clock, _store) = make_engine();
        let id = start_default(&engine).unwrap().session.session_id;

        clock.advance(Duration::from_secs(30));
        let recovery = engine.resume_last().unwrap().unwrap();
        assert_eq!(recovery.session.session_id, id);
        assert_eq!(recovery.session.elapsed_seconds, 30);
        assert!(recovery.event.is_none());
        assert_eq!(engine.elapsed(id).unwrap(), 30);
    }

    #[test]
    fn test_checkpoint_only_writes_when_running() {
        let (engine, clock, store) = make_engine();
        assert!(!engine.checkpoint().unwrap());

        let id = start_default(&engine).unwrap().session.session_id;
        clock.advance(Duration::from_millis(10_250));
        assert!(engine.checkpoint().unwrap());
        assert_eq!(store.get_session(id).unwrap().accumulated_seconds, 10);
        assert_eq!(engine.elapsed(id).unwrap(), 10);

        engine.pause(id).unwrap();
        clock.advance(Duration::from_secs(60));
        assert!(!engine.checkpoint().unwrap());
    }

    #[test]
    fn test_history_lists_newest_first() {
        let (engine, clock, _store) = make_engine();

        let first = start_default(&engine).unwrap().session.session_id;
        clock.advance(Duration::from_secs(5));
        engine.stop(first).unwrap();

        let second = engine
            .start(GroupId::new(1), ProjectId::new(2), IssueId::new(4), "review")
            .unwrap()
            .session
            .session_id;

        let history = engine.history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, second);
        assert_eq!(history[1].session_id, first);
        assert_eq!(history[1].elapsed_seconds, 5);
        assert_eq!(history[1].status, SessionStatus::Finished);
    }
}
