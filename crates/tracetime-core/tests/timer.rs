//! End-to-end engine behavior against a real SQLite store

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tracetime_api::SessionStatus;
use tracetime_core::{CoreEvent, EngineError, TimerEngine};
use tracetime_store::{SqliteStore, Store};
use tracetime_util::{Clock, GroupId, IssueId, ManualClock, ProjectId, SessionId};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn start(engine: &TimerEngine, issue: i64) -> Result<SessionId, EngineError> {
    engine
        .start(GroupId::new(1), ProjectId::new(2), IssueId::new(issue), "dev")
        .map(|t| t.session.session_id)
}

fn open_count(store: &SqliteStore) -> usize {
    store
        .recent_sessions(100)
        .unwrap()
        .iter()
        .filter(|s| s.is_open())
        .count()
}

#[test]
fn test_pause_resume_stop_scenario() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store.clone(), clock.clone());

    let id = start(&engine, 3).unwrap();
    assert_eq!(id, SessionId::new(1));

    clock.advance(secs(5));
    engine.pause(id).unwrap();
    assert_eq!(engine.elapsed(id).unwrap(), 5);

    clock.advance(secs(10));
    engine.resume(id).unwrap();
    assert_eq!(engine.elapsed(id).unwrap(), 5);

    clock.advance(secs(7));
    let stopped = engine.stop(id).unwrap();
    assert_eq!(stopped.session.elapsed_seconds, 12);
    assert_eq!(stopped.session.elapsed_formatted, "12s");
    assert_eq!(stopped.session.status, SessionStatus::Finished);
    assert_eq!(engine.elapsed(id).unwrap(), 12);

    // Slot is free again
    let next = start(&engine, 4).unwrap();
    assert_eq!(next, SessionId::new(2));
    assert_eq!(open_count(&store), 1);
}

#[test]
fn test_double_start_is_refused() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store.clone(), clock.clone());

    let first = start(&engine, 3).unwrap();
    clock.advance(secs(4));

    let second = start(&engine, 9);
    assert!(matches!(second, Err(EngineError::SessionAlreadyOpen(id)) if id == first));

    assert_eq!(engine.elapsed(first).unwrap(), 4);
    assert_eq!(store.get_session(first).unwrap().status, SessionStatus::Running);
    assert_eq!(open_count(&store), 1);
}

#[test]
fn test_failed_pause_leaves_record_unchanged() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store.clone(), clock.clone());

    let id = start(&engine, 3).unwrap();
    clock.advance(secs(6));
    engine.pause(id).unwrap();
    let before = store.get_session(id).unwrap();

    clock.advance(secs(3));
    assert!(matches!(
        engine.pause(id),
        Err(EngineError::InvalidTransition {
            status: SessionStatus::Paused,
            ..
        })
    ));
    assert_eq!(store.get_session(id).unwrap(), before);

    engine.stop(id).unwrap();
    let finished = store.get_session(id).unwrap();
    assert!(engine.pause(id).is_err());
    assert!(engine.resume(id).is_err());
    assert!(engine.stop(id).is_err());
    assert_eq!(store.get_session(id).unwrap(), finished);

    assert!(matches!(
        engine.pause(SessionId::new(42)),
        Err(EngineError::NotFound(_))
    ));
    assert_eq!(open_count(&store), 0);
}

#[test]
fn test_elapsed_is_non_decreasing_within_interval() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store, clock.clone());

    let id = start(&engine, 3).unwrap();
    let mut last = 0;
    for _ in 0..25 {
        clock.advance(Duration::from_millis(370));
        let now = engine.elapsed(id).unwrap();
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 9);
}

#[test]
fn test_backwards_clock_never_subtracts() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store, clock.clone());

    let id = start(&engine, 3).unwrap();
    clock.advance(secs(20));
    engine.pause(id).unwrap();
    engine.resume(id).unwrap();

    clock.rewind(secs(300));
    assert_eq!(engine.elapsed(id).unwrap(), 20);

    let stopped = engine.stop(id).unwrap();
    assert_eq!(stopped.session.elapsed_seconds, 20);
}

#[test]
fn test_restart_excludes_downtime() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tracetime.db");
    let clock = Arc::new(ManualClock::at_epoch());

    let id = {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let engine = TimerEngine::new(store, clock.clone());
        let id = start(&engine, 3).unwrap();
        clock.advance(secs(8));
        engine.pause(id).unwrap();
        engine.resume(id).unwrap();
        clock.advance(secs(2));
        id
    };

    // Process is gone for an hour
    clock.advance(secs(3600));

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let engine = TimerEngine::new(store, clock.clone());
    let recovery = engine.resume_last().unwrap().unwrap();

    assert_eq!(recovery.session.session_id, id);
    assert_eq!(recovery.session.status, SessionStatus::Running);
    assert_eq!(recovery.session.elapsed_seconds, 8);
    assert!(matches!(
        recovery.event,
        Some(CoreEvent::SessionRecovered {
            previous_status: SessionStatus::Running,
            ..
        })
    ));

    clock.advance(secs(5));
    assert_eq!(engine.elapsed(id).unwrap(), 13);

    // A second call is a plain read
    let again = engine.resume_last().unwrap().unwrap();
    assert_eq!(again.session.elapsed_seconds, 13);
    assert!(again.event.is_none());
}

#[test]
fn test_restart_keeps_checkpointed_time() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tracetime.db");
    let clock = Arc::new(ManualClock::at_epoch());

    let id = {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let engine = TimerEngine::new(store, clock.clone());
        let id = start(&engine, 3).unwrap();

        clock.advance(Duration::from_millis(10_400));
        let before = engine.elapsed(id).unwrap();
        assert!(engine.checkpoint().unwrap());
        assert_eq!(engine.elapsed(id).unwrap(), before);

        clock.advance(secs(3));
        id
    };

    clock.advance(secs(600));

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let engine = TimerEngine::new(store, clock.clone());
    let recovery = engine.resume_last().unwrap().unwrap();
    assert_eq!(recovery.session.elapsed_seconds, 10);

    clock.advance(secs(1));
    assert_eq!(engine.elapsed(id).unwrap(), 11);
}

#[test]
fn test_restart_with_paused_session() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("tracetime.db");
    let clock = Arc::new(ManualClock::at_epoch());

    let id = {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let engine = TimerEngine::new(store, clock.clone());
        let id = start(&engine, 3).unwrap();
        clock.advance(secs(42));
        engine.pause(id).unwrap();
        id
    };

    clock.advance(secs(900));

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let engine = TimerEngine::new(store.clone(), clock.clone());
    let recovery = engine.resume_last().unwrap().unwrap();
    assert_eq!(recovery.session.status, SessionStatus::Paused);
    assert_eq!(recovery.session.elapsed_seconds, 42);

    engine.resume(id).unwrap();
    clock.advance(secs(8));
    assert_eq!(engine.stop(id).unwrap().session.elapsed_seconds, 50);
    assert!(engine.resume_last().unwrap().is_none());
}

#[test]
fn test_concurrent_starts_open_one_session() {
    const CALLERS: usize = 16;

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = Arc::new(TimerEngine::new(store.clone(), clock));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                start(&engine, 100 + i as i64)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::SessionAlreadyOpen(_))));

    let open = store.get_open_session().unwrap().unwrap();
    assert_eq!(open.id, *winners[0]);
    assert_eq!(open_count(&store), 1);
}

#[test]
fn test_engines_sharing_a_database_open_one_session() {
    const ENGINES: usize = 4;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracetime.db");
    // Create the schema before the race
    drop(SqliteStore::open(&path).unwrap());

    let barrier = Arc::new(Barrier::new(ENGINES));
    let handles: Vec<_> = (0..ENGINES)
        .map(|i| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let store = Arc::new(SqliteStore::open(&path).unwrap());
                let engine = TimerEngine::new(store, Arc::new(ManualClock::at_epoch()));
                barrier.wait();
                start(&engine, 200 + i as i64)
            })
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();
    assert_eq!(successes, 1);

    let store = SqliteStore::open(&path).unwrap();
    assert!(store.get_open_session().unwrap().is_some());
    assert_eq!(open_count(&store), 1);
}

#[test]
fn test_concurrent_pause_and_stop_settle_cleanly() {
    const CALLERS: usize = 8;

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = Arc::new(TimerEngine::new(store.clone(), clock.clone()));

    let id = start(&engine, 3).unwrap();
    clock.advance(secs(30));

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    ("pause", engine.pause(id).map(|_| ()))
                } else {
                    ("stop", engine.stop(id).map(|_| ()))
                }
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ok = |op: &str| {
        results
            .iter()
            .filter(|(name, r)| *name == op && r.is_ok())
            .count()
    };
    assert_eq!(ok("stop"), 1);
    assert!(ok("pause") <= 1);
    assert!(results
        .iter()
        .filter_map(|(_, r)| r.as_ref().err())
        .all(|e| matches!(e, EngineError::InvalidTransition { .. })));

    // Time is counted once, whichever order the calls landed in
    let record = store.get_session(id).unwrap();
    assert_eq!(record.status, SessionStatus::Finished);
    assert_eq!(record.accumulated_seconds, 30);
    assert!(record.current_interval_start.is_none());
    assert!(store.get_open_session().unwrap().is_none());
}

#[test]
fn test_store_timestamps_follow_engine_clock() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let clock = Arc::new(ManualClock::at_epoch());
    let engine = TimerEngine::new(store.clone(), clock.clone());
    let started_at = clock.now();

    let id = start(&engine, 8).unwrap();
    let record = store.get_session(id).unwrap();
    assert_eq!(record.created_at, started_at);
    assert_eq!(record.updated_at, started_at);

    clock.advance(secs(45));
    engine.pause(id).unwrap();
    let record = store.get_session(id).unwrap();
    assert_eq!(record.created_at, started_at);
    assert_eq!(record.updated_at, clock.now());

    let audits = store.get_recent_audits(1).unwrap();
    assert_eq!(audits[0].timestamp, clock.now());
}
