//! SQLite-based store implementation

use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracetime_api::SessionStatus;
use tracetime_util::{GroupId, IssueId, ProjectId, SessionId};
use tracing::{debug, warn};

use crate::{AuditEvent, NewSession, SessionRecord, Store, StoreError, StoreResult};

const SESSION_COLUMNS: &str = "id, group_id, project_id, issue_id, label, status, \
     accumulated_seconds, current_interval_start, created_at, updated_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("Store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- One row per session; ids are never reused
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                project_id INTEGER NOT NULL,
                issue_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                status TEXT NOT NULL,
                accumulated_seconds INTEGER NOT NULL DEFAULT 0,
                current_interval_start TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Ids of open sessions; at most two are fetched, which is enough to spot a violation.
fn open_session_ids(conn: &Connection) -> StoreResult<Vec<SessionId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM sessions WHERE status IN ('idle', 'running', 'paused') ORDER BY id LIMIT 2",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .map(|r| r.map(SessionId::new))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn format_timestamp(dt: &DateTime<Local>) -> String {
    // UTC with fixed precision so the text sorts chronologically
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::CorruptState(format!("invalid timestamp '{}': {}", value, e)))
}

/// Raw column values, converted outside the rusqlite row closure
struct SessionRow {
    id: i64,
    group_id: i64,
    project_id: i64,
    issue_id: i64,
    label: String,
    status: String,
    accumulated_seconds: i64,
    current_interval_start: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            project_id: row.get(2)?,
            issue_id: row.get(3)?,
            label: row.get(4)?,
            status: row.get(5)?,
            accumulated_seconds: row.get(6)?,
            current_interval_start: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> StoreResult<SessionRecord> {
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::CorruptState(format!("session {}: {}", self.id, e)))?;

        let current_interval_start = self
            .current_interval_start
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        if (status == SessionStatus::Running) != current_interval_start.is_some() {
            return Err(StoreError::CorruptState(format!(
                "session {} is {} but interval start is {}",
                self.id,
                status,
                if current_interval_start.is_some() { "set" } else { "missing" }
            )));
        }

        if self.accumulated_seconds < 0 {
            return Err(StoreError::CorruptState(format!(
                "session {} has negative accumulated time",
                self.id
            )));
        }

        Ok(SessionRecord {
            id: SessionId::new(self.id),
            group_id: GroupId::new(self.group_id),
            project_id: ProjectId::new(self.project_id),
            issue_id: IssueId::new(self.issue_id),
            label: self.label,
            status,
            accumulated_seconds: self.accumulated_seconds as u64,
            current_interval_start,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl Store for SqliteStore {
    fn insert_session(&self, session: &NewSession) -> StoreResult<SessionRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if session.status.is_open() {
            if let Some(existing) = open_session_ids(&tx)?.first().copied() {
                return Err(StoreError::OpenSessionConflict { existing });
            }
        }

        let updated_at = session.created_at;
        tx.execute(
            r#"
            INSERT INTO sessions (group_id, project_id, issue_id, label, status,
                                  accumulated_seconds, current_interval_start, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)
            "#,
            params![
                session.group_id.as_i64(),
                session.project_id.as_i64(),
                session.issue_id.as_i64(),
                session.label,
                session.status.as_str(),
                session.current_interval_start.as_ref().map(format_timestamp),
                format_timestamp(&session.created_at),
                format_timestamp(&updated_at),
            ],
        )?;
        let id = SessionId::new(tx.last_insert_rowid());
        tx.commit()?;

        debug!(session_id = %id, status = %session.status, "Session inserted");

        Ok(SessionRecord {
            id,
            group_id: session.group_id,
            project_id: session.project_id,
            issue_id: session.issue_id,
            label: session.label.clone(),
            status: session.status,
            accumulated_seconds: 0,
            current_interval_start: session.current_interval_start,
            created_at: session.created_at,
            updated_at,
        })
    }

    fn put_session(&self, session: &mut SessionRecord, now: DateTime<Local>) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if session.is_open() {
            let others = open_session_ids(&tx)?;
            if let Some(existing) = others.into_iter().find(|id| *id != session.id) {
                return Err(StoreError::OpenSessionConflict { existing });
            }
        }

        let changed = tx.execute(
            r#"
            UPDATE sessions
            SET group_id = ?2, project_id = ?3, issue_id = ?4, label = ?5, status = ?6,
                accumulated_seconds = ?7, current_interval_start = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
            params![
                session.id.as_i64(),
                session.group_id.as_i64(),
                session.project_id.as_i64(),
                session.issue_id.as_i64(),
                session.label,
                session.status.as_str(),
                session.accumulated_seconds as i64,
                session.current_interval_start.as_ref().map(format_timestamp),
                format_timestamp(&now),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(session.id));
        }
        tx.commit()?;

        session.updated_at = now;
        debug!(
            session_id = %session.id,
            status = %session.status,
            accumulated_seconds = session.accumulated_seconds,
            "Session written"
        );
        Ok(())
    }

    fn get_session(&self, id: SessionId) -> StoreResult<SessionRecord> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
                [id.as_i64()],
                SessionRow::read,
            )
            .optional()?;

        match row {
            Some(row) => row.into_record(),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn get_open_session(&self) -> StoreResult<Option<SessionRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions WHERE status IN ('idle', 'running', 'paused') ORDER BY id LIMIT 2",
            SESSION_COLUMNS
        ))?;
        let mut rows = stmt
            .query_map([], SessionRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.len() > 1 {
            warn!(
                first = rows[0].id,
                second = rows[1].id,
                "More than one open session in store"
            );
            return Err(StoreError::CorruptState(format!(
                "sessions {} and {} are both open",
                rows[0].id, rows[1].id
            )));
        }

        rows.pop().map(SessionRow::into_record).transpose()
    }

    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY updated_at DESC, id DESC LIMIT ?",
            SESSION_COLUMNS
        ))?;
        let rows = stmt
            .query_map([limit as i64], SessionRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| tracetime_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
