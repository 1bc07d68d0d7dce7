//! Plain-text rendering of daemon payloads

use tracetime_api::{DirectoryItem, ErrorCode, EventPayload, ResponsePayload, SessionView};

/// Wire name of an error code, e.g. `session_already_open`
pub fn error_code_name(code: ErrorCode) -> String {
    serde_json::to_value(code)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", code))
}

pub fn session_line(s: &SessionView) -> String {
    format!(
        "#{} {:<8} {:>10}  issue {} (project {}, group {})  [{}]",
        s.session_id,
        s.status,
        s.elapsed_formatted,
        s.issue_id,
        s.project_id,
        s.group_id,
        s.label
    )
}

fn directory(items: &[DirectoryItem]) -> String {
    if items.is_empty() {
        return "(none)".into();
    }
    items
        .iter()
        .map(|i| format!("{:>8}  {}", i.id, i.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn payload(payload: &ResponsePayload) -> String {
    match payload {
        ResponsePayload::TimerStarted { session_id } => format!("Started session {}", session_id),
        ResponsePayload::TimerPaused { session_id } => format!("Paused session {}", session_id),
        ResponsePayload::TimerResumed { session_id } => format!("Resumed session {}", session_id),
        ResponsePayload::TimerStopped {
            session_id,
            elapsed_formatted,
            ..
        } => format!("Stopped session {} after {}", session_id, elapsed_formatted),
        ResponsePayload::SessionTime {
            elapsed_formatted, ..
        } => elapsed_formatted.clone(),
        ResponsePayload::LastSession { session } => match session {
            Some(s) => session_line(s),
            None => "No open session".into(),
        },
        ResponsePayload::Config { settings } => format!(
            "url:      {}\nuser:     {} ({})\nlabels:   {}\nusable:   {}",
            settings.url,
            settings.username,
            settings.user_id,
            settings.labels.join(", "),
            settings.is_usable()
        ),
        ResponsePayload::ConfigSaved => "Connection settings saved".into(),
        ResponsePayload::TrackerUser(user) => format!("{} ({})", user.username, user.id),
        ResponsePayload::Groups { groups } => directory(groups),
        ResponsePayload::Projects { projects } => directory(projects),
        ResponsePayload::Issues { issues } => directory(issues),
        ResponsePayload::State(state) => {
            let open = match &state.open_session {
                Some(s) => session_line(s),
                None => "none".into(),
            };
            format!(
                "open session:     {}\nconnection usable: {}",
                open, state.config_usable
            )
        }
        ResponsePayload::History { sessions } => {
            if sessions.is_empty() {
                "(no sessions)".into()
            } else {
                sessions
                    .iter()
                    .map(session_line)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ResponsePayload::Health(h) => format!(
            "live: {}  ready: {}  store: {}  connection: {}",
            h.live, h.ready, h.store_ok, h.config_usable
        ),
        ResponsePayload::Subscribed { client_id } => format!("Subscribed as {}", client_id),
        ResponsePayload::Unsubscribed => "Unsubscribed".into(),
        ResponsePayload::Pong => "pong".into(),
    }
}

pub fn event(payload: &EventPayload) -> String {
    match payload {
        EventPayload::StateChanged(state) => match &state.open_session {
            Some(s) => format!("state: {}", session_line(s)),
            None => "state: no open session".into(),
        },
        EventPayload::SessionStarted { session } => format!("started {}", session_line(session)),
        EventPayload::SessionPaused {
            session_id,
            elapsed_seconds,
        } => format!("paused #{} at {}s", session_id, elapsed_seconds),
        EventPayload::SessionResumed {
            session_id,
            elapsed_seconds,
        } => format!("resumed #{} at {}s", session_id, elapsed_seconds),
        EventPayload::SessionFinished {
            session_id,
            elapsed_seconds,
        } => format!("finished #{} at {}s", session_id, elapsed_seconds),
        EventPayload::SessionRecovered { session } => {
            format!("recovered {}", session_line(session))
        }
        EventPayload::ConfigSaved { usable } => format!("connection saved (usable: {})", usable),
        EventPayload::Shutdown => "service shutting down".into(),
    }
}
