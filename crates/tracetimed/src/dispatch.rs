//! Command dispatch: maps protocol commands onto the engine and collaborators

use std::sync::Arc;

use tracetime_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Request, Response,
    ResponsePayload, ServiceStateSnapshot, API_VERSION,
};
use tracetime_config::{ConfigError, ConnectionStore};
use tracetime_core::{CoreEvent, EngineError, TimerEngine};
use tracetime_store::{AuditEvent, AuditEventType, Store};
use tracetime_tracker::{Credentials, TrackerDirectory, TrackerError};
use tracetime_util::{format_tracker_duration, ClientId};
use tracing::{debug, error, info, warn};

/// Upper bound for `get_history`
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Response to send back plus events to broadcast
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub events: Vec<Event>,
}

impl Dispatched {
    fn reply(response: Response) -> Self {
        Self {
            response,
            events: Vec::new(),
        }
    }
}

/// Stateless translator between requests and the service components
pub struct Dispatcher {
    engine: Arc<TimerEngine>,
    store: Arc<dyn Store>,
    tracker: Arc<dyn TrackerDirectory>,
    connection: ConnectionStore,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<TimerEngine>,
        store: Arc<dyn Store>,
        tracker: Arc<dyn TrackerDirectory>,
        connection: ConnectionStore,
    ) -> Self {
        Self {
            engine,
            store,
            tracker,
            connection,
        }
    }

    /// Commands that reach out to the tracker over the network
    pub fn needs_network(command: &Command) -> bool {
        matches!(
            command,
            Command::TestGitlab { .. }
                | Command::GitlabGroups
                | Command::GitlabProjects { .. }
                | Command::GitlabIssues { .. }
        )
    }

    pub async fn handle(&self, client_id: &ClientId, request: Request) -> Dispatched {
        let request_id = request.request_id;

        if request.api_version != API_VERSION {
            warn!(
                client_id = %client_id,
                api_version = request.api_version,
                "Unsupported API version"
            );
            return Dispatched::reply(Response::error(
                request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!(
                        "Unsupported API version {} (expected {})",
                        request.api_version, API_VERSION
                    ),
                ),
            ));
        }

        debug!(client_id = %client_id, request_id, command = ?request.command, "Handling command");
        self.handle_command(client_id, request_id, request.command)
            .await
    }

    async fn handle_command(
        &self,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> Dispatched {
        match command {
            Command::StartTimer {
                group_id,
                project_id,
                issue_id,
                label,
            } => match self.engine.start(group_id, project_id, issue_id, &label) {
                Ok(started) => self.with_state(
                    Response::success(
                        request_id,
                        ResponsePayload::TimerStarted {
                            session_id: started.session.session_id,
                        },
                    ),
                    started.event,
                ),
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::PauseTimer { session_id } => match self.engine.pause(session_id) {
                Ok(paused) => self.with_state(
                    Response::success(request_id, ResponsePayload::TimerPaused { session_id }),
                    paused.event,
                ),
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::ResumeTimer { session_id } => match self.engine.resume(session_id) {
                Ok(resumed) => self.with_state(
                    Response::success(request_id, ResponsePayload::TimerResumed { session_id }),
                    resumed.event,
                ),
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::StopTimer { session_id } => match self.engine.stop(session_id) {
                Ok(stopped) => self.with_state(
                    Response::success(
                        request_id,
                        ResponsePayload::TimerStopped {
                            session_id,
                            elapsed_seconds: stopped.session.elapsed_seconds,
                            elapsed_formatted: stopped.session.elapsed_formatted.clone(),
                        },
                    ),
                    stopped.event,
                ),
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::GetSessionTime { session_id } => match self.engine.elapsed(session_id) {
                Ok(elapsed_seconds) => Dispatched::reply(Response::success(
                    request_id,
                    ResponsePayload::SessionTime {
                        session_id,
                        elapsed_seconds,
                        elapsed_formatted: format_tracker_duration(elapsed_seconds),
                    },
                )),
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::ResumeLastSession => self.resume_last(request_id),

            Command::LoadConfig => match self.connection.load() {
                Ok(Some(settings)) => Dispatched::reply(Response::success(
                    request_id,
                    ResponsePayload::Config { settings },
                )),
                Ok(None) => Dispatched::reply(Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::ConfigNotFound, "No connection settings saved"),
                )),
                Err(e) => Dispatched::reply(config_error(request_id, &e)),
            },

            Command::SaveConfig { settings } => match self.connection.save(&settings) {
                Ok(saved) => {
                    let usable = saved.is_usable();
                    self.audit(AuditEventType::ConfigSaved { usable });

                    let mut events = vec![Event::new(EventPayload::ConfigSaved { usable })];
                    if let Ok(state) = self.snapshot() {
                        events.push(Event::new(EventPayload::StateChanged(state)));
                    }
                    Dispatched {
                        response: Response::success(request_id, ResponsePayload::ConfigSaved),
                        events,
                    }
                }
                Err(e) => Dispatched::reply(config_error(request_id, &e)),
            },

            Command::TestGitlab { url, token } => {
                let credentials = Credentials::new(url.trim(), token.trim());
                match self.tracker.test_connection(&credentials).await {
                    Ok(user) => {
                        info!(username = %user.username, user_id = user.id, "Tracker token verified");
                        Dispatched::reply(Response::success(
                            request_id,
                            ResponsePayload::TrackerUser(user),
                        ))
                    }
                    Err(e) => Dispatched::reply(tracker_error(request_id, &e)),
                }
            }

            Command::GitlabGroups => {
                let credentials = match self.saved_credentials(request_id) {
                    Ok(credentials) => credentials,
                    Err(response) => return Dispatched::reply(response),
                };
                match self.tracker.list_groups(&credentials).await {
                    Ok(groups) => Dispatched::reply(Response::success(
                        request_id,
                        ResponsePayload::Groups { groups },
                    )),
                    Err(e) => Dispatched::reply(tracker_error(request_id, &e)),
                }
            }

            Command::GitlabProjects { group_id } => {
                let credentials = match self.saved_credentials(request_id) {
                    Ok(credentials) => credentials,
                    Err(response) => return Dispatched::reply(response),
                };
                match self.tracker.list_projects(&credentials, group_id).await {
                    Ok(projects) => Dispatched::reply(Response::success(
                        request_id,
                        ResponsePayload::Projects { projects },
                    )),
                    Err(e) => Dispatched::reply(tracker_error(request_id, &e)),
                }
            }

            Command::GitlabIssues { project_id } => {
                let credentials = match self.saved_credentials(request_id) {
                    Ok(credentials) => credentials,
                    Err(response) => return Dispatched::reply(response),
                };
                match self.tracker.list_issues(&credentials, project_id).await {
                    Ok(issues) => Dispatched::reply(Response::success(
                        request_id,
                        ResponsePayload::Issues { issues },
                    )),
                    Err(e) => Dispatched::reply(tracker_error(request_id, &e)),
                }
            }

            Command::GetState => match self.snapshot() {
                Ok(state) => {
                    Dispatched::reply(Response::success(request_id, ResponsePayload::State(state)))
                }
                Err(e) => Dispatched::reply(engine_error(request_id, &e)),
            },

            Command::GetHistory { limit } => {
                let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
                match self.engine.history(limit) {
                    Ok(sessions) => Dispatched::reply(Response::success(
                        request_id,
                        ResponsePayload::History { sessions },
                    )),
                    Err(e) => Dispatched::reply(engine_error(request_id, &e)),
                }
            }

            Command::GetHealth => {
                let store_ok = self.engine.is_store_healthy();
                let health = HealthStatus {
                    live: true,
                    ready: store_ok,
                    store_ok,
                    config_usable: self.config_usable(),
                };
                Dispatched::reply(Response::success(request_id, ResponsePayload::Health(health)))
            }

            Command::SubscribeEvents => Dispatched::reply(Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            )),

            Command::UnsubscribeEvents => {
                Dispatched::reply(Response::success(request_id, ResponsePayload::Unsubscribed))
            }

            Command::Ping => Dispatched::reply(Response::success(request_id, ResponsePayload::Pong)),
        }
    }

    /// Never fails at the protocol level; storage faults read as "nothing to resume"
    fn resume_last(&self, request_id: u64) -> Dispatched {
        match self.engine.resume_last() {
            Ok(Some(recovery)) => {
                let response = Response::success(
                    request_id,
                    ResponsePayload::LastSession {
                        session: Some(recovery.session),
                    },
                );
                match recovery.event {
                    Some(event) => self.with_state(response, event),
                    None => Dispatched::reply(response),
                }
            }
            Ok(None) => Dispatched::reply(Response::success(
                request_id,
                ResponsePayload::LastSession { session: None },
            )),
            Err(e) => {
                error!(error = %e, "Could not recover last session");
                Dispatched::reply(Response::success(
                    request_id,
                    ResponsePayload::LastSession { session: None },
                ))
            }
        }
    }

    fn saved_credentials(&self, request_id: u64) -> Result<Credentials, Response> {
        let settings = match self.connection.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                return Err(Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::ConfigNotFound, "No connection settings saved"),
                ));
            }
            Err(e) => return Err(config_error(request_id, &e)),
        };

        let credentials = Credentials::from(&settings);
        if credentials.url.is_empty() || credentials.token.is_empty() {
            return Err(Response::error(
                request_id,
                ErrorInfo::new(
                    ErrorCode::ConfigInvalid,
                    "Saved connection settings lack a URL or token",
                ),
            ));
        }
        Ok(credentials)
    }

    fn config_usable(&self) -> bool {
        match self.connection.load() {
            Ok(Some(settings)) => settings.is_usable(),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Connection settings unreadable");
                false
            }
        }
    }

    /// Current service state
    pub fn snapshot(&self) -> Result<ServiceStateSnapshot, EngineError> {
        Ok(ServiceStateSnapshot {
            api_version: API_VERSION,
            open_session: self.engine.open_session()?,
            config_usable: self.config_usable(),
        })
    }

    /// Reply plus the engine event and a fresh state snapshot
    fn with_state(&self, response: Response, event: CoreEvent) -> Dispatched {
        let mut events = vec![Event::new(core_event_payload(event))];
        match self.snapshot() {
            Ok(state) => events.push(Event::new(EventPayload::StateChanged(state))),
            Err(e) => warn!(error = %e, "Could not build state snapshot"),
        }
        Dispatched { response, events }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

/// Protocol form of an engine event
pub fn core_event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionStarted { session } => EventPayload::SessionStarted { session },
        CoreEvent::SessionPaused {
            session_id,
            elapsed_seconds,
        } => EventPayload::SessionPaused {
            session_id,
            elapsed_seconds,
        },
        CoreEvent::SessionResumed {
            session_id,
            elapsed_seconds,
        } => EventPayload::SessionResumed {
            session_id,
            elapsed_seconds,
        },
        CoreEvent::SessionFinished {
            session_id,
            elapsed_seconds,
        } => EventPayload::SessionFinished {
            session_id,
            elapsed_seconds,
        },
        CoreEvent::SessionRecovered { session, .. } => EventPayload::SessionRecovered { session },
    }
}

pub fn engine_error_code(e: &EngineError) -> ErrorCode {
    match e {
        EngineError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        EngineError::SessionAlreadyOpen(_) => ErrorCode::SessionAlreadyOpen,
        EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        EngineError::NotFound(_) => ErrorCode::NotFound,
        EngineError::Storage(_) | EngineError::CorruptState(_) => ErrorCode::StorageError,
    }
}

fn engine_error(request_id: u64, e: &EngineError) -> Response {
    Response::error(request_id, ErrorInfo::new(engine_error_code(e), e.to_string()))
}

fn config_error(request_id: u64, e: &ConfigError) -> Response {
    let code = match e {
        ConfigError::NotFound(_) => ErrorCode::ConfigNotFound,
        ConfigError::ParseError(_)
        | ConfigError::ValidationFailed { .. }
        | ConfigError::UnsupportedVersion(_) => ErrorCode::ConfigInvalid,
        ConfigError::ReadError(_) | ConfigError::SerializeError(_) => {
            error!(error = %e, "Connection settings I/O failed");
            ErrorCode::InternalError
        }
    };
    Response::error(request_id, ErrorInfo::new(code, e.to_string()))
}

fn tracker_error(request_id: u64, e: &TrackerError) -> Response {
    warn!(error = %e, "Tracker request failed");
    Response::error(request_id, ErrorInfo::new(ErrorCode::TrackerError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracetime_store::StoreError;
    use tracetime_util::SessionId;

    #[test]
    fn engine_errors_map_to_codes() {
        let id = SessionId::new(1);
        assert_eq!(
            engine_error_code(&EngineError::InvalidArgument("x".into())),
            ErrorCode::InvalidArgument
        );
        assert_eq!(
            engine_error_code(&EngineError::SessionAlreadyOpen(id)),
            ErrorCode::SessionAlreadyOpen
        );
        assert_eq!(engine_error_code(&EngineError::NotFound(id)), ErrorCode::NotFound);
        assert_eq!(
            engine_error_code(&EngineError::Storage(StoreError::Database("x".into()))),
            ErrorCode::StorageError
        );
        assert_eq!(
            engine_error_code(&EngineError::CorruptState("two open".into())),
            ErrorCode::StorageError
        );
    }

    #[test]
    fn network_commands() {
        assert!(Dispatcher::needs_network(&Command::GitlabGroups));
        assert!(!Dispatcher::needs_network(&Command::Ping));
        assert!(!Dispatcher::needs_network(&Command::ResumeLastSession));
    }
}
