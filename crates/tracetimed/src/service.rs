//! Service wiring and main event loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::time::MissedTickBehavior;
use tracetime_api::{Event, EventPayload};
use tracetime_config::{ConnectionStore, ServiceConfig};
use tracetime_core::TimerEngine;
use tracetime_ipc::{IpcServer, ServerMessage};
use tracetime_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use tracetime_tracker::TrackerDirectory;
use tracetime_util::Clock;
use tracing::{debug, error, info, warn};

use crate::{core_event_payload, Dispatched, Dispatcher};

/// Main service state
pub struct Service {
    dispatcher: Arc<Dispatcher>,
    engine: Arc<TimerEngine>,
    store: Arc<dyn Store>,
    ipc: Arc<IpcServer>,
    checkpoint_interval: Duration,
}

impl Service {
    /// Open the store, build the engine and bind the socket
    pub async fn new(
        config: &ServiceConfig,
        tracker: Arc<dyn TrackerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {:?}", config.data_dir)
        })?;

        let db_path = config.database_path();
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let engine = Arc::new(TimerEngine::new(store.clone(), clock));
        let connection = ConnectionStore::new(config.connection_path());
        let dispatcher = Arc::new(Dispatcher::new(
            engine.clone(),
            store.clone(),
            tracker,
            connection,
        ));

        let mut ipc = IpcServer::new(&config.socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to bind socket {:?}", config.socket_path))?;

        Ok(Self {
            dispatcher,
            engine,
            store,
            ipc: Arc::new(ipc),
            checkpoint_interval: config.checkpoint_interval,
        })
    }

    /// Run until `shutdown` completes
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ipc_messages = self
            .ipc
            .take_message_receiver()
            .await
            .ok_or_else(|| anyhow!("IPC message receiver already taken"))?;

        let ipc_accept = self.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Pick up whatever was open when the previous run ended
        self.recover();

        let mut checkpoint_timer = tokio::time::interval(self.checkpoint_interval);
        checkpoint_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        checkpoint_timer.tick().await;

        tokio::pin!(shutdown);

        info!("Service running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    break;
                }

                _ = checkpoint_timer.tick() => {
                    match self.engine.checkpoint() {
                        Ok(true) => debug!("Checkpoint written"),
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "Checkpoint failed"),
                    }
                }

                message = ipc_messages.recv() => {
                    let Some(message) = message else {
                        warn!("IPC message channel closed");
                        break;
                    };
                    self.handle_ipc_message(message).await;
                }
            }
        }

        info!("Shutting down tracetimed");

        // Keep the running time up to now
        if let Err(e) = self.engine.checkpoint() {
            warn!(error = %e, "Final checkpoint failed");
        }

        self.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        self.ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn recover(&self) {
        match self.engine.resume_last() {
            Ok(Some(recovery)) => {
                info!(
                    session_id = %recovery.session.session_id,
                    status = %recovery.session.status,
                    elapsed = %recovery.session.elapsed_formatted,
                    "Open session restored"
                );
                if let Some(event) = recovery.event {
                    self.ipc.broadcast_event(Event::new(core_event_payload(event)));
                }
            }
            Ok(None) => debug!("No open session to restore"),
            Err(e) => error!(error = %e, "Failed to restore open session"),
        }
    }

    async fn handle_ipc_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Request { client_id, request } => {
                let dispatcher = self.dispatcher.clone();
                let ipc = self.ipc.clone();
                let detached = Dispatcher::needs_network(&request.command);

                let work = async move {
                    let Dispatched { response, events } =
                        dispatcher.handle(&client_id, request).await;
                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Could not deliver response");
                    }
                    for event in events {
                        ipc.broadcast_event(event);
                    }
                };

                // Tracker calls must not hold up the loop
                if detached {
                    tokio::spawn(work);
                } else {
                    work.await;
                }
            }

            ServerMessage::ClientConnected { client_id, info } => {
                debug!(client_id = %client_id, uid = ?info.uid, "Client registered");
                self.audit(AuditEventType::ClientConnected {
                    client_id: client_id.to_string(),
                    uid: info.uid,
                });
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                self.audit(AuditEventType::ClientDisconnected {
                    client_id: client_id.to_string(),
                });
            }
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
