//! Unix socket server: one reader and one writer task per peer

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracetime_api::{ClientInfo, Command, ErrorCode, ErrorInfo, Event, Request, Response};
use tracetime_util::ClientId;
use tracing::{debug, error, info, warn};

use crate::{IpcError, IpcResult};

/// Events buffered per peer before it counts as lagging
const EVENT_BUFFER: usize = 100;

/// What the server hands to the service loop
pub enum ServerMessage {
    Request {
        client_id: ClientId,
        request: Request,
    },
    ClientConnected {
        client_id: ClientId,
        info: ClientInfo,
    },
    ClientDisconnected {
        client_id: ClientId,
    },
}

type Inbox = mpsc::UnboundedReceiver<ServerMessage>;
type Peers = Arc<RwLock<HashMap<ClientId, Peer>>>;

/// Per-connection bookkeeping
struct Peer {
    /// Serialized responses queued for the writer task
    outbox: mpsc::UnboundedSender<String>,
    subscribed: bool,
}

pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    peers: Peers,
    events: broadcast::Sender<Event>,
    inbox_tx: mpsc::UnboundedSender<ServerMessage>,
    inbox_rx: Mutex<Option<Inbox>>,
}

impl IpcServer {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            peers: Arc::new(RwLock::new(HashMap::new())),
            events,
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one
    pub async fn start(&mut self) -> IpcResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(dir) = self.socket_path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;

        info!(path = %self.socket_path.display(), "IPC server listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// The receiving end of the server's message queue; can be taken once
    pub async fn take_message_receiver(&self) -> Option<mpsc::UnboundedReceiver<ServerMessage>> {
        self.inbox_rx.lock().await.take()
    }

    /// Accept peers until the task is dropped
    pub async fn run(&self) -> IpcResult<()> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(IpcError::ServerError("Server not started".into()));
        };
        let own_uid = nix::unistd::getuid().as_raw();

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let uid = peer_uid(&stream);
            if !peer_allowed(uid, own_uid) {
                warn!(uid = ?uid, "Refusing connection from another user");
                continue;
            }

            let info = ClientInfo {
                uid,
                ..ClientInfo::new()
            };
            info!(client_id = %info.client_id, uid = ?uid, "Client connected");
            self.attach(stream, info).await;
        }
    }

    async fn attach(&self, stream: UnixStream, info: ClientInfo) {
        let client_id = info.client_id.clone();
        let (read_half, write_half) = stream.into_split();
        let (outbox, outgoing) = mpsc::unbounded_channel();

        self.peers.write().await.insert(
            client_id.clone(),
            Peer {
                outbox: outbox.clone(),
                subscribed: false,
            },
        );
        let _ = self.inbox_tx.send(ServerMessage::ClientConnected {
            client_id: client_id.clone(),
            info,
        });

        tokio::spawn(read_loop(
            client_id.clone(),
            read_half,
            outbox,
            self.peers.clone(),
            self.inbox_tx.clone(),
        ));
        tokio::spawn(write_loop(
            client_id,
            write_half,
            outgoing,
            self.events.subscribe(),
            self.peers.clone(),
            self.inbox_tx.clone(),
        ));
    }

    /// Queue a response for one peer
    pub async fn send_response(&self, client_id: &ClientId, response: Response) -> IpcResult<()> {
        let line = serde_json::to_string(&response)?;

        let peers = self.peers.read().await;
        match peers.get(client_id) {
            Some(peer) => peer.outbox.send(line).map_err(|_| IpcError::ConnectionClosed),
            None => Ok(()),
        }
    }

    /// Fan an event out to every subscribed peer
    pub fn broadcast_event(&self, event: Event) {
        let _ = self.events.send(event);
    }

    pub async fn client_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Remove the socket file
    pub fn shutdown(&self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One request per line. Subscription flags change here, before the request
/// reaches the service loop.
async fn read_loop(
    client_id: ClientId,
    read_half: OwnedReadHalf,
    outbox: mpsc::UnboundedSender<String>,
    peers: Peers,
    inbox: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(client_id = %client_id, "Client closed the connection");
                break;
            }
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Read error");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Malformed request");
                let reply = undecodable_reply(line, &e);
                if let Ok(reply) = serde_json::to_string(&reply) {
                    let _ = outbox.send(reply);
                }
                continue;
            }
        };

        let subscribe = match request.command {
            Command::SubscribeEvents => Some(true),
            Command::UnsubscribeEvents => Some(false),
            _ => None,
        };
        if let Some(subscribe) = subscribe {
            if let Some(peer) = peers.write().await.get_mut(&client_id) {
                peer.subscribed = subscribe;
            }
        }

        let _ = inbox.send(ServerMessage::Request {
            client_id: client_id.clone(),
            request,
        });
    }

    // Dropping the peer closes the writer's outbox
    peers.write().await.remove(&client_id);
}

async fn write_loop(
    client_id: ClientId,
    mut write_half: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    mut events: broadcast::Receiver<Event>,
    peers: Peers,
    inbox: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        let line = tokio::select! {
            response = outgoing.recv() => match response {
                Some(line) => line,
                None => break,
            },

            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(client_id = %client_id, skipped, "Client fell behind on events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let subscribed = peers
                    .read()
                    .await
                    .get(&client_id)
                    .is_some_and(|peer| peer.subscribed);
                if !subscribed {
                    continue;
                }
                match serde_json::to_string(&event) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Could not serialize event");
                        continue;
                    }
                }
            }
        };

        if let Err(e) = write_line(&mut write_half, line).await {
            debug!(client_id = %client_id, error = %e, "Write error");
            break;
        }
    }

    peers.write().await.remove(&client_id);
    let _ = inbox.send(ServerMessage::ClientDisconnected { client_id });
}

async fn write_line(write_half: &mut OwnedWriteHalf, mut line: String) -> std::io::Result<()> {
    line.push('\n');
    write_half.write_all(line.as_bytes()).await
}

/// Reply for a line that did not decode as a `Request`.
///
/// Lines that are not JSON, or carry no `request_id`, get `invalid_request`
/// with id 0. A known command with missing or mistyped fields is an
/// `invalid_argument` answered under the caller's id.
fn undecodable_reply(line: &str, error: &serde_json::Error) -> Response {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Response::error(
            0,
            ErrorInfo::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", error)),
        );
    };
    let Some(request_id) = value.get("request_id").and_then(Value::as_u64) else {
        return Response::error(
            0,
            ErrorInfo::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", error)),
        );
    };

    let command = value.get("command");
    let kind = command.and_then(|c| c.get("type")).and_then(Value::as_str);
    if let (Some(command), Some(kind)) = (command, kind) {
        if is_known_command(kind) {
            if let Err(e) = serde_json::from_value::<Command>(command.clone()) {
                return Response::error(
                    request_id,
                    ErrorInfo::new(
                        ErrorCode::InvalidArgument,
                        format!("Invalid arguments for {}: {}", kind, e),
                    ),
                );
            }
        }
    }

    Response::error(
        request_id,
        ErrorInfo::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", error)),
    )
}

/// Whether `kind` names a `Command` variant, whatever its fields
fn is_known_command(kind: &str) -> bool {
    match serde_json::from_value::<Command>(json!({ "type": kind })) {
        Ok(_) => true,
        Err(e) => !e.to_string().starts_with("unknown variant"),
    }
}

/// Only the service's own user and root may talk to it
fn peer_allowed(peer_uid: Option<u32>, own_uid: u32) -> bool {
    matches!(peer_uid, Some(uid) if uid == 0 || uid == own_uid)
}

fn peer_uid(stream: &UnixStream) -> Option<u32> {
    getsockopt(&stream.as_fd(), PeerCredentials)
        .ok()
        .map(|cred| cred.uid())
}
