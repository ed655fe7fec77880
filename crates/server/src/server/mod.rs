//! Agent server: WebSocket transport for game agents.
//!
//! Decoded agent messages are published through `after_message_receive`.
//! Join and tick notifications from the engine come back through
//! [`Transport::handle_new_player_join`] and [`Transport::handle_game_tick`];
//! both run on the engine's thread and only queue frames.

use crate::config::StartupConfig;
use crate::events::Event;
use crate::orchestrator::Transport;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use protocol::{
    ClientMessage, GameSnapshot, PlayerInfo, ProtocolError, ReceivedMessage, ServerMessage,
    SessionId,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

pub mod client;

pub use client::{Session, OUTBOUND_BUFFER};

/// Errors raised while bringing the transport up.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Session tracking state (shared across connection handlers).
struct Shared {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_session_id: AtomicU64,
    after_message_receive: Event<ReceivedMessage>,
    // Set once if the serve task ends after a successful start.
    stopped: watch::Sender<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            after_message_receive: Event::new("after_message_receive"),
            stopped: watch::channel(None).0,
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_session(&self, addr: SocketAddr, outbound: mpsc::Sender<String>) -> SessionId {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.lock_sessions().insert(id, Session::new(id, addr, outbound));
        info!("Agent connected from {} as session {}", addr, id);
        id
    }

    fn close_session(&self, id: SessionId) {
        if let Some(session) = self.lock_sessions().remove(&id) {
            info!(
                "Session {} ({}) disconnected after {:?}",
                id,
                session.addr,
                session.connected_at.elapsed()
            );
        }
    }

    /// Publish a decoded message, or answer the agent with an error frame.
    fn receive(&self, session_id: SessionId, decoded: Result<ClientMessage, ProtocolError>) {
        match decoded {
            Ok(message) => {
                let received = ReceivedMessage {
                    session_id,
                    message,
                };
                if self.after_message_receive.publish(&received) == 0 {
                    debug!("No subscriber for message from session {}", session_id);
                }
            }
            Err(e) => {
                warn!("Bad message from session {}: {}", session_id, e);
                self.send_to(
                    session_id,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    fn send_to(&self, session_id: SessionId, message: &ServerMessage) {
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode message for session {}: {}", session_id, e);
                return;
            }
        };
        if let Some(session) = self.lock_sessions().get(&session_id) {
            if !session.push(frame) {
                debug!("Dropped frame for session {}", session_id);
            }
        }
    }
}

/// The transport collaborator.
pub struct AgentServer {
    bind_address: String,
    port: u16,
    shared: Arc<Shared>,
}

impl AgentServer {
    pub fn new(config: &StartupConfig) -> Self {
        Self::with_address(config.bind_address.clone(), config.server_port)
    }

    pub fn with_address(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.shared.lock_sessions().len()
    }

    pub fn joined_count(&self) -> usize {
        self.shared
            .lock_sessions()
            .values()
            .filter(|session| session.is_joined())
            .count()
    }
}

impl Transport for AgentServer {
    fn start(&self) -> impl Future<Output = anyhow::Result<SocketAddr>> + Send {
        serve(
            Arc::clone(&self.shared),
            self.bind_address.clone(),
            self.port,
        )
    }

    fn closed(&self) -> impl Future<Output = anyhow::Error> + Send {
        let mut stopped = self.shared.stopped.subscribe();
        async move {
            match stopped.wait_for(Option::is_some).await {
                Ok(reason) => anyhow::anyhow!(
                    "agent server stopped: {}",
                    reason.as_deref().unwrap_or_default()
                ),
                Err(_) => anyhow::anyhow!("agent server dropped"),
            }
        }
    }

    fn after_message_receive(&self) -> &Event<ReceivedMessage> {
        &self.shared.after_message_receive
    }

    fn handle_new_player_join(&self, player: &PlayerInfo) {
        let bound = match self.shared.lock_sessions().get_mut(&player.session_id) {
            Some(session) => {
                session.player = Some(player.clone());
                true
            }
            None => false,
        };

        if !bound {
            warn!(
                "Player {} joined from unknown session {}",
                player.player_id, player.session_id
            );
            return;
        }

        debug!(
            "Session {} registered as player {}",
            player.session_id, player.player_id
        );
        self.shared.send_to(
            player.session_id,
            &ServerMessage::Joined {
                player: player.clone(),
            },
        );
    }

    fn handle_game_tick(&self, snapshot: &GameSnapshot) {
        if self.joined_count() == 0 {
            return;
        }

        let frame = match (ServerMessage::State {
            snapshot: snapshot.clone(),
        })
        .to_json()
        {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode tick {}: {}", snapshot.tick, e);
                return;
            }
        };

        for session in self.shared.lock_sessions().values().filter(|s| s.is_joined()) {
            if !session.push(frame.clone()) {
                debug!("Dropped tick {} for session {}", snapshot.tick, session.id);
            }
        }
    }
}

/// Bind the listener and serve agents on a background task.
async fn serve(shared: Arc<Shared>, bind_address: String, port: u16) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind((bind_address.as_str(), port))
        .await
        .map_err(|source| TransportError::Bind {
            addr: format!("{}:{}", bind_address, port),
            source,
        })?;
    let addr = listener.local_addr()?;

    let status = Arc::clone(&shared);
    let app = Router::new()
        .route("/", get(agent_socket))
        .route("/agent", get(agent_socket))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(shared);

    info!("Agent server listening on ws://{}", addr);
    tokio::spawn(async move {
        let reason =
            match axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
            {
                Ok(()) => "listener closed".to_string(),
                Err(e) => e.to_string(),
            };
        error!("Agent server stopped: {}", reason);
        status.stopped.send_replace(Some(reason));
    });

    Ok(addr)
}

/// Upgrade an agent connection to a WebSocket.
async fn agent_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(shared): State<Arc<Shared>>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade from {}", addr);
    ws.on_upgrade(move |socket| handle_agent(socket, addr, shared))
}

/// Pump one agent connection until either side closes.
async fn handle_agent(socket: WebSocket, addr: SocketAddr, shared: Arc<Shared>) {
    let (mut write, mut read) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let session_id = shared.open_session(addr, outbound_tx);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        shared.receive(session_id, ClientMessage::parse(text.as_str()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        shared.receive(session_id, ClientMessage::parse_bytes(&data));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    _ => {}
                }
            }
            frame = outbound_rx.recv() => {
                // The session table owns the sender, so `None` means the session is gone.
                let Some(frame) = frame else { break };
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    shared.close_session(session_id);
}
