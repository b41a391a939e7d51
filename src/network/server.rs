//! WebSocket Game Server
//!
//! Async WebSocket server for tic-tac-toe connections.
//! Handles matchmaking requests, routes moves to match relays and tears
//! matches down when a player disconnects.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::network::matchmaker::{Departure, Matchmaker, Pairing};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::network::relay::{spawn_relay, RelayError};
use crate::network::session::{offer, ConnectionId};

/// How long a closing connection may spend flushing its last messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a player may wait in the queue before `opponent_not_found`.
    /// `None` waits forever.
    pub matchmaking_timeout: Option<Duration>,
    /// How often the queue is checked for expired entries.
    pub sweep_interval: Duration,
    /// Outbound message buffer per connection.
    pub outbound_buffer: usize,
    /// Move buffer per match relay.
    pub relay_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            matchmaking_timeout: Some(Duration::from_secs(120)),
            sweep_interval: Duration::from_secs(1),
            outbound_buffer: 64,
            relay_buffer: 16,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// - `TICTACTOE_BIND_ADDR`
    /// - `TICTACTOE_MAX_CONNECTIONS`
    /// - `TICTACTOE_MATCHMAKING_TIMEOUT_SECS` (`0` disables the timeout)
    /// - `TICTACTOE_SWEEP_INTERVAL_MS`
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(addr) = env_var("TICTACTOE_BIND_ADDR") {
            config.bind_addr = parse_env("TICTACTOE_BIND_ADDR", &addr)?;
        }
        if let Some(max) = env_var("TICTACTOE_MAX_CONNECTIONS") {
            config.max_connections = parse_env("TICTACTOE_MAX_CONNECTIONS", &max)?;
        }
        if let Some(secs) = env_var("TICTACTOE_MATCHMAKING_TIMEOUT_SECS") {
            let secs: u64 = parse_env("TICTACTOE_MATCHMAKING_TIMEOUT_SECS", &secs)?;
            config.matchmaking_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(ms) = env_var("TICTACTOE_SWEEP_INTERVAL_MS") {
            let ms: u64 = parse_env("TICTACTOE_SWEEP_INTERVAL_MS", &ms)?;
            config.sweep_interval = Duration::from_millis(ms.max(1));
        }

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GameServerError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| GameServerError::Config(format!("{}: {}", name, e)))
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Display name (after first play request).
    player_name: Option<String>,
    /// Connection time.
    connected_at: Instant,
}

/// Live connection count, checked against the limit at accept time.
#[derive(Debug)]
struct ConnectionSlots {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionSlots {
    fn new(max: usize) -> Self {
        Self { active: AtomicUsize::new(0), max }
    }

    /// Reserve a slot, or `None` if the server is full.
    fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.max).then_some(n + 1))
            .ok()?;
        Some(ConnectionSlot(self.clone()))
    }

    fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// A reserved connection slot, released on drop.
#[derive(Debug)]
struct ConnectionSlot(Arc<ConnectionSlots>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

type Clients = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;
type Registry = Arc<RwLock<Matchmaker>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Matchmaking queue and active matches.
    registry: Registry,
    /// Connected clients.
    clients: Clients,
    /// Connection limit bookkeeping.
    slots: Arc<ConnectionSlots>,
    /// Next connection id.
    next_connection: Arc<AtomicU64>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let slots = Arc::new(ConnectionSlots::new(config.max_connections));

        Self {
            config,
            registry: Arc::new(RwLock::new(Matchmaker::new())),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            slots,
            next_connection: Arc::new(AtomicU64::new(1)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);

        let sweep_handle = self.config.matchmaking_timeout.map(|timeout| {
            let registry = self.registry.clone();
            let every = self.config.sweep_interval;
            tokio::spawn(async move {
                Self::run_matchmaking_sweep(registry, timeout, every).await;
            })
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Some(slot) = self.slots.try_acquire() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(Self::reject_connection(stream, addr));
                                continue;
                            };

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, slot);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(handle) = sweep_handle {
            handle.abort();
        }

        Ok(())
    }

    /// Tell an over-limit client why it is being turned away.
    async fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        let mut ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("Handshake with rejected client {} failed: {}", addr, e);
                return;
            }
        };
        let msg = ServerMessage::error(ErrorCode::ServerFull, "Server is full, try again later");
        if let Ok(text) = msg.to_json() {
            let _ = ws.send(Message::Text(text)).await;
        }
        let _ = ws.close(None).await;
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, slot: ConnectionSlot) {
        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(connection, ConnectedClient {
                    addr,
                    player_name: None,
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                    if let ServerMessage::Shutdown { .. } = msg {
                        let _ = ws_sender.close().await;
                        break;
                    }
                }
            });

            let mut shutting_down = false;

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", connection, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    connection,
                                    client_msg,
                                    &clients,
                                    &registry,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", connection);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", connection, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        shutting_down = true;
                        break;
                    }
                }
            }

            // Leave queue or cancel the match before anything else
            let departure = registry.write().await.disconnect(connection);
            if let Departure::LeftMatch { match_id, remaining } = departure {
                info!("{} left match {}; {} wins by default",
                    connection, hex::encode(&match_id[..4]), remaining);
            }

            // Cleanup
            if shutting_down {
                if tokio::time::timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
                    sender_task.abort();
                }
            } else {
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&connection) {
                info!("Client {} ({}, {}) cleaned up after {:?}",
                    connection,
                    client.addr,
                    client.player_name.as_deref().unwrap_or("anonymous"),
                    client.connected_at.elapsed());
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        connection: ConnectionId,
        msg: ClientMessage,
        clients: &Clients,
        registry: &Registry,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::RequestToPlay { player_name } => {
                Self::handle_request_to_play(connection, player_name, clients, registry, config, sender).await;
            }
            ClientMessage::SubmitMove { cell_index } => {
                Self::handle_submit_move(connection, cell_index, registry, sender).await;
            }
            ClientMessage::Leave => {
                let departure = registry.write().await.disconnect(connection);
                debug!("{} left: {:?}", connection, departure);
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64,
                }).await;
            }
        }
    }

    /// Handle a matchmaking request.
    async fn handle_request_to_play(
        connection: ConnectionId,
        player_name: String,
        clients: &Clients,
        registry: &Registry,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let result = {
            let mut registry_guard = registry.write().await;
            match registry_guard.request_to_play(connection, &player_name, sender.clone()) {
                Ok(Pairing::Queued) => Ok(None),
                Ok(Pairing::Paired(session)) => {
                    let match_id = session.id;
                    let relay = spawn_relay(session, config.relay_buffer);
                    registry_guard.attach_relay(match_id, relay.handle, relay.departure);
                    Ok(Some((match_id, relay.task)))
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(None) => {
                debug!("{} ({}) waiting for an opponent", connection, player_name.trim());
            }
            Ok(Some((match_id, task))) => {
                info!("Created match {} for {}", hex::encode(&match_id[..4]), connection);

                let registry = registry.clone();
                tokio::spawn(async move {
                    match task.await {
                        Ok(end) => {
                            registry.write().await.close_match(&end.match_id);
                        }
                        Err(e) => {
                            error!("Relay for match {} failed: {}", hex::encode(&match_id[..4]), e);
                            registry.write().await.close_match(&match_id);
                        }
                    }
                });
            }
            Err(e) => {
                debug!("Play request from {} rejected: {}", connection, e);
                let _ = sender.send(e.to_message()).await;
                return;
            }
        }

        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&connection) {
            client.player_name = Some(player_name.trim().to_string());
        }
    }

    /// Forward a move to the connection's match relay.
    async fn handle_submit_move(
        connection: ConnectionId,
        cell_index: i64,
        registry: &Registry,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let route = registry.read().await.route_move(connection);

        let rejection = match route {
            Ok(relay) => match usize::try_from(cell_index) {
                Ok(cell_index) => match relay.submit_move(connection, cell_index).await {
                    Ok(()) => return,
                    Err(RelayError::Closed) => ServerMessage::error(
                        ErrorCode::MatchAlreadyFinished,
                        "match already finished",
                    ),
                    Err(e) => ServerMessage::error(ErrorCode::InvalidMove, e.to_string()),
                },
                Err(_) => ServerMessage::error(
                    ErrorCode::InvalidMove,
                    format!("invalid move: cell index {} is out of range 0-8", cell_index),
                ),
            },
            Err(e) => e.to_message(),
        };

        let _ = sender.send(rejection).await;
    }

    /// Expire queue entries that waited too long.
    async fn run_matchmaking_sweep(registry: Registry, timeout: Duration, every: Duration) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            let expired = registry.write().await.expire_waiting(timeout, Instant::now());
            for entry in expired {
                debug!("{} found no opponent within {:?}", entry.connection, timeout);
                offer(&entry.sender, entry.connection, ServerMessage::OpponentNotFound);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.slots.active()
    }

    /// Get active match count.
    pub async fn match_count(&self) -> usize {
        self.registry.read().await.match_count()
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.registry.read().await.queue_len()
    }
}
