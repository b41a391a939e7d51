//! WebSocket client for connecting to the game server

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::client::state::ClientState;
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Channel capacity in each direction.
const CHANNEL_CAPACITY: usize = 64;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not open the WebSocket.
    #[error("failed to connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection has closed.
    #[error("disconnected from server")]
    Disconnected,
}

/// A live connection to the server together with the mirrored match state.
pub struct GameClient {
    outgoing: mpsc::Sender<ClientMessage>,
    incoming: mpsc::Receiver<ServerMessage>,
    state: ClientState,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl GameClient {
    /// Connect to `url` and enter the matchmaking queue as `player_name`.
    pub async fn connect(url: &str, player_name: &str) -> Result<Self, ClientError> {
        info!("Connecting to {}...", url);
        let (ws_stream, _) = connect_async(url).await?;
        info!("WebSocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
        let (incoming_tx, incoming_rx) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);

        // Reader task
        let reader = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => match ServerMessage::from_json(&text) {
                        Ok(server_msg) => {
                            debug!("Received: {:?}", server_msg);
                            if incoming_tx.send(server_msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to parse server message: {} - {}", e, text),
                    },
                    Ok(Message::Close(_)) => {
                        info!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            debug!("Reader task ended");
        });

        // Writer task
        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                debug!("Sending: {}", json);
                if let Err(e) = write.send(Message::Text(json)).await {
                    error!("Failed to send message: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Writer task ended");
        });

        let mut client = Self {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            state: ClientState::new(player_name),
            reader,
            writer,
        };

        if let Some(request) = client.state.request_to_play() {
            client.send(request).await?;
        }

        Ok(client)
    }

    /// Send a raw message.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outgoing.send(msg).await.map_err(|_| ClientError::Disconnected)
    }

    /// Click a cell. Returns `false` without sending when the click is not allowed.
    pub async fn click_cell(&self, index: usize) -> Result<bool, ClientError> {
        match self.state.click_cell(index) {
            Some(msg) => {
                self.send(msg).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queue again after `opponent_not_found` or a finished match.
    ///
    /// Returns `false` without sending while searching or playing.
    pub async fn play_again(&mut self) -> Result<bool, ClientError> {
        match self.state.request_to_play() {
            Some(request) => {
                self.send(request).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Leave the queue or the current match.
    pub async fn leave(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::Leave).await
    }

    /// Wait for the next server event and apply it to the local state.
    ///
    /// Returns `None` once the connection has closed.
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        let msg = self.incoming.recv().await?;
        self.state.apply(&msg);
        Some(msg)
    }

    /// Mirrored match state.
    pub fn state(&self) -> &ClientState {
        &self.state
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
