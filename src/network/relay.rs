//! Session Relay
//!
//! One task per match. Moves are received over an mpsc channel and processed
//! strictly one at a time in arrival order. A departure signal is polled
//! ahead of queued moves so a disconnect ends the match at once. Once the
//! match is over the inbox is closed and any moves left in it are rejected.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::board::Outcome;
use crate::network::session::{ConnectionId, MatchId, MatchSession, SessionError};

/// Commands accepted by a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    /// A player proposed a move.
    SubmitMove {
        /// Submitting connection.
        connection: ConnectionId,
        /// Target cell.
        cell_index: usize,
    },
}

/// Relay errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    /// The relay task has ended (match finished or cancelled).
    #[error("match relay closed")]
    Closed,

    /// Session rejected the operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Cloneable handle for submitting moves to a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    match_id: MatchId,
    commands: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Queue a move behind any moves already in flight.
    pub async fn submit_move(&self, connection: ConnectionId, cell_index: usize) -> Result<(), RelayError> {
        self.commands
            .send(RelayCommand::SubmitMove { connection, cell_index })
            .await
            .map_err(|_| RelayError::Closed)
    }

    /// Match this relay serves.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Check if the relay task has ended.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// How a relay finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEnd {
    /// Match served.
    pub match_id: MatchId,
    /// Terminal outcome, `None` if the relay was dropped before a result.
    pub outcome: Option<Outcome>,
}

/// Handles returned when a relay is spawned.
#[derive(Debug)]
pub struct SpawnedRelay {
    /// Move submission handle.
    pub handle: RelayHandle,
    /// Fire with the departing connection to cancel the match.
    pub departure: oneshot::Sender<ConnectionId>,
    /// Resolves when the relay ends.
    pub task: JoinHandle<RelayEnd>,
}

/// Spawn the relay task for a freshly paired session.
///
/// The task announces the pairing to both players before it reads any move.
pub fn spawn_relay(session: MatchSession, buffer: usize) -> SpawnedRelay {
    let (commands_tx, commands_rx) = mpsc::channel(buffer);
    let (departure_tx, departure_rx) = oneshot::channel();
    let match_id = session.id;

    let task = tokio::spawn(run_relay(session, commands_rx, departure_rx));

    SpawnedRelay {
        handle: RelayHandle { match_id, commands: commands_tx },
        departure: departure_tx,
        task,
    }
}

async fn run_relay(
    mut session: MatchSession,
    mut commands: mpsc::Receiver<RelayCommand>,
    mut departure: oneshot::Receiver<ConnectionId>,
) -> RelayEnd {
    let match_id = session.id;
    let short_id = hex::encode(&match_id[..4]);

    match session.start() {
        Ok(deliveries) => session.deliver(deliveries),
        Err(e) => warn!("Match {} failed to start: {}", short_id, e),
    }
    info!(
        "Match {} started: {} (circle) vs {} (cross)",
        short_id, session.players()[0].name, session.players()[1].name
    );

    while !session.is_finished() {
        tokio::select! {
            biased;

            left = &mut departure => {
                match left {
                    Ok(connection) => {
                        debug!("Match {}: {} left", short_id, connection);
                        match session.player_left(connection) {
                            Ok(deliveries) => session.deliver(deliveries),
                            Err(e) => warn!("Match {}: departure from {}: {}", short_id, connection, e),
                        }
                    }
                    Err(_) => debug!("Match {}: registry dropped relay", short_id),
                }
                break;
            }

            command = commands.recv() => {
                let Some(RelayCommand::SubmitMove { connection, cell_index }) = command else {
                    break;
                };
                match session.submit_move(connection, cell_index) {
                    Ok(deliveries) => session.deliver(deliveries),
                    Err(e) => warn!("Match {}: move from {}: {}", short_id, connection, e),
                }
            }
        }
    }

    // Moves still queued behind the deciding event are answered, not dropped
    commands.close();
    if session.is_finished() {
        while let Some(RelayCommand::SubmitMove { connection, cell_index }) = commands.recv().await {
            match session.submit_move(connection, cell_index) {
                Ok(deliveries) => session.deliver(deliveries),
                Err(e) => warn!("Match {}: late move from {}: {}", short_id, connection, e),
            }
        }
    }

    let outcome = session.engine().outcome();
    info!("Match {} ended: {:?} after {} moves", short_id, outcome, session.engine().history().len());

    RelayEnd { match_id, outcome }
}
