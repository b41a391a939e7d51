//! Match Session
//!
//! Per-match state shared by the two paired players: their identities,
//! outbound channels and the turn engine. Every event is turned into a list
//! of deliveries; the relay task performs the actual sends.

use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::game::board::{Outcome, Symbol};
use crate::game::turn::{Move, MoveError, TurnEngine};
use crate::network::protocol::{ErrorCode, MatchOverInfo, ServerMessage};

/// Connection identifier, assigned by the server on accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Unique match identifier.
pub type MatchId = [u8; 16];

/// Match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Paired, players not yet notified.
    Waiting,
    /// Moves are being accepted.
    Active,
    /// Terminal outcome reached.
    Finished(Outcome),
}

/// One side of a match.
#[derive(Debug, Clone)]
pub struct MatchPlayer {
    /// Owning connection.
    pub connection: ConnectionId,
    /// Display name.
    pub name: String,
    /// Assigned symbol.
    pub symbol: Symbol,
    /// Message channel to this player.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Both players.
    Both,
    /// A single player.
    Player(ConnectionId),
}

/// A message addressed to one or both players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target.
    pub recipient: Recipient,
    /// Payload.
    pub message: ServerMessage,
}

impl Delivery {
    fn both(message: ServerMessage) -> Self {
        Self { recipient: Recipient::Both, message }
    }

    fn to(connection: ConnectionId, message: ServerMessage) -> Self {
        Self { recipient: Recipient::Player(connection), message }
    }
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Connection does not belong to this match.
    #[error("player not found")]
    PlayerNotFound,

    /// Operation not allowed in the current state.
    #[error("invalid session state")]
    InvalidState,
}

/// A paired match.
#[derive(Debug)]
pub struct MatchSession {
    /// Unique match identifier.
    pub id: MatchId,
    /// Current state.
    state: SessionState,
    /// Circle first, cross second.
    players: [MatchPlayer; 2],
    /// Board and turn order.
    engine: TurnEngine,
}

impl MatchSession {
    /// Create a session. `circle` moves first.
    pub fn new(id: MatchId, circle: MatchPlayer, cross: MatchPlayer) -> Self {
        debug_assert_eq!(circle.symbol, Symbol::Circle);
        debug_assert_eq!(cross.symbol, Symbol::Cross);
        debug_assert_ne!(circle.connection, cross.connection);

        Self {
            id,
            state: SessionState::Waiting,
            players: [circle, cross],
            engine: TurnEngine::new(),
        }
    }

    /// Activate the match and announce each player's opponent and symbol.
    pub fn start(&mut self) -> Result<Vec<Delivery>, SessionError> {
        if self.state != SessionState::Waiting {
            return Err(SessionError::InvalidState);
        }
        self.state = SessionState::Active;

        let [circle, cross] = &self.players;
        Ok(vec![
            Delivery::to(circle.connection, ServerMessage::OpponentFound {
                opponent_name: cross.name.clone(),
                playing_as: circle.symbol,
            }),
            Delivery::to(cross.connection, ServerMessage::OpponentFound {
                opponent_name: circle.name.clone(),
                playing_as: cross.symbol,
            }),
        ])
    }

    /// Handle a move from `connection`.
    ///
    /// An accepted move is echoed to both players, followed by `match_over`
    /// if it decided the match. A rejected move produces exactly one error
    /// for the submitter and changes nothing.
    pub fn submit_move(
        &mut self,
        connection: ConnectionId,
        cell_index: usize,
    ) -> Result<Vec<Delivery>, SessionError> {
        let symbol = self.player(connection)
            .ok_or(SessionError::PlayerNotFound)?
            .symbol;

        if self.state == SessionState::Waiting {
            return Ok(vec![Delivery::to(
                connection,
                ServerMessage::error(ErrorCode::NotInMatch, "match has not started"),
            )]);
        }

        match self.engine.submit(Move::new(cell_index, symbol)) {
            Ok(result) => {
                let mut deliveries = vec![Delivery::both(ServerMessage::PlayerMoveFromServer {
                    cell_index: result.applied.cell_index,
                    symbol: result.applied.symbol,
                })];

                if let Some(eval) = result.finished {
                    self.state = SessionState::Finished(eval.outcome);
                    deliveries.push(Delivery::both(ServerMessage::MatchOver(MatchOverInfo {
                        outcome: eval.outcome,
                        winning_line: eval.line,
                    })));
                }

                Ok(deliveries)
            }
            Err(err) => {
                let code = match err {
                    MoveError::Invalid(_) => ErrorCode::InvalidMove,
                    MoveError::MatchAlreadyFinished => ErrorCode::MatchAlreadyFinished,
                };
                Ok(vec![Delivery::to(connection, ServerMessage::error(code, err.to_string()))])
            }
        }
    }

    /// Handle `connection` leaving the match.
    ///
    /// The remaining player receives exactly one `opponent_left_match`.
    /// Nothing is sent if the match was already decided.
    pub fn player_left(&mut self, connection: ConnectionId) -> Result<Vec<Delivery>, SessionError> {
        let remaining = self.opponent_of(connection)
            .ok_or(SessionError::PlayerNotFound)?
            .connection;

        if let SessionState::Finished(_) = self.state {
            return Ok(Vec::new());
        }

        self.engine.abandon();
        self.state = SessionState::Finished(Outcome::OpponentLeft);
        Ok(vec![Delivery::to(remaining, ServerMessage::OpponentLeftMatch)])
    }

    /// Send deliveries over the players' channels.
    ///
    /// Delivery is at-most-once and never waits: a message for a player whose
    /// outbound buffer is full or closed is dropped.
    pub fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            for player in &self.players {
                let wanted = match delivery.recipient {
                    Recipient::Both => true,
                    Recipient::Player(conn) => conn == player.connection,
                };
                if wanted {
                    offer(&player.sender, player.connection, delivery.message.clone());
                }
            }
        }
    }

    /// Player record for a connection.
    pub fn player(&self, connection: ConnectionId) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| p.connection == connection)
    }

    /// The other player's record.
    pub fn opponent_of(&self, connection: ConnectionId) -> Option<&MatchPlayer> {
        match &self.players {
            [a, b] if a.connection == connection => Some(b),
            [a, b] if b.connection == connection => Some(a),
            _ => None,
        }
    }

    /// Both players, circle first.
    pub fn players(&self) -> &[MatchPlayer; 2] {
        &self.players
    }

    /// Get session state.
    pub fn get_state(&self) -> SessionState {
        self.state
    }

    /// Check if the match is over.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Finished(_))
    }

    /// Turn engine (board, turn, history).
    pub fn engine(&self) -> &TurnEngine {
        &self.engine
    }
}

/// Hand a message to a connection's writer without waiting.
///
/// Returns false if it was dropped.
pub fn offer(sender: &mpsc::Sender<ServerMessage>, connection: ConnectionId, message: ServerMessage) -> bool {
    match sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            debug!("Outbound buffer of {} full, dropping {:?}", connection, message);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
