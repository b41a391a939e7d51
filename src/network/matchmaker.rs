//! Matchmaker
//!
//! Owned registry of the matchmaking queue, per-connection presence and the
//! active match table. The server shares one instance behind a lock, so
//! every operation here is atomic with respect to other connections.
//!
//! Pairing is strictly FIFO: the head of the queue plays circle against the
//! newly arriving requester, who plays cross.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::game::board::Symbol;
use crate::network::protocol::{ErrorCode, ServerMessage};
use crate::network::relay::RelayHandle;
use crate::network::session::{ConnectionId, MatchId, MatchPlayer, MatchSession};

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Matchmaking queue entry.
#[derive(Debug)]
pub struct QueueEntry {
    /// Waiting connection.
    pub connection: ConnectionId,
    /// Display name.
    pub player_name: String,
    /// When the connection joined the queue.
    pub queued_at: Instant,
    /// Message channel to this connection.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// Where a connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// In the queue.
    Searching,
    /// In an active match.
    Playing(MatchId),
    /// Its last match has ended.
    MatchOver,
}

/// Result of a play request.
#[derive(Debug)]
pub enum Pairing {
    /// Queued; nothing is sent until an opponent arrives.
    Queued,
    /// Paired with the queue head. The session still needs a relay.
    Paired(MatchSession),
}

/// What a disconnect affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Connection had no queue entry or match.
    Idle,
    /// Removed from the queue.
    LeftQueue,
    /// Its match was cancelled.
    LeftMatch {
        /// Cancelled match.
        match_id: MatchId,
        /// Player left behind.
        remaining: ConnectionId,
    },
}

/// Matchmaking errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchmakingError {
    /// Already waiting.
    #[error("already waiting for an opponent")]
    AlreadyQueued,

    /// Already playing.
    #[error("already in a match")]
    AlreadyInMatch,

    /// No match for this connection.
    #[error("not in a match")]
    NotInMatch,

    /// The connection's match has ended.
    #[error("match already finished")]
    MatchAlreadyFinished,

    /// Display name empty or too long.
    #[error("player name must be 1-32 characters")]
    InvalidName,
}

impl MatchmakingError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MatchmakingError::AlreadyQueued => ErrorCode::AlreadyQueued,
            MatchmakingError::AlreadyInMatch => ErrorCode::AlreadyInMatch,
            MatchmakingError::NotInMatch => ErrorCode::NotInMatch,
            MatchmakingError::MatchAlreadyFinished => ErrorCode::MatchAlreadyFinished,
            MatchmakingError::InvalidName => ErrorCode::InvalidName,
        }
    }

    /// Error message for the client.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// A match in active storage.
#[derive(Debug)]
struct ActiveMatch {
    players: [ConnectionId; 2],
    relay: Option<RelayHandle>,
    departure: Option<oneshot::Sender<ConnectionId>>,
}

/// Queue, presence and match table.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: VecDeque<QueueEntry>,
    presence: BTreeMap<ConnectionId, Presence>,
    matches: BTreeMap<MatchId, ActiveMatch>,
}

impl Matchmaker {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the queue, or pair with whoever has waited longest.
    pub fn request_to_play(
        &mut self,
        connection: ConnectionId,
        player_name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Pairing, MatchmakingError> {
        let player_name = player_name.trim();
        if player_name.is_empty() || player_name.chars().count() > MAX_NAME_LEN {
            return Err(MatchmakingError::InvalidName);
        }

        match self.presence.get(&connection) {
            Some(Presence::Searching) => return Err(MatchmakingError::AlreadyQueued),
            Some(Presence::Playing(_)) => return Err(MatchmakingError::AlreadyInMatch),
            Some(Presence::MatchOver) | None => {}
        }

        let Some(waiting) = self.queue.pop_front() else {
            self.queue.push_back(QueueEntry {
                connection,
                player_name: player_name.to_string(),
                queued_at: Instant::now(),
                sender,
            });
            self.presence.insert(connection, Presence::Searching);
            debug!("{} queued for matchmaking ({} waiting)", connection, self.queue.len());
            return Ok(Pairing::Queued);
        };

        let match_id = uuid::Uuid::new_v4().into_bytes();
        let circle = MatchPlayer {
            connection: waiting.connection,
            name: waiting.player_name,
            symbol: Symbol::Circle,
            sender: waiting.sender,
        };
        let cross = MatchPlayer {
            connection,
            name: player_name.to_string(),
            symbol: Symbol::Cross,
            sender,
        };

        self.matches.insert(match_id, ActiveMatch {
            players: [circle.connection, cross.connection],
            relay: None,
            departure: None,
        });
        self.presence.insert(circle.connection, Presence::Playing(match_id));
        self.presence.insert(cross.connection, Presence::Playing(match_id));

        debug!("Paired {} (circle) with {} (cross)", circle.connection, cross.connection);
        Ok(Pairing::Paired(MatchSession::new(match_id, circle, cross)))
    }

    /// Bind a running relay to its match.
    ///
    /// Returns false if the match is no longer active; the departure is then
    /// dropped, which ends the relay.
    pub fn attach_relay(
        &mut self,
        match_id: MatchId,
        relay: RelayHandle,
        departure: oneshot::Sender<ConnectionId>,
    ) -> bool {
        match self.matches.get_mut(&match_id) {
            Some(active) => {
                active.relay = Some(relay);
                active.departure = Some(departure);
                true
            }
            None => false,
        }
    }

    /// Relay for the connection's active match.
    pub fn route_move(&self, connection: ConnectionId) -> Result<RelayHandle, MatchmakingError> {
        match self.presence.get(&connection) {
            Some(Presence::Playing(match_id)) => self.matches
                .get(match_id)
                .and_then(|m| m.relay.clone())
                .ok_or(MatchmakingError::NotInMatch),
            Some(Presence::MatchOver) => Err(MatchmakingError::MatchAlreadyFinished),
            Some(Presence::Searching) | None => Err(MatchmakingError::NotInMatch),
        }
    }

    /// Remove a connection from the queue or cancel its match.
    ///
    /// A cancelled match leaves active storage at once; its relay is told
    /// which player left so the other one can be notified.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Departure {
        match self.presence.remove(&connection) {
            Some(Presence::Searching) => {
                self.queue.retain(|e| e.connection != connection);
                Departure::LeftQueue
            }
            Some(Presence::Playing(match_id)) => {
                let Some(mut active) = self.matches.remove(&match_id) else {
                    return Departure::Idle;
                };

                let remaining = if active.players[0] == connection {
                    active.players[1]
                } else {
                    active.players[0]
                };
                self.presence.insert(remaining, Presence::MatchOver);

                if let Some(departure) = active.departure.take() {
                    let _ = departure.send(connection);
                }

                Departure::LeftMatch { match_id, remaining }
            }
            Some(Presence::MatchOver) | None => Departure::Idle,
        }
    }

    /// Remove a match that reached its outcome.
    pub fn close_match(&mut self, match_id: &MatchId) -> bool {
        let Some(active) = self.matches.remove(match_id) else {
            return false;
        };

        for connection in active.players {
            if self.presence.get(&connection) == Some(&Presence::Playing(*match_id)) {
                self.presence.insert(connection, Presence::MatchOver);
            }
        }
        true
    }

    /// Remove queue entries that have waited at least `max_wait`.
    pub fn expire_waiting(&mut self, max_wait: Duration, now: Instant) -> Vec<QueueEntry> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());

        for entry in self.queue.drain(..) {
            if now.saturating_duration_since(entry.queued_at) >= max_wait {
                expired.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.queue = kept;

        for entry in &expired {
            self.presence.remove(&entry.connection);
        }
        expired
    }

    /// Presence of a connection.
    pub fn presence(&self, connection: ConnectionId) -> Option<Presence> {
        self.presence.get(&connection).copied()
    }

    /// Waiting connections, head first.
    pub fn queued(&self) -> Vec<ConnectionId> {
        self.queue.iter().map(|e| e.connection).collect()
    }

    /// Get matchmaking queue size.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Get active match count.
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}
