//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames, internally tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::game::board::{Outcome, Symbol, WinningLine};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the matchmaking queue.
    RequestToPlay {
        /// Display name shown to the opponent.
        player_name: String,
    },

    /// Propose a move in the current match.
    ///
    /// Any integer is accepted here so that an out-of-range cell, negative
    /// included, is answered with `invalid_move`. A non-integer index is not
    /// a `submit_move` at all and gets `invalid_input`.
    SubmitMove {
        /// Target cell (0-8).
        cell_index: i64,
    },

    /// Leave the queue or the current match.
    Leave,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Match formed.
    OpponentFound {
        /// Opponent's display name.
        opponent_name: String,
        /// Symbol assigned to the receiving player.
        playing_as: Symbol,
    },

    /// No opponent arrived within the matchmaking window.
    OpponentNotFound,

    /// A move was accepted. Sent to both players, including the mover.
    PlayerMoveFromServer {
        /// Cell that was filled.
        cell_index: usize,
        /// Symbol placed.
        symbol: Symbol,
    },

    /// Match reached a decided result.
    MatchOver(MatchOverInfo),

    /// The other player disconnected or left.
    OpponentLeftMatch,

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message (sent only to the offending client).
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Terminal result broadcast to both players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOverInfo {
    /// Winner or draw.
    pub outcome: Outcome,
    /// Completed line to highlight (None on draw).
    pub winning_line: Option<WinningLine>,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error payload.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unparseable or unexpected message.
    InvalidInput,
    /// Wrong turn, occupied cell or out-of-range index.
    InvalidMove,
    /// Move submitted after the match ended.
    MatchAlreadyFinished,
    /// Already waiting in the queue.
    AlreadyQueued,
    /// Already playing a match.
    AlreadyInMatch,
    /// Not in a match.
    NotInMatch,
    /// Display name empty or too long.
    InvalidName,
    /// Connection limit reached.
    ServerFull,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_to_play_wire_shape() {
        let parsed = ClientMessage::from_json(
            r#"{"type":"request_to_play","player_name":"alice"}"#,
        ).unwrap();
        assert_eq!(parsed, ClientMessage::RequestToPlay { player_name: "alice".to_string() });
    }

    #[test]
    fn test_submit_move_wire_shape() {
        let parsed = ClientMessage::from_json(r#"{"type":"submit_move","cell_index":4}"#).unwrap();
        assert_eq!(parsed, ClientMessage::SubmitMove { cell_index: 4 });
    }

    #[test]
    fn test_negative_cell_index_parses() {
        let parsed = ClientMessage::from_json(r#"{"type":"submit_move","cell_index":-1}"#).unwrap();
        assert_eq!(parsed, ClientMessage::SubmitMove { cell_index: -1 });
        assert!(ClientMessage::from_json(r#"{"type":"submit_move","cell_index":1.5}"#).is_err());
    }

    #[test]
    fn test_unknown_message_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_opponent_found_json() {
        let msg = ServerMessage::OpponentFound {
            opponent_name: "bob".to_string(),
            playing_as: Symbol::Cross,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"opponent_found""#));
        assert!(json.contains(r#""playing_as":"cross""#));
    }

    #[test]
    fn test_player_move_json() {
        let msg = ServerMessage::PlayerMoveFromServer { cell_index: 7, symbol: Symbol::Circle };
        let json = msg.to_json().unwrap();
        assert!(json.contains("player_move_from_server"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_match_over_json() {
        let msg = ServerMessage::MatchOver(MatchOverInfo {
            outcome: Outcome::CrossWins,
            winning_line: Some([2, 4, 6]),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""outcome":"cross_wins""#));
        assert!(json.contains(r#""winning_line":[2,4,6]"#));
    }

    #[test]
    fn test_unit_variants_json() {
        assert_eq!(
            ServerMessage::OpponentLeftMatch.to_json().unwrap(),
            r#"{"type":"opponent_left_match"}"#
        );
        assert_eq!(
            ServerMessage::OpponentNotFound.to_json().unwrap(),
            r#"{"type":"opponent_not_found"}"#
        );
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::error(ErrorCode::MatchAlreadyFinished, "match already finished");
        let json = msg.to_json().unwrap();
        assert!(json.contains("match_already_finished"));
    }
}
