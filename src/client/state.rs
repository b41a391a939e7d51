//! Client Match State
//!
//! Local mirror of a match as seen by one player. The board only changes
//! when the server broadcasts a move; clicking a cell merely produces the
//! request to send.

use tracing::warn;

use crate::game::board::{Board, Outcome, Symbol, WinningLine, CELL_COUNT};
use crate::game::turn::FIRST_TURN;
use crate::network::protocol::{ClientMessage, ServerError, ServerMessage};

/// Where the local player is in the match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not yet asked to play.
    Idle,
    /// Waiting in the matchmaking queue.
    Searching,
    /// The queue timed out without an opponent.
    NoOpponent,
    /// Match in progress.
    Playing,
    /// Match ended.
    Finished(Outcome),
    /// Server went away.
    Disconnected,
}

/// Client-side view of a match.
#[derive(Debug, Clone)]
pub struct ClientState {
    player_name: String,
    board: Board,
    current_turn: Symbol,
    playing_as: Option<Symbol>,
    opponent_name: Option<String>,
    phase: Phase,
    winning_line: Option<WinningLine>,
    last_error: Option<ServerError>,
}

impl ClientState {
    /// Create state for a player who has not joined the queue yet.
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            board: Board::new(),
            current_turn: FIRST_TURN,
            playing_as: None,
            opponent_name: None,
            phase: Phase::Idle,
            winning_line: None,
            last_error: None,
        }
    }

    /// Enter the queue. Returns the message to send.
    ///
    /// Only allowed before the first match, after `opponent_not_found` or once
    /// a match has ended; otherwise nothing changes and `None` is returned.
    pub fn request_to_play(&mut self) -> Option<ClientMessage> {
        if !self.can_request_to_play() {
            return None;
        }
        self.phase = Phase::Searching;
        self.last_error = None;
        Some(ClientMessage::RequestToPlay { player_name: self.player_name.clone() })
    }

    /// Check if the player may join the queue now.
    pub fn can_request_to_play(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::NoOpponent | Phase::Finished(_))
    }

    /// Player clicked a cell.
    ///
    /// Yields a `submit_move` only while the match runs, it is our turn and
    /// the cell is empty. The board itself is left untouched.
    pub fn click_cell(&self, index: usize) -> Option<ClientMessage> {
        if !self.is_my_turn() {
            return None;
        }
        if index >= CELL_COUNT || self.board.get(index).is_some() {
            return None;
        }
        Some(ClientMessage::SubmitMove { cell_index: index as i64 })
    }

    /// Apply a server event.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::OpponentFound { opponent_name, playing_as } => {
                self.board = Board::new();
                self.current_turn = FIRST_TURN;
                self.playing_as = Some(*playing_as);
                self.opponent_name = Some(opponent_name.clone());
                self.winning_line = None;
                self.phase = Phase::Playing;
            }
            ServerMessage::OpponentNotFound => {
                if self.phase == Phase::Searching {
                    self.phase = Phase::NoOpponent;
                }
            }
            ServerMessage::PlayerMoveFromServer { cell_index, symbol } => {
                match self.board.apply_move(*cell_index, *symbol) {
                    Ok(board) => {
                        self.board = board;
                        self.current_turn = symbol.other();
                    }
                    Err(e) => warn!("Ignoring server move out of sync with local board: {}", e),
                }
            }
            ServerMessage::MatchOver(info) => {
                self.phase = Phase::Finished(info.outcome);
                self.winning_line = info.winning_line;
            }
            ServerMessage::OpponentLeftMatch => {
                if self.phase == Phase::Playing {
                    self.phase = Phase::Finished(Outcome::OpponentLeft);
                }
            }
            ServerMessage::Error(err) => {
                self.last_error = Some(err.clone());
            }
            ServerMessage::Shutdown { .. } => {
                if !matches!(self.phase, Phase::Finished(_)) {
                    self.phase = Phase::Disconnected;
                }
            }
            ServerMessage::Pong { .. } => {}
        }
    }

    /// Check if the local player may move now.
    pub fn is_my_turn(&self) -> bool {
        self.phase == Phase::Playing && self.playing_as == Some(self.current_turn)
    }

    /// Human-readable status, in the voice of the local player.
    pub fn status(&self) -> String {
        match self.phase {
            Phase::Idle => "Not playing".to_string(),
            Phase::Searching => "Waiting for opponent...".to_string(),
            Phase::NoOpponent => "No opponent found, try again".to_string(),
            Phase::Playing if self.is_my_turn() => "Your turn".to_string(),
            Phase::Playing => format!(
                "Waiting for {}",
                self.opponent_name.as_deref().unwrap_or("opponent")
            ),
            Phase::Finished(Outcome::Draw) => "Match draw, try again".to_string(),
            Phase::Finished(Outcome::OpponentLeft) => {
                "You won the match. Opponent has left.".to_string()
            }
            Phase::Finished(outcome) => match outcome.winner() {
                Some(winner) if Some(winner) == self.playing_as => "You won the game".to_string(),
                Some(winner) => format!("{} won the game", winner),
                None => "Match over".to_string(),
            },
            Phase::Disconnected => "Disconnected from server".to_string(),
        }
    }

    /// Local player's display name.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Mirrored board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Symbol expected to move next.
    pub fn current_turn(&self) -> Symbol {
        self.current_turn
    }

    /// Symbol assigned by the server.
    pub fn playing_as(&self) -> Option<Symbol> {
        self.playing_as
    }

    /// Opponent's display name.
    pub fn opponent_name(&self) -> Option<&str> {
        self.opponent_name.as_deref()
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Cells to highlight after a win.
    pub fn winning_line(&self) -> Option<WinningLine> {
        self.winning_line
    }

    /// Most recent rejection from the server.
    pub fn last_error(&self) -> Option<&ServerError> {
        self.last_error.as_ref()
    }
}
