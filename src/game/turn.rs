//! Turn Engine
//!
//! Enforces alternating turns over a single match and validates each
//! proposed move against the board.
//!
//! ```text
//! AwaitingMove(turn) --accepted move, no result--> AwaitingMove(turn.other())
//! AwaitingMove(turn) --accepted move, decided----> Finished(outcome)
//! AwaitingMove(turn) --player left---------------> Finished(OpponentLeft)
//! ```
//!
//! `Finished` is terminal.

use thiserror::Error;

use crate::game::board::{Board, Evaluation, InvalidMove, Outcome, Symbol};

/// Symbol that opens every match.
pub const FIRST_TURN: Symbol = Symbol::Circle;

/// A move request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    /// Target cell (0-8).
    pub cell_index: usize,
    /// Submitting symbol.
    pub symbol: Symbol,
}

impl Move {
    /// Create a move.
    pub fn new(cell_index: usize, symbol: Symbol) -> Self {
        Self { cell_index, symbol }
    }
}

/// Turn engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for `turn` to move.
    AwaitingMove {
        /// Symbol allowed to move.
        turn: Symbol,
    },
    /// Match decided.
    Finished(Outcome),
}

/// Move rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Wrong turn, occupied cell or out-of-range index.
    #[error("invalid move: {0}")]
    Invalid(#[from] InvalidMove),

    /// The match already reached a terminal outcome.
    #[error("match already finished")]
    MatchAlreadyFinished,
}

/// Result of an accepted move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The move as applied.
    pub applied: Move,
    /// Set when this move decided the match.
    pub finished: Option<Evaluation>,
}

/// Single-match turn state machine.
#[derive(Clone, Debug)]
pub struct TurnEngine {
    board: Board,
    state: TurnState,
    history: Vec<Move>,
}

impl TurnEngine {
    /// Fresh match with circle to move.
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            state: TurnState::AwaitingMove { turn: FIRST_TURN },
            history: Vec::new(),
        }
    }

    /// Submit a move.
    ///
    /// On rejection the engine is unchanged.
    pub fn submit(&mut self, mv: Move) -> Result<MoveOutcome, MoveError> {
        let turn = match self.state {
            TurnState::Finished(_) => return Err(MoveError::MatchAlreadyFinished),
            TurnState::AwaitingMove { turn } => turn,
        };

        if mv.symbol != turn {
            return Err(InvalidMove::WrongTurn { expected: turn }.into());
        }

        self.board = self.board.apply_move(mv.cell_index, mv.symbol)?;
        self.history.push(mv);

        let finished = self.board.evaluate();
        self.state = match finished {
            Some(eval) => TurnState::Finished(eval.outcome),
            None => TurnState::AwaitingMove { turn: turn.other() },
        };

        Ok(MoveOutcome { applied: mv, finished })
    }

    /// End an unfinished match because a player left.
    ///
    /// Returns false if the match was already finished.
    pub fn abandon(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.state = TurnState::Finished(Outcome::OpponentLeft);
        true
    }

    /// Current state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Symbol to move, `None` once finished.
    pub fn turn(&self) -> Option<Symbol> {
        match self.state {
            TurnState::AwaitingMove { turn } => Some(turn),
            TurnState::Finished(_) => None,
        }
    }

    /// Terminal outcome, if reached.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            TurnState::Finished(outcome) => Some(outcome),
            TurnState::AwaitingMove { .. } => None,
        }
    }

    /// Check if the match is over.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TurnState::Finished(_))
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Accepted moves in order.
    pub fn history(&self) -> &[Move] {
        &self.history
    }
}

impl Default for TurnEngine {
    fn default() -> Self {
        Self::new()
    }
}
