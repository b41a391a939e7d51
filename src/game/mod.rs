//! Game Logic Module
//!
//! Pure tic-tac-toe rules. No I/O, no async.
//!
//! ## Module Structure
//!
//! - `board`: 3x3 board, symbols, win/draw evaluation
//! - `turn`: Turn engine enforcing alternation and match termination

pub mod board;
pub mod turn;

// Re-export key types
pub use board::{Board, Evaluation, InvalidMove, Outcome, Symbol, WinningLine, CELL_COUNT};
pub use turn::{Move, MoveError, MoveOutcome, TurnEngine, TurnState};
