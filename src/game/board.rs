//! Board Model
//!
//! Pure 3x3 board representation with win/draw detection.
//! No I/O; every operation is a function of its inputs.
//!
//! Cells are indexed row-major:
//!
//! ```text
//! 0 | 1 | 2
//! ---------
//! 3 | 4 | 5
//! ---------
//! 6 | 7 | 8
//! ```

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// Board side length.
pub const SIDE: usize = 3;

// =============================================================================
// SYMBOL
// =============================================================================

/// A player's mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbol {
    /// Moves first.
    Circle,
    /// Moves second.
    Cross,
}

impl Symbol {
    /// The opposing symbol.
    pub fn other(self) -> Symbol {
        match self {
            Symbol::Circle => Symbol::Cross,
            Symbol::Cross => Symbol::Circle,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Circle => write!(f, "circle"),
            Symbol::Cross => write!(f, "cross"),
        }
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Terminal result of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Circle completed a line.
    CircleWins,
    /// Cross completed a line.
    CrossWins,
    /// Board filled with no line.
    Draw,
    /// A player disconnected before the board decided the match.
    OpponentLeft,
}

impl Outcome {
    /// Outcome for a win by `symbol`.
    pub fn win_for(symbol: Symbol) -> Outcome {
        match symbol {
            Symbol::Circle => Outcome::CircleWins,
            Symbol::Cross => Outcome::CrossWins,
        }
    }

    /// Winning symbol, if the outcome is a win.
    pub fn winner(self) -> Option<Symbol> {
        match self {
            Outcome::CircleWins => Some(Symbol::Circle),
            Outcome::CrossWins => Some(Symbol::Cross),
            Outcome::Draw | Outcome::OpponentLeft => None,
        }
    }
}

/// Cell indices of a completed line.
pub type WinningLine = [usize; 3];

/// Result of evaluating a decided board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// Who won, or draw.
    pub outcome: Outcome,
    /// The completed line. `None` for a draw.
    pub line: Option<WinningLine>,
}

/// All lines in scan order: rows, then columns, then the two diagonals.
pub const LINES: [WinningLine; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// ERRORS
// =============================================================================

/// Reasons a move is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidMove {
    /// Index outside 0-8.
    #[error("cell index {0} is out of range 0-8")]
    OutOfRange(usize),

    /// Target cell already holds a symbol.
    #[error("cell {0} is already occupied")]
    Occupied(usize),

    /// Submitter does not hold the turn.
    #[error("it is {expected}'s turn")]
    WrongTurn {
        /// Symbol that holds the turn.
        expected: Symbol,
    },
}

// =============================================================================
// BOARD
// =============================================================================

/// 3x3 grid of cells, row-major.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [Option<Symbol>; CELL_COUNT],
}

impl Board {
    /// Empty board.
    pub const fn new() -> Self {
        Self { cells: [None; CELL_COUNT] }
    }

    /// Build a board from raw cells.
    pub const fn from_cells(cells: [Option<Symbol>; CELL_COUNT]) -> Self {
        Self { cells }
    }

    /// Symbol at `index`, `None` if empty or out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Symbol> {
        self.cells.get(index).copied().flatten()
    }

    /// Raw cells.
    pub fn cells(&self) -> &[Option<Symbol>; CELL_COUNT] {
        &self.cells
    }

    /// True when every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Indices of empty cells in ascending order.
    pub fn empty_cells(&self) -> Vec<usize> {
        (0..CELL_COUNT).filter(|&i| self.cells[i].is_none()).collect()
    }

    /// Number of cells holding `symbol`.
    pub fn count(&self, symbol: Symbol) -> usize {
        self.cells.iter().filter(|c| **c == Some(symbol)).count()
    }

    /// Return a board with `index` set to `symbol`.
    ///
    /// Fails if the index is out of range or the cell is occupied.
    pub fn apply_move(&self, index: usize, symbol: Symbol) -> Result<Board, InvalidMove> {
        if index >= CELL_COUNT {
            return Err(InvalidMove::OutOfRange(index));
        }
        if self.cells[index].is_some() {
            return Err(InvalidMove::Occupied(index));
        }

        let mut next = *self;
        next.cells[index] = Some(symbol);
        Ok(next)
    }

    /// Check the board for a decided result.
    ///
    /// Lines are scanned rows first, then columns, then the main and anti
    /// diagonal; the first complete line is reported. Returns a draw when the
    /// board is full with no line and `None` while the game continues.
    pub fn evaluate(&self) -> Option<Evaluation> {
        for line in LINES {
            let [a, b, c] = line;
            if let Some(symbol) = self.cells[a] {
                if self.cells[b] == Some(symbol) && self.cells[c] == Some(symbol) {
                    return Some(Evaluation {
                        outcome: Outcome::win_for(symbol),
                        line: Some(line),
                    });
                }
            }
        }

        if self.is_full() {
            return Some(Evaluation { outcome: Outcome::Draw, line: None });
        }

        None
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..SIDE {
            if row > 0 {
                writeln!(f, "---------")?;
            }
            for col in 0..SIDE {
                let index = row * SIDE + col;
                let mark = match self.cells[index] {
                    Some(Symbol::Circle) => "O".to_string(),
                    Some(Symbol::Cross) => "X".to_string(),
                    None => index.to_string(),
                };
                if col > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{}", mark)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
