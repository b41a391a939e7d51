//! # Tic-Tac-Toe Online
//!
//! Server-authoritative two-player tic-tac-toe over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIC-TAC-TOE ONLINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Rules (pure, no I/O)                      │
//! │  ├── board.rs    - Cells, symbols, win/draw evaluation       │
//! │  └── turn.rs     - Turn order and move validation            │
//! │                                                              │
//! │  network/        - Server side                               │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Per-match state and deliveries            │
//! │  ├── relay.rs    - One task per match, ordered moves         │
//! │  ├── matchmaker.rs - FIFO queue, presence, active matches    │
//! │  └── server.rs   - WebSocket server                          │
//! │                                                              │
//! │  client/         - Client side                               │
//! │  ├── state.rs    - Local mirror of the match                 │
//! │  └── connection.rs - WebSocket connection to the server      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! Only the server decides whether a move is legal and when a match is
//! over. Clients render what the server broadcasts and never place a
//! symbol on their own board before the server echoes the move back.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, Outcome, Symbol, WinningLine, CELL_COUNT};
pub use game::turn::{Move, TurnEngine};
pub use network::protocol::{ClientMessage, ServerMessage};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
