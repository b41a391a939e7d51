//! Network Layer
//!
//! WebSocket server, matchmaking and per-match relays.
//! All rule decisions are delegated to `game/`.

pub mod protocol;
pub mod session;
pub mod relay;
pub mod matchmaker;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, MatchOverInfo, ServerError, ErrorCode};
pub use session::{ConnectionId, MatchId, MatchSession, MatchPlayer, SessionState, SessionError};
pub use relay::{spawn_relay, RelayHandle, RelayError, RelayEnd, SpawnedRelay};
pub use matchmaker::{Matchmaker, MatchmakingError, Pairing, Departure, Presence, QueueEntry};
pub use server::{GameServer, ServerConfig, GameServerError};
