//! Client Side
//!
//! Headless client wiring: a local mirror of the match driven by server
//! events, and the WebSocket connection that feeds it. Rendering is left to
//! whoever embeds it.

pub mod state;
pub mod connection;

pub use state::{ClientState, Phase};
pub use connection::{GameClient, ClientError};
