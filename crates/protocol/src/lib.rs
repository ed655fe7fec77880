//! Shared protocol crate for the game server.
//!
//! This crate contains:
//! - Agent messages exchanged as JSON text frames
//! - Event payloads passed between the simulation engine and the transport
//! - Protocol error types

mod error;
pub mod packets;

pub use error::ProtocolError;
pub use packets::{
    ClientMessage, GameSnapshot, PlayerInfo, PlayerView, ReceivedMessage, ServerMessage,
    SessionId,
};
