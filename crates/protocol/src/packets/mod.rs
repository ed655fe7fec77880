//! Message and event payload definitions.
//!
//! This module contains both agent->server and server->agent messages, plus the
//! payloads the simulation engine and the transport hand to each other.

mod client;
mod server;

pub use client::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Transport-assigned identifier of one agent connection.
pub type SessionId = u64;

/// A player admitted into the game.
///
/// Published by the simulation engine after a successful join so the transport
/// can bind the session to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub session_id: SessionId,
    pub player_id: u32,
    pub team_id: u32,
    pub name: String,
}

/// Public view of one player inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: u32,
    pub team_id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
}

/// Game state produced after every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub tick: u64,
    pub players: Vec<PlayerView>,
}

/// A decoded agent message together with the session it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub session_id: SessionId,
    pub message: ClientMessage,
}
