//! Server -> Agent message building.

use serde::{Deserialize, Serialize};

use super::{GameSnapshot, PlayerInfo};
use crate::ProtocolError;

/// Message sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The session is now bound to `player`.
    Joined { player: PlayerInfo },
    /// Game state after a tick.
    State { snapshot: GameSnapshot },
    /// The previous agent message could not be used.
    Error { message: String },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a server message (used by agents and tests).
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
