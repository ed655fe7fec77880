//! Agent -> Server message parsing.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Parsed agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the game as `player_id` on `team_id`.
    Join {
        player_id: u32,
        team_id: u32,
        #[serde(default)]
        name: String,
    },
    /// Move by one step; each axis is clamped to -1..=1 by the engine.
    Move { dx: i32, dy: i32 },
}

impl ClientMessage {
    /// Parse an agent message from a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(text)?)
    }

    /// Parse an agent message from a binary frame carrying UTF-8 JSON.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_without_name() {
        let msg = ClientMessage::parse(r#"{"type":"join","player_id":3,"team_id":1}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                player_id: 3,
                team_id: 1,
                name: String::new()
            }
        );
    }

    #[test]
    fn test_parse_move() {
        let msg = ClientMessage::parse_bytes(br#"{"type":"move","dx":-1,"dy":0}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move { dx: -1, dy: 0 });
    }

    #[test]
    fn test_rejects_unknown_type() {
        let err = ClientMessage::parse(r#"{"type":"teleport","x":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_rejects_blank_and_non_utf8() {
        assert!(matches!(ClientMessage::parse("  "), Err(ProtocolError::Empty)));
        assert!(matches!(
            ClientMessage::parse_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::InvalidUtf8)
        ));
    }
}
