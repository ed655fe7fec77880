//! Agent session state.

use protocol::{PlayerInfo, SessionId};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Frames queued per session before new ones are dropped.
pub const OUTBOUND_BUFFER: usize = 64;

/// A connected agent session.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Player bound to this session once the engine admitted it.
    pub player: Option<PlayerInfo>,
    /// When the connection was accepted.
    pub connected_at: Instant,
    outbound: mpsc::Sender<String>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            addr,
            player: None,
            connected_at: Instant::now(),
            outbound,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.player.is_some()
    }

    /// Queue a text frame without waiting. Returns false if the frame was dropped.
    pub fn push(&self, frame: String) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = Session::new(1, "127.0.0.1:1".parse().unwrap(), tx);
        assert!(session.push("a".into()));
        assert!(!session.push("b".into()));
        assert_eq!(rx.try_recv().unwrap(), "a");
    }

    #[test]
    fn test_push_after_close() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new(1, "127.0.0.1:1".parse().unwrap(), tx);
        drop(rx);
        assert!(!session.push("a".into()));
        assert!(!session.is_joined());
    }
}
