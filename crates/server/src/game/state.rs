//! Game state owned by the simulation engine.

use protocol::{GameSnapshot, PlayerInfo, PlayerView, SessionId};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Map width in cells.
pub const MAP_WIDTH: i32 = 50;
/// Map height in cells.
pub const MAP_HEIGHT: i32 = 50;

/// Why an agent action was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("session {0} already joined")]
    AlreadyJoined(SessionId),

    #[error("player id {0} is already taken")]
    PlayerIdTaken(u32),

    #[error("session {0} has not joined")]
    NotJoined(SessionId),
}

/// A player in the game.
#[derive(Debug, Clone)]
pub struct Player {
    pub info: PlayerInfo,
    pub x: i32,
    pub y: i32,
}

impl Player {
    fn view(&self) -> PlayerView {
        PlayerView {
            player_id: self.info.player_id,
            team_id: self.info.team_id,
            name: self.info.name.clone(),
            x: self.x,
            y: self.y,
        }
    }
}

/// Mutable simulation state. Always accessed under the runner's lock.
#[derive(Debug, Default)]
pub struct GameState {
    pub tick: u64,
    players: BTreeMap<u32, Player>,
    sessions: HashMap<SessionId, u32>,
    // Moves queued since the last tick: player id -> (dx, dy).
    pending_moves: BTreeMap<u32, (i32, i32)>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, player_id: u32) -> Option<&Player> {
        self.players.get(&player_id)
    }

    /// Admit a player. Each session may join once and player ids are unique.
    pub fn join(
        &mut self,
        session_id: SessionId,
        player_id: u32,
        team_id: u32,
        name: String,
    ) -> Result<PlayerInfo, GameError> {
        if self.sessions.contains_key(&session_id) {
            return Err(GameError::AlreadyJoined(session_id));
        }
        if self.players.contains_key(&player_id) {
            return Err(GameError::PlayerIdTaken(player_id));
        }

        let info = PlayerInfo {
            session_id,
            player_id,
            team_id,
            name,
        };
        let (x, y) = spawn_point(player_id, team_id);
        self.players.insert(
            player_id,
            Player {
                info: info.clone(),
                x,
                y,
            },
        );
        self.sessions.insert(session_id, player_id);
        Ok(info)
    }

    /// Queue a one-step move for the session's player. The latest move before a
    /// tick wins.
    pub fn queue_move(&mut self, session_id: SessionId, dx: i32, dy: i32) -> Result<(), GameError> {
        let player_id = *self
            .sessions
            .get(&session_id)
            .ok_or(GameError::NotJoined(session_id))?;
        self.pending_moves
            .insert(player_id, (dx.clamp(-1, 1), dy.clamp(-1, 1)));
        Ok(())
    }

    /// Advance one tick and return the resulting snapshot.
    pub fn step(&mut self) -> GameSnapshot {
        for (player_id, (dx, dy)) in std::mem::take(&mut self.pending_moves) {
            if let Some(player) = self.players.get_mut(&player_id) {
                player.x = (player.x + dx).clamp(0, MAP_WIDTH - 1);
                player.y = (player.y + dy).clamp(0, MAP_HEIGHT - 1);
            }
        }
        self.tick += 1;
        self.snapshot()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            tick: self.tick,
            players: self.players.values().map(Player::view).collect(),
        }
    }
}

/// Teams start on alternating map edges, spread out by player id.
fn spawn_point(player_id: u32, team_id: u32) -> (i32, i32) {
    let y = (player_id % MAP_HEIGHT as u32) as i32;
    let x = if team_id % 2 == 0 { 0 } else { MAP_WIDTH - 1 };
    (x, y)
}
