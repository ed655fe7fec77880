//! Simulation engine: game state, tick loop and agent actions.

pub mod state;

pub use state::{GameError, GameState, MAP_HEIGHT, MAP_WIDTH};

use crate::config::StartupConfig;
use crate::events::Event;
use crate::orchestrator::Simulation;
use protocol::{ClientMessage, GameSnapshot, PlayerInfo, ReceivedMessage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// State shared between the runner handle and its tick task.
struct Shared {
    state: Mutex<GameState>,
    // Mirrors `state.player_count()` so the player gate never takes the lock.
    player_count: AtomicUsize,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    after_game_tick: Event<GameSnapshot>,
    after_new_player_join: Event<PlayerInfo>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The simulation engine collaborator.
pub struct GameRunner {
    shared: Arc<Shared>,
    tick_interval: Duration,
}

impl GameRunner {
    pub fn new(config: &StartupConfig) -> Self {
        Self::with_tick_interval(config.tick_interval())
    }

    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GameState::new()),
                player_count: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                stop_tx,
                after_game_tick: Event::new("after_game_tick"),
                after_new_player_join: Event::new("after_new_player_join"),
            }),
            tick_interval,
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.shared.lock_state().snapshot()
    }

    pub fn is_stopped(&self) -> bool {
        *self.shared.stop_tx.borrow()
    }

    fn join(&self, message: &ReceivedMessage, player_id: u32, team_id: u32, name: &str) {
        let joined = {
            let mut state = self.shared.lock_state();
            let joined = state.join(message.session_id, player_id, team_id, name.to_string());
            self.shared
                .player_count
                .store(state.player_count(), Ordering::Release);
            joined
        };

        match joined {
            Ok(player) => {
                info!(
                    "Player {} (team {}) joined from session {}",
                    player.player_id, player.team_id, player.session_id
                );
                self.shared.after_new_player_join.publish(&player);
            }
            Err(e) => warn!("Join rejected: {}", e),
        }
    }
}

impl Simulation for GameRunner {
    fn player_count(&self) -> usize {
        self.shared.player_count.load(Ordering::Acquire)
    }

    fn start(&self) {
        if self.is_stopped() {
            warn!("Game already stopped, not starting the tick loop");
            return;
        }
        if self.shared.started.swap(true, Ordering::AcqRel) {
            debug!("Game already running");
            return;
        }

        info!("Game started, ticking every {:?}", self.tick_interval);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(run_tick_loop(shared, self.tick_interval));
    }

    fn stop(&self) {
        let first = self.shared.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if first {
            info!("Game stopped at tick {}", self.shared.lock_state().tick);
        } else {
            debug!("Game already stopped");
        }
    }

    fn after_game_tick(&self) -> &Event<GameSnapshot> {
        &self.shared.after_game_tick
    }

    fn after_new_player_join(&self) -> &Event<PlayerInfo> {
        &self.shared.after_new_player_join
    }

    fn handle_message_receive(&self, message: &ReceivedMessage) {
        match &message.message {
            ClientMessage::Join {
                player_id,
                team_id,
                name,
            } => self.join(message, *player_id, *team_id, name),
            ClientMessage::Move { dx, dy } => {
                if let Err(e) = self.shared.lock_state().queue_move(message.session_id, *dx, *dy) {
                    warn!("Move rejected: {}", e);
                }
            }
        }
    }
}

/// Advance the game every `tick_interval` until stopped.
async fn run_tick_loop(shared: Arc<Shared>, tick_interval: Duration) {
    let start = Instant::now() + tick_interval;
    let mut ticker = interval_at(start, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stop_rx = shared.stop_tx.subscribe();

    loop {
        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            _ = ticker.tick() => {}
        }

        // Publish after releasing the lock: handlers may call back into the game.
        let snapshot = shared.lock_state().step();
        shared.after_game_tick.publish(&snapshot);
    }

    debug!("Tick loop exited");
}
