//! Launch orchestration.
//!
//! # Phases
//! ```text
//! Booting ──▶ WaitingForPlayers ──▶ Running ──▶ ShuttingDown ──▶ Stopped
//!    │                │                             ▲
//!    └────────────────┴──── shutdown signal ────────┘
//! ```
//!
//! Booting wires collaborator events, starts the transport and sleeps for the
//! configured grace period. WaitingForPlayers polls the engine's player count.
//! Running starts the tick loop and the operator console, then waits for the
//! shutdown signal. A transport that stops serving while running is fatal.
//! Phases only move forward.

pub mod gate;
pub mod shutdown;

pub use gate::{wait_for_players, POLL_INTERVAL};
pub use shutdown::Shutdown;

use crate::config::StartupConfig;
use crate::console::CommandListener;
use crate::events::Event;
use anyhow::Context;
use protocol::{GameSnapshot, PlayerInfo, ReceivedMessage};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// The simulation engine as seen by the orchestrator.
pub trait Simulation: Send + Sync + 'static {
    /// Number of joined players. Must be safe to call from any thread.
    fn player_count(&self) -> usize;

    /// Start the tick loop. Called once, when the gate opens.
    fn start(&self);

    /// Stop the tick loop. Must tolerate repeated calls.
    fn stop(&self);

    fn after_game_tick(&self) -> &Event<GameSnapshot>;

    fn after_new_player_join(&self) -> &Event<PlayerInfo>;

    /// Apply an agent message. Runs on the transport's connection task.
    fn handle_message_receive(&self, message: &ReceivedMessage);
}

/// The agent transport as seen by the orchestrator.
pub trait Transport: Send + Sync + 'static {
    /// Bind and start accepting agents, returning the bound address.
    fn start(&self) -> impl Future<Output = anyhow::Result<SocketAddr>> + Send;

    /// Resolves with the reason if the transport stops serving after `start`.
    fn closed(&self) -> impl Future<Output = anyhow::Error> + Send;

    fn after_message_receive(&self) -> &Event<ReceivedMessage>;

    /// Runs on the engine's tick task; must not block.
    fn handle_game_tick(&self, snapshot: &GameSnapshot);

    /// Runs on whichever task admitted the player; must not block.
    fn handle_new_player_join(&self, player: &PlayerInfo);
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Booting,
    WaitingForPlayers,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Booting => "booting",
            Phase::WaitingForPlayers => "waiting for players",
            Phase::Running => "running",
            Phase::ShuttingDown => "shutting down",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Connect engine and transport events.
///
/// Handlers hold weak references so the two collaborators do not keep each
/// other alive through their event tables.
pub fn wire_events<S: Simulation, T: Transport>(simulation: &Arc<S>, transport: &Arc<T>) {
    let sink = Arc::downgrade(transport);
    simulation.after_game_tick().subscribe(move |snapshot| {
        if let Some(transport) = sink.upgrade() {
            transport.handle_game_tick(snapshot);
        }
    });

    let sink = Arc::downgrade(transport);
    simulation.after_new_player_join().subscribe(move |player| {
        if let Some(transport) = sink.upgrade() {
            transport.handle_new_player_join(player);
        }
    });

    let sink = Arc::downgrade(simulation);
    transport.after_message_receive().subscribe(move |message| {
        if let Some(simulation) = sink.upgrade() {
            simulation.handle_message_receive(message);
        }
    });

    debug!("Event subscriptions registered");
}

/// Drives the server from boot to shutdown.
pub struct Orchestrator<S, T> {
    config: StartupConfig,
    simulation: Arc<S>,
    transport: Arc<T>,
    phase: watch::Sender<Phase>,
    shutdown: Shutdown,
    poll_interval: Duration,
}

impl<S: Simulation, T: Transport> Orchestrator<S, T> {
    pub fn new(config: StartupConfig, simulation: Arc<S>, transport: Arc<T>) -> Self {
        let (phase, _) = watch::channel(Phase::Booting);
        Self {
            config,
            simulation,
            transport,
            phase,
            shutdown: Shutdown::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn config(&self) -> &StartupConfig {
        &self.config
    }

    /// Handle for anything else that may request shutdown (e.g. Ctrl+C).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Observe phase changes.
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn current_phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Run to completion, reading operator commands from `commands` once running.
    ///
    /// Returns `Ok` after a requested shutdown. Any error is logged as fatal
    /// before it is returned; either way the simulation has been stopped
    /// exactly once and the phase is `Stopped`.
    pub async fn run<R>(&self, commands: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let result = self.drive(commands).await;
        if let Err(e) = &result {
            error!(fatal = true, "Game server crashed: {:#}", e);
        }

        self.advance(Phase::ShuttingDown);
        self.simulation.stop();
        self.advance(Phase::Stopped);
        result
    }

    async fn drive<R>(&self, commands: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        wire_events(&self.simulation, &self.transport);
        let addr = self
            .transport
            .start()
            .await
            .context("failed to start the agent server")?;
        info!("Accepting agents on {}", addr);

        let grace = self.config.waiting_time();
        if !grace.is_zero() {
            info!("Waiting {:?} before checking for players", grace);
        }
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => return Ok(()),
            _ = tokio::time::sleep(grace) => {}
        }

        self.advance(Phase::WaitingForPlayers);
        let expected = self.config.expected_player_num;
        let simulation = &self.simulation;
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => return Ok(()),
            polls = wait_for_players(|| simulation.player_count(), expected, self.poll_interval) => {
                info!("{} players joined, starting the game", expected);
                debug!("Player gate passed after {} polls", polls);
            }
        }

        self.advance(Phase::Running);
        self.simulation.start();
        let listener = tokio::spawn(CommandListener::new(commands, self.shutdown.clone()).run());

        let outcome = tokio::select! {
            _ = self.shutdown.wait() => Ok(()),
            reason = self.transport.closed() => Err(reason),
        };
        listener.abort();
        outcome
    }

    fn advance(&self, next: Phase) {
        let moved = self.phase.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            info!("Server is {}", next);
        }
    }
}
