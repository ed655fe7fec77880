//! Game server library: launch orchestration around a simulation engine and
//! an agent transport.

pub mod config;
pub mod console;
pub mod events;
pub mod game;
pub mod launch;
pub mod logging;
pub mod orchestrator;
pub mod server;

pub use config::{ConfigError, ConfigFormat, ConfigLoader, StartupConfig};
pub use events::Event;
pub use game::GameRunner;
pub use launch::{launch, LaunchOptions, FATAL_EXIT_CODE};
pub use logging::SeverityLevel;
pub use orchestrator::{wire_events, Orchestrator, Phase, Shutdown, Simulation, Transport};
pub use server::AgentServer;
