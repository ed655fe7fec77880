//! Boot sequence for the `game-server` binary.

use crate::config::{ConfigFormat, ConfigLoader, StartupConfig};
use crate::game::GameRunner;
use crate::logging::{self, SeverityLevel};
use crate::orchestrator::Orchestrator;
use crate::server::AgentServer;
use anyhow::Context;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Process exit code after a fatal error.
pub const FATAL_EXIT_CODE: i32 = 1;

const BANNER_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Startup banner, one log line per entry.
pub fn banner() -> [String; 5] {
    [
        BANNER_RULE.to_string(),
        format!("Game Server v{}", env!("CARGO_PKG_VERSION")),
        env!("CARGO_PKG_DESCRIPTION").to_string(),
        format!("Licensed under {}", env!("CARGO_PKG_LICENSE")),
        BANNER_RULE.to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub config_path: PathBuf,
    /// Reject malformed configuration instead of falling back to defaults.
    pub strict_config: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            strict_config: false,
        }
    }
}

/// Configuration read from disk, plus anything worth reporting once logging is up.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: StartupConfig,
    /// A default file was written because none existed.
    pub created: bool,
    pub warnings: Vec<String>,
}

/// Read the configuration file at `path`.
///
/// A missing file yields the defaults and writes them to `path`. Unreadable or
/// malformed files yield the defaults too, unless `strict` is set.
pub fn load_config(path: &Path, strict: bool) -> anyhow::Result<LoadedConfig> {
    let format = ConfigFormat::from_path(path);
    let loader = ConfigLoader::new(format);
    let mut warnings = Vec::new();

    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let config = StartupConfig::default();
            let written = config
                .to_string_pretty(format)
                .and_then(|text| Ok(std::fs::write(path, text)?));
            if let Err(e) = &written {
                warnings.push(format!(
                    "Could not write default configuration to {}: {:#}",
                    path.display(),
                    e
                ));
            }
            return Ok(LoadedConfig {
                config,
                created: written.is_ok(),
                warnings,
            });
        }
        Err(e) if strict => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
        Err(e) => {
            warnings.push(format!("Could not read {}: {}; using defaults", path.display(), e));
            return Ok(LoadedConfig {
                config: StartupConfig::default(),
                created: false,
                warnings,
            });
        }
    };

    let config = match loader.try_load(&raw) {
        Ok(config) => config,
        Err(e) if strict => {
            return Err(e).with_context(|| format!("invalid configuration in {}", path.display()));
        }
        Err(e) => {
            warnings.push(format!("{} in {}; using defaults", e, path.display()));
            StartupConfig::default()
        }
    };

    Ok(LoadedConfig {
        config,
        created: false,
        warnings,
    })
}

/// Boot the server and run it until shutdown, reading operator commands from
/// `commands` (stdin in the binary). Returns the process exit code.
pub async fn launch<R>(options: LaunchOptions, commands: R) -> i32
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let loaded = match load_config(&options.config_path, options.strict_config) {
        Ok(loaded) => loaded,
        Err(e) => {
            if let Err(e) = logging::set_level(SeverityLevel::default().name()) {
                warn!("{}", e);
            }
            error!(fatal = true, "Failed to load configuration: {:#}", e);
            return FATAL_EXIT_CODE;
        }
    };
    let config = loaded.config;

    match logging::set_level(&config.log_level) {
        Ok(level) => {
            if level.name() != config.log_level {
                warn!("Unknown log level {:?}, using {}", config.log_level, level);
            }
        }
        Err(e) => warn!("{}", e),
    }

    for line in banner() {
        info!("{}", line);
    }
    if loaded.created {
        info!(
            "No configuration found, wrote defaults to {}",
            options.config_path.display()
        );
    }
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }
    info!(
        "Port {}, expecting {} players, grace period {:?}",
        config.server_port,
        config.expected_player_num,
        config.waiting_time()
    );
    debug!("{:?}", config);

    let simulation = Arc::new(GameRunner::new(&config));
    let transport = Arc::new(AgentServer::new(&config));
    let orchestrator = Orchestrator::new(config, simulation, transport);

    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                if shutdown.trigger() {
                    info!("Received Ctrl+C, shutting down");
                }
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    match orchestrator.run(commands).await {
        Ok(()) => {
            info!("Server stopped");
            0
        }
        // Already reported by the orchestrator.
        Err(_) => FATAL_EXIT_CODE,
    }
}
