//! Game server launcher.

use clap::Parser;
use server::launch::{launch, LaunchOptions, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "game-server")]
#[command(about = "Multiplayer game server for autonomous agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Startup configuration file (JSON, or TOML by extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Exit instead of falling back to defaults on a malformed config
    #[arg(long)]
    strict_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = launch(
        LaunchOptions {
            config_path: cli.config,
            strict_config: cli.strict_config,
        },
        BufReader::new(tokio::io::stdin()),
    )
    .await;

    // stdin may still be blocked in a reader thread; exiting here does not wait for it.
    std::process::exit(code);
}
