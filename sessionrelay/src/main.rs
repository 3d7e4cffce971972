mod server;

use clap::{Parser, Subcommand};
use sessionrelay_core::config::RelayConfig;
use sessionrelay_core::logging::init_logging;

const DEFAULT_CONFIG: &str = "config/sessionrelay.toml";

#[derive(Parser, Debug)]
#[command(
    name = "sessionrelay",
    version,
    about = "Cross-origin session relay for cookie-restricted embeds"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay (default)
    Run {
        /// Path to the relay config file
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
}

fn main() {
    let cli = Cli::parse();

    init_logging();

    let config_path = match cli.command {
        Some(Command::Run { config }) => config,
        None => DEFAULT_CONFIG.to_string(),
    };

    let config = RelayConfig::from_file(&config_path).expect("Failed to load sessionrelay config");

    server::run(config).expect("Failed to start sessionrelay server");
}
