//! podrouter - Bluetooth audio routing daemon
//!
//! Keeps application and system output on a connected Bluetooth headset while
//! the default input stays on the built-in microphone (or the user's choice).

mod commands;
mod control;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "podrouter=info,podrouter_core=info,podrouter_platform=info";

#[derive(Parser)]
#[command(name = "podrouter")]
#[command(about = "Route audio to Bluetooth headsets, keep the built-in mic", long_about = None)]
struct Cli {
    /// Log filter directive (overrides RUST_LOG), e.g. "debug" or "podrouter_core=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Settings file to use instead of the platform default
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the routing daemon until interrupted (default)
    Run,

    /// Print the devices relevant to routing
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Select the default input device by id; a running daemon keeps it as the override
    SelectInput { id: u32 },

    /// Ask the running daemon to apply routing now
    Apply,

    /// Show the running daemon's state
    Status,

    /// Enable automatic routing on device changes
    Enable,

    /// Disable automatic routing on device changes
    Disable,

    /// Manage the login item
    LaunchAtLogin {
        #[arg(value_enum)]
        action: LoginAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LoginAction {
    On,
    Off,
    Status,
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let settings_path = cli.settings.as_deref();
    match cli.command.unwrap_or(CliCommand::Run) {
        CliCommand::Run => commands::run(settings_path).await,
        CliCommand::Devices { json } => commands::devices(settings_path, json),
        CliCommand::SelectInput { id } => commands::select_input(settings_path, id).await,
        CliCommand::Apply => commands::apply(settings_path).await,
        CliCommand::Status => commands::status(settings_path).await,
        CliCommand::Enable => commands::set_enabled(settings_path, true).await,
        CliCommand::Disable => commands::set_enabled(settings_path, false).await,
        CliCommand::LaunchAtLogin { action } => match action {
            LoginAction::On => commands::launch_at_login(settings_path, true),
            LoginAction::Off => commands::launch_at_login(settings_path, false),
            LoginAction::Status => commands::launch_at_login_status(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_default() {
        let cli = Cli::try_parse_from(["podrouter"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["podrouter", "select-input", "99"]).unwrap();
        assert!(matches!(cli.command, Some(CliCommand::SelectInput { id: 99 })));

        let cli = Cli::try_parse_from(["podrouter", "apply"]).unwrap();
        assert!(matches!(cli.command, Some(CliCommand::Apply)));

        let cli = Cli::try_parse_from(["podrouter", "launch-at-login", "status"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(CliCommand::LaunchAtLogin {
                action: LoginAction::Status
            })
        ));

        let cli =
            Cli::try_parse_from(["podrouter", "devices", "--json", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Some(CliCommand::Devices { json: true })));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
