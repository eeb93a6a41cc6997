//! Tablegate CLI - run and operate the tablegate gateway.

mod commands;
mod ui;

use clap::{Parser, Subcommand};
use tablegate_core::Config;
use tablegate_core::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "tablegate")]
#[command(about = "Tablegate - request shield for the catering API")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway operations
    Gateway {
        #[command(subcommand)]
        action: GatewayCommands,
    },

    /// Operate the request shield of a running gateway
    Shield {
        #[command(subcommand)]
        action: ShieldCommands,

        /// Gateway base URL (defaults to the configured local port)
        #[arg(long, global = true, env = "TABLEGATE_URL")]
        url: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum GatewayCommands {
    /// Start the gateway server
    Run {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Check gateway status
    Status,
}

#[derive(Subcommand)]
enum ShieldCommands {
    /// Show tracked, blocked and recent request counts
    Stats,

    /// Block a client address
    Block {
        /// Client address
        #[arg(long)]
        ip: String,

        /// Block reason
        #[arg(long)]
        reason: Option<String>,

        /// Block duration in seconds (defaults to the DDoS block duration)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Lift a block
    Unblock {
        /// Client address
        #[arg(long)]
        ip: String,
    },

    /// Forget all tracked clients and blocks
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key (e.g., shield.tiers.booking.max)
        key: String,
    },

    /// Validate configuration
    Validate,

    /// Print the configuration file path
    Path,
}

fn init_logging(verbose: bool) {
    // An unreadable config is reported by the command itself
    let settings = Config::load_default()
        .map(|c| c.settings)
        .unwrap_or_default();

    let level = if verbose || settings.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Gateway { action } => {
            let args = commands::gateway::GatewayArgs {
                action: match action {
                    GatewayCommands::Run { port, bind } => {
                        commands::gateway::GatewayAction::Run { port, bind }
                    }
                    GatewayCommands::Status => commands::gateway::GatewayAction::Status,
                },
            };
            commands::run_gateway(args).await?;
        }

        Commands::Shield { action, url } => {
            let args = commands::shield::ShieldArgs {
                url,
                action: match action {
                    ShieldCommands::Stats => commands::shield::ShieldAction::Stats,
                    ShieldCommands::Block {
                        ip,
                        reason,
                        duration_secs,
                    } => commands::shield::ShieldAction::Block {
                        ip,
                        reason,
                        duration_secs,
                    },
                    ShieldCommands::Unblock { ip } => {
                        commands::shield::ShieldAction::Unblock { ip }
                    }
                    ShieldCommands::Clear { yes } => commands::shield::ShieldAction::Clear { yes },
                },
            };
            commands::run_shield(args).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Get { key }) => commands::config::ConfigAction::Get(key),
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(commands::config::ConfigArgs { action })?;
        }
    }

    Ok(())
}
