mod classify_commands;
mod config_commands;
mod run;
mod subscriber_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "mqttgram", about = "mqttgram: MQTT alerts to Telegram", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./mqttgram.toml and friends).
    #[arg(long, global = true, env = "MQTTGRAM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge (default when no subcommand is provided).
    Run,
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Manage the persisted subscriber list.
    Subscribers {
        #[command(subcommand)]
        action: subscriber_commands::SubscriberAction,
    },
    /// Show how a payload file would be turned into an alert.
    Classify {
        /// Topic the payload arrived on.
        #[arg(long)]
        topic: String,
        /// File holding the raw payload bytes.
        file: PathBuf,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    let config_path = cli.config.as_deref();
    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "mqttgram starting");
            run::run(config_path).await
        },
        Some(Commands::Check) => config_commands::check(config_path),
        Some(Commands::Subscribers { action }) => {
            subscriber_commands::handle_subscribers(config_path, action).await
        },
        Some(Commands::Classify { topic, file }) => {
            classify_commands::classify(config_path, &topic, &file)
        },
    }
}
