//! Command-line interface for the laserlink relay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use laserlink_core::RelayConfig;

/// laserlink - command relay for long-polling laser controllers.
#[derive(Parser, Debug)]
#[command(name = "laserlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to ./laserlink.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay server.
    Serve {
        /// Address to bind to, overriding the configuration.
        #[arg(long)]
        bind: Option<String>,
        /// Directory for the database files, overriding the configuration.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn init_logging(verbose: bool) {
    let json_logging = std::env::var("LASERLINK_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if verbose { "laserlink=debug" } else { "laserlink=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = RelayConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Serve { bind, data_dir } => run_server(config, bind, data_dir).await,
        Command::Config => print_config(config),
    }
}

async fn run_server(
    mut config: RelayConfig,
    bind: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    if config.admin_token().is_none() {
        tracing::warn!("No auth token configured; admin routes are open");
    }
    laserlink_api::run(config).await
}

fn print_config(mut config: RelayConfig) -> Result<()> {
    if config.admin_token().is_some() {
        config.auth_token = Some("********".to_string());
    }
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
