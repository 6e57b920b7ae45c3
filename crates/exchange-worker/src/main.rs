use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use exchange_worker::bootstrap;
use exchange_worker::config::{ConfigOverrides, LoggingConfig, WorkerConfig};
use exchange_worker::error::EXIT_CONFIG;

#[derive(Parser, Debug)]
#[command(
    name = "trade-exchange",
    about = "Trade exchange worker - accepts, declines and creates trade offers from RabbitMQ work queues"
)]
struct Cli {
    /// Path to a worker configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log at debug level when RUST_LOG is unset
    #[arg(long)]
    debug: bool,

    /// RabbitMQ host
    #[arg(long)]
    rmq_host: Option<String>,

    /// Redis host
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port
    #[arg(long)]
    redis_port: Option<u16>,

    /// Redis database index
    #[arg(long)]
    redis_db: Option<i64>,

    /// Declare the status exchange
    #[arg(long)]
    status: bool,

    /// Publish every outcome to the tradeResults exchange
    #[arg(long)]
    publish_result: bool,

    /// Maximum operations running at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            broker_host: self.rmq_host.clone(),
            store_host: self.redis_host.clone(),
            store_port: self.redis_port,
            store_db: self.redis_db,
            max_in_flight: self.max_in_flight,
            status: self.status,
            publish_results: self.publish_result,
            debug: self.debug,
            log_json: self.log_json,
        }
    }
}

fn load_config(cli: &Cli) -> Result<WorkerConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load worker config: {path}"))?,
        None => WorkerConfig::default(),
    };
    config.apply(&cli.overrides());
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let default_level = if logging.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    init_tracing(&config.logging);

    let shutdown = CancellationToken::new();
    let cancel = shutdown.clone();

    // Handle shutdown signals
    tokio::spawn(bootstrap::cancel_on_interrupt(tokio::signal::ctrl_c(), cancel));

    match bootstrap::run(config, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker stopped");
            ExitCode::from(e.exit_code())
        }
    }
}
