pub(crate) mod command;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod feed;
pub(crate) mod surface;
pub(crate) mod tracker;

use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::TrackerConfig, error::ApplicationResult};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[clap(long, short)]
    /// Resets the config file to the defaults
    clean_config: bool,
    #[clap(long, short)]
    /// Flight feed endpoint, overrides the config file
    endpoint: Option<String>,
    #[clap(long, short)]
    /// Milliseconds between polls, overrides the config file
    poll_interval_ms: Option<u64>,
    #[clap(long)]
    /// Log as JSON lines instead of human readable text
    json_logs: bool,
    #[clap(long)]
    /// Print the effective configuration and exit
    print_config: bool,
}

fn init_logging(cli: &Cli, config: &TrackerConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = if cli.json_logs {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let (file_layer, guard) = match &config.log_directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "flight_tracker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    guard
}

fn main() -> ApplicationResult<()> {
    let cli = Cli::parse();
    let (mut config, config_path) = TrackerConfig::load(cli.clean_config)?;
    config.apply_overrides(cli.endpoint.clone(), cli.poll_interval_ms);
    config.validate()?;

    if cli.print_config {
        println!("# {}", config_path.to_string_lossy());
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let _guard = init_logging(&cli, &config);
    debug!(path = ?config_path, "Loaded config");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(tracker::run(config));
    // stdin reads block a worker thread, so don't wait for them on exit
    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("Stopped");
    result
}
