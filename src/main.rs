mod config;
mod data;
mod pipeline;
mod server;
mod store;
mod transport;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use config::{load_dotenv, Config};
use pipeline::CrushSync;
use server::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Soybean crush-margin sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one sync and exits; meant for cron-style schedulers
    Run,
    /// Serves the HTTP trigger (`/refresh` runs a sync)
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Builds the pipeline from the environment.
///
/// # Errors
/// Returns an error if the store settings are missing or the HTTP client cannot be built;
/// both happen before any network traffic.
fn build_pipeline() -> anyhow::Result<CrushSync> {
    let config = Config::from_env().context("failed to load configuration")?;
    let pipeline = CrushSync::from_config(&config).context("failed to build transport")?;
    Ok(pipeline)
}

/// Runs a single sync and logs its outcome.
///
/// A handled failure (source outage, write error) is logged and still exits 0;
/// only errors raised before the sync could start make the process fail.
async fn run_once() -> anyhow::Result<()> {
    info!("starting scheduled data sync");
    let pipeline = build_pipeline().map_err(|e| {
        error!(error = %e, "fatal error during sync");
        e
    })?;

    let result = pipeline.sync().await;
    let summary = serde_json::to_string(&result)?;
    if result.is_success() {
        info!(result = %summary, "sync result");
    } else {
        warn!(result = %summary, "sync finished with an error result");
    }
    Ok(())
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("failed to parse bind address")?;
    let pipeline = build_pipeline()?;
    server::serve(addr, AppState::new(Arc::new(pipeline))).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG, so it has to be loaded before the filter is built.
    load_dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_once().await,
        Command::Serve(args) => run_server(args).await,
    }
}
