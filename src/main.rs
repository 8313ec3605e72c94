#![forbid(unsafe_code)]

//! `session-annotator`: batch annotation server and its worker processes.
//!
//! `serve` runs the HTTP job API. `worker` is started by the server once per
//! job; it reads its job spec from stdin and writes progress to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use session_annotator::api::{self, AppState};
use session_annotator::config::GlobalConfig;
use session_annotator::worker::entry::run_worker;
use session_annotator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "session-annotator",
    about = "Batch annotation of elicitation sessions",
    version,
    long_about = None
)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP job API.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a single job; spawned by `serve`, not meant to be run by hand.
    #[command(hide = true)]
    Worker,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let is_worker = matches!(args.command, Command::Worker);
    init_tracing(args.log_format, is_worker)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let result = runtime.block_on(async move {
        match args.command {
            Command::Serve { config } => serve(config).await,
            Command::Worker => run_worker(tokio::io::stdin(), tokio::io::stdout())
                .await
                .map(|_| ()),
        }
    });

    // A worker's stdin reader may still be parked on a blocking read.
    runtime.shutdown_background();
    result
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = Arc::new(GlobalConfig::load_from_path(&config_path)?);
    info!(
        scratch_root = %config.scratch_root.display(),
        languages = config.languages.len(),
        "configuration loaded"
    );

    let ct = CancellationToken::new();
    let state = Arc::new(AppState::new(config));

    let server_ct = ct.clone();
    let server = tokio::spawn(async move {
        if let Err(err) = api::serve(state, server_ct).await {
            error!(%err, "job API failed");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = server.await;
    info!("session-annotator shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Everything logs to stderr; a worker's stdout carries the progress protocol.
fn init_tracing(log_format: LogFormat, worker: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(!worker);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
