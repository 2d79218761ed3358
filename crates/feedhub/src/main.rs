use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use feedhub::prelude::*;

/// Real-time WebSocket hub with one-time-token login and live feeds.
#[derive(Debug, Parser)]
#[command(name = "feedhub", version)]
struct Cli {
    /// JSON settings file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the settings file.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "feedhub failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), HubError> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let mut builder = HubServer::builder().settings(settings);
    if let Some(addr) = cli.bind {
        builder = builder.bind(addr);
    }
    let server = builder.build().await?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    server.run(shutdown).await
}
