mod cli;
mod error;
mod kubernetes;
mod pipeline;
mod tail;
mod types;
mod utils;

use anyhow::Context;
use std::io::IsTerminal;
use tracing::{error, info};

use cli::Cli;
use kubernetes::KubeCluster;
use tail::Outcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cli, matches) =
        Cli::try_parse_with_matches(std::env::args_os()).unwrap_or_else(|e| e.exit());

    // Logs go to stderr so they never interleave with tailed output on stdout
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color = std::io::stdout().is_terminal();
    let config = cli
        .tail_config(&matches, color)
        .context("Invalid filter")?;

    let cluster = KubeCluster::connect(cli.in_cluster)
        .await
        .context("Failed to connect to the cluster")?;

    let outcome = tail::run(&cluster, config, tokio::io::stdout(), shutdown_signal())
        .await
        .context("kubetail failed")?;

    match outcome {
        Outcome::NoMatches => info!("No matching pods found"),
        Outcome::Completed { sources } => info!("Tailed {} pod(s)", sources),
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
