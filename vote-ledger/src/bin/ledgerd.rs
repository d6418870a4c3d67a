//! Vote ledger daemon
//!
//! Opens the ledger, checks chain integrity, and seals on the configured
//! schedule until interrupted.

use anyhow::Context;
use vote_ledger::{Config, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("VOTE_LEDGER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = match std::env::var("VOTE_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("invalid VOTE_LEDGER_* environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        difficulty = config.difficulty,
        durable = config.storage.enabled,
        auto_seal = config.sealing.auto_seal,
        "Starting vote ledger"
    );

    let ledger = Ledger::open(config).await.context("failed to open ledger")?;

    let stats = ledger.stats();
    tracing::info!(
        blocks = stats.total_blocks,
        votes = stats.total_votes,
        pending = stats.pending_votes,
        "Ledger ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down vote ledger");
    ledger.shutdown().await?;
    Ok(())
}
