use clap::Parser;
use powchain_core::constants::{GENESIS_PROOF, MINING_PACE_MS, POW_DEFAULT_DIFFICULTY};
use powchain_core::{Ledger, LedgerConfig};
use std::{net::SocketAddr, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod stream;

use routes::AppState;

#[derive(Parser, Debug)]
#[command(name = "powchain-node")]
#[command(about = "Single-node proof-of-work ledger over HTTP")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8000
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: String,

    /// Leading zero hex digits required in a proof digest
    #[arg(long, default_value_t = POW_DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Proof recorded in the genesis block
    #[arg(long, default_value_t = GENESIS_PROOF)]
    genesis_proof: u64,

    /// Delay between streamed mining attempts, in milliseconds (0 disables)
    #[arg(long, default_value_t = MINING_PACE_MS)]
    pace_ms: u64,

    /// Search proofs on all cores for /mine
    #[arg(long)]
    parallel: bool,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_difficulty(self.difficulty)
            .with_genesis_proof(self.genesis_proof)
            .with_pace(Duration::from_millis(self.pace_ms))
            .with_parallel(self.parallel)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();
    let config = args.ledger_config();
    info!(
        difficulty = config.difficulty,
        genesis_proof = config.genesis_proof,
        pace_ms = args.pace_ms,
        parallel = config.parallel,
        "starting ledger"
    );
    let ledger = Ledger::new(config);
    let app = routes::router(AppState { ledger });

    let addr: SocketAddr = args.listen.parse()?;
    info!("powchain-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("powchain-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = Args::parse_from(["powchain-node"]);
        assert_eq!(args.listen, "127.0.0.1:8000");
        assert_eq!(args.ledger_config(), LedgerConfig::default());
    }

    #[test]
    fn args_overrides() {
        let args = Args::parse_from([
            "powchain-node",
            "--difficulty",
            "2",
            "--pace-ms",
            "0",
            "--genesis-proof",
            "7",
            "--parallel",
        ]);
        let config = args.ledger_config();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.genesis_proof, 7);
        assert!(config.pace.is_zero());
        assert!(config.parallel);
    }
}
