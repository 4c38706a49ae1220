//! Safe multisig coordinator.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────────────────────────────────────────────┐
//!                 │                    SAFE COORDINATOR                       │
//!                 │                                                           │
//!   Factory logs  │  ┌────────────┐                                           │
//!   ──────────────┼─▶│ subscriber │──┐                                        │
//!                 │  └────────────┘  │   ┌───────────────┐    ┌────────────┐  │
//!                 │                  ├──▶│ state machine │───▶│   store    │  │
//!   Receipts      │  ┌────────────┐  │   └───────────────┘    └─────┬──────┘  │
//!   ──────────────┼─▶│   poller   │──┘                              │         │
//!                 │  └────────────┘          ┌──────────────┐       │         │
//!                 │                          │ materializer │◀──────┘         │
//!   Notifications │                          └──────┬───────┘                 │
//!   ◀─────────────┼─────────────────────────────────┘                         │
//!                 │                                                           │
//!   execTransaction  ┌───────────┐   ┌──────┐   ┌────────────┐               │
//!   ◀─────────────┼──│ submitter │◀──│ hash │◀──│ signatures │               │
//!                 │  └───────────┘   └──────┘   └────────────┘               │
//!                 │                                                           │
//!                 │  config · observability · resilience · lifecycle · admin  │
//!                 └───────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use safe_coordinator::config::load_config;
use safe_coordinator::lifecycle::bootstrap;
use safe_coordinator::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "safe-coordinator")]
#[command(about = "Reconciles Safe creations and executes multisig proposals", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        chain_id = config.blockchain.chain_id,
        "safe-coordinator starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let app = bootstrap(config).await?;
    app.run().await?;
    Ok(())
}
