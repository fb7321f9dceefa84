//! Gatekeeping reverse proxy.
//!
//! ```text
//!     Client ──▶ listener ──▶ GatekeeperService ──admit──▶ upstream forwarder ──▶ Application
//!                                   │
//!                                   ├── reject ──▶ bare status (404 / 429)
//!                                   └── terminate ──▶ connection dropped
//!
//!     Sweeper (interval) ──▶ reputation + rate windows
//!     Admin API ──▶ status, bans, security log
//! ```

use clap::Parser;
use std::path::PathBuf;

use gatekeeper::config::{load_config, GatekeeperConfig};
use gatekeeper::lifecycle::{signals, Gateway, Shutdown};
use gatekeeper::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Request-admission gatekeeper in front of a web application", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(long)]
    bind: Option<String>,

    /// Override upstream.address
    #[arg(long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatekeeperConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.address = upstream;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatekeeper starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        ban_threshold = config.reputation.ban_threshold,
        ban_duration_secs = config.reputation.ban_duration_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let gateway = Gateway::start(&config, &shutdown).await?;
    signals::spawn_signal_handler(shutdown.clone());

    gateway.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
