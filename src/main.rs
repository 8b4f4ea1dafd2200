//! tui-lifecycle demo runner.
//!
//! Starts a runtime with OS signal handling, waits for SIGINT/SIGTERM/SIGQUIT
//! (or the `--shutdown-after` timer), then prints the shutdown report as JSON.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tui_lifecycle::config::{load_config, AppConfig};
use tui_lifecycle::observability::{logging, metrics};
use tui_lifecycle::Runtime;

#[derive(Parser)]
#[command(name = "tui-lifecycle")]
#[command(about = "Run the lifecycle core until a terminal signal arrives", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trigger a shutdown after this many milliseconds
    #[arg(long, value_name = "MS")]
    shutdown_after: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("tui-lifecycle v{} starting", env!("CARGO_PKG_VERSION"));

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

    tracing::info!(
        timeout_ms = config.shutdown.timeout_ms,
        force_kill_timeout_ms = config.shutdown.force_kill_timeout_ms,
        signals = config.lifecycle.install_signal_handlers,
        "Configuration loaded"
    );

    let runtime = Runtime::new(config)?;

    if let Some(ms) = cli.shutdown_after {
        let orchestrator = Arc::clone(runtime.orchestrator());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            orchestrator.trigger("timer");
        });
    }

    let report = match runtime.run_until_shutdown().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Lifecycle reported a failure");
            runtime.orchestrator().last_report().ok_or(e)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    tracing::info!("Shutdown complete");
    Ok(())
}
