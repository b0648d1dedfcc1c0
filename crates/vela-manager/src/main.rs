use std::path::PathBuf;

use clap::Parser;
use tokio::sync::watch;
use vela_manager::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use vela_manager::observability;

#[derive(Debug, Parser)]
#[command(name = "vela-manager", version, about = "Application delivery control plane")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "VELA_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Extra manifest directory, on top of `manifests.dirs`
    #[arg(short, long)]
    manifests: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();
    let cli = Cli::parse();

    let mut cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    cfg.manifests.dirs.extend(cli.manifests);

    tracing::info!(path = %cli.config, "Configuration loaded");
    if let Err(e) = observability::apply_logging_level(&cfg.logging.level) {
        tracing::warn!(error = %e, "Keeping default log level");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = vela_manager::run(cfg, shutdown_rx).await {
        eprintln!("Controller error: {err:#}");
        std::process::exit(1);
    }
}
