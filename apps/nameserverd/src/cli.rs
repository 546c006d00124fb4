use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dlock_net::{Dispatcher, Listener};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ServiceConfig;
use crate::registrar::NameService;

/// Minimal name service for a group of distributed-lock peers: assigns
/// ids, remembers addresses, and broadcasts membership changes.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the name service's configuration file.
    #[clap(long, short, default_value = "nameserverd.toml")]
    config: PathBuf,
}

pub fn run() -> eyre::Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_path(&cli.config)?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.logger.level).into())
        .from_env()?;
    fmt().with_env_filter(filter).init();

    let shutdown = crate::shutdown::install()?;

    let dispatcher: Arc<dyn Dispatcher> = Arc::new(NameService::new());
    let listener = Listener::bind(config.listen_address, dispatcher)?;
    tracing::info!(address = %listener.local_addr(), "name service listening");

    // The accept loop runs on the listener's own background thread;
    // just wait here for SIGINT/SIGTERM.
    crate::shutdown::park_until_shutdown(&shutdown);
    tracing::info!("received shutdown signal, exiting");

    Ok(())
}
