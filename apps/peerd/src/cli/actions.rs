use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::thread;

use dlock_net::{Dispatcher, Listener, Peer};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::arguments;
use crate::config::PeerConfig;
use crate::repl;

pub fn run(args: arguments::Run) -> eyre::Result<()> {
    let config = PeerConfig::from_path(&args.config)?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.logger.level).into())
        .from_env()?;
    fmt().with_env_filter(filter).init();

    let shutdown = crate::shutdown::install()?;

    // Reserve the listen address before registering with the name
    // service, so nothing can reach us at an address we don't yet own.
    let reservation = StdTcpListener::bind(config.listen_address)?;
    let address = reservation.local_addr()?;
    drop(reservation);

    let peer = Arc::new(Peer::join(address, config.name_service)?);
    tracing::info!(id = peer.own_id(), %address, "joined the lock group");

    let dispatcher: Arc<dyn Dispatcher> = peer.clone();
    let _listener = Listener::bind(address, dispatcher)?;

    // The REPL blocks on stdin, which a signal cannot interrupt
    // portably; watch the shutdown flag on a separate thread and leave
    // the group from there instead.
    let name_service = config.name_service;
    let signal_peer = peer.clone();
    thread::spawn(move || {
        crate::shutdown::park_until_shutdown(&shutdown);
        tracing::info!("received shutdown signal, leaving the lock group");
        signal_peer.destroy(name_service);
        std::process::exit(0);
    });

    repl::run(peer, name_service)
}
