//! Background SIGINT/SIGTERM handling for a binary with no async
//! runtime: a `signal-hook`-registered flag instead of the teacher's
//! `tokio::signal::unix` (`apps/node/src/cli/actions.rs`), polled from
//! a plain background thread -- see `DESIGN.md` for why `tokio` itself
//! is dropped from the dependency set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Register SIGINT/SIGTERM against a shared flag and return it. The
/// flag is set to `true` the first time either signal arrives.
pub fn install() -> eyre::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    Ok(shutdown)
}

/// Block the calling thread, polling `shutdown` at a coarse interval,
/// until a registered signal sets it.
pub fn park_until_shutdown(shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
}
