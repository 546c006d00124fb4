//! Remote gateway, peer registry monitor, and wire protocol for the
//! distributed lock described in `spec.md`/`SPEC_FULL.md`.

pub mod error;
pub mod gateway;
pub mod peer;
pub mod registry;
pub mod wire;

pub use error::GatewayError;
pub use gateway::{Dispatcher, Listener, PeerHandle};
pub use peer::Peer;
pub use registry::Registry;
