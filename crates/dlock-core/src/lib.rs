//! Token state machine for the second Ricart-Agrawala mutual-exclusion
//! algorithm.
//!
//! This crate holds none of the networking or threading concerns of the
//! distributed lock: it is the pure, synchronously-mutated state that a
//! caller drives under a monitor (see `dlock-net::registry::Registry`).
//! Every public method here assumes it is called with exclusive access
//! to `self`; callers are responsible for releasing any surrounding lock
//! before performing network I/O and re-acquiring it to feed results
//! back in.

mod state;

pub use state::{LockState, TokenState};

/// A peer's identity, assigned once by the name service at registration.
pub type PeerId = u64;

/// A Lamport-style logical clock value.
pub type Clock = u64;
