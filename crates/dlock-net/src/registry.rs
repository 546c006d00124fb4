//! The Peer Registry Monitor: the single mutual-exclusion gate guarding
//! both the lock state and the membership set, per `spec.md` §4.2.
//!
//! Unlike the teacher's async reactor (`yuv-p2p`'s poll loop), this
//! monitor is a plain `std::sync::{Mutex, Condvar}` pair: the core's
//! concurrency model is threads blocking on network I/O and on a
//! condition variable, not an event loop, so the standard library
//! primitives are the idiomatic fit (see `DESIGN.md`).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex, MutexGuard};

use dlock_core::{LockState, PeerId};

/// Everything the monitor protects: the lock's state machine plus the
/// address book used to build outbound [`crate::gateway::PeerHandle`]s.
pub struct Inner {
    pub lock: LockState,
    pub members: BTreeMap<PeerId, SocketAddr>,
}

pub struct Registry {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Registry {
    pub fn new(own_id: PeerId) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lock: LockState::new(own_id),
                members: BTreeMap::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    /// Acquire the monitor. Mirrors `peer_list.lock.acquire()` in the
    /// Python original, made exception-safe via RAII: the guard's `Drop`
    /// releases the monitor on every exit path, including panics.
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Atomically release the monitor and block until woken by
    /// [`Registry::notify_all`], then re-acquire it. Callers must
    /// predicate-loop on the wake-up per `spec.md` §9 to tolerate
    /// spurious wake-ups.
    pub fn wait<'a>(&'a self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.condvar
            .wait(guard)
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Wake every `acquire()` waiting on this registry. At most one
    /// local caller waits per peer, so broadcasting is cheap.
    pub fn notify_all(&self) {
        self.condvar.notify_all();
    }
}

impl Inner {
    /// Ids of every known peer, excluding this one (the lock's own id
    /// is tracked separately inside `LockState`).
    pub fn member_ids(&self) -> Vec<PeerId> {
        self.members.keys().copied().collect()
    }
}
