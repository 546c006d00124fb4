//! The peer registry: a sequential-id registrar plus membership-change
//! broadcast, grounded in `orb.py`'s `Peer.start()` (`register` call
//! returning an id) and in `spec.md` §4's "peer registry" external
//! collaborator.
//!
//! Unlike a real `Peer`, the name service never joins the mutual
//! exclusion group itself, so it needs no [`dlock_core::LockState`] --
//! just the address book and the broadcast that keeps every peer's
//! copy of it current.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use dlock_core::PeerId;
use dlock_net::wire::{Method, RemoteFault, Value};
use dlock_net::{Dispatcher, PeerHandle};

pub struct NameService {
    inner: Mutex<Inner>,
}

struct Inner {
    members: BTreeMap<PeerId, SocketAddr>,
    next_id: PeerId,
}

impl NameService {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                members: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    fn register(&self, address: SocketAddr) -> (PeerId, Vec<(PeerId, String)>) {
        let (pid, snapshot, existing) = {
            let mut guard = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());

            let pid = guard.next_id;
            guard.next_id += 1;

            let snapshot: Vec<(PeerId, String)> = guard
                .members
                .iter()
                .map(|(&id, addr)| (id, addr.to_string()))
                .collect();

            guard.members.insert(pid, address);
            let existing: Vec<SocketAddr> = guard
                .members
                .iter()
                .filter(|&(&id, _)| id != pid)
                .map(|(_, &addr)| addr)
                .collect();

            (pid, snapshot, existing)
        };

        for addr in existing {
            if let Err(err) = PeerHandle::new(addr).register_peer(pid, address.to_string()) {
                tracing::warn!(pid, %addr, %err, "failed to notify peer of new membership");
            }
        }

        (pid, snapshot)
    }

    fn unregister(&self, pid: PeerId) {
        let remaining = {
            let mut guard = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
            guard.members.remove(&pid);
            guard.members.values().copied().collect::<Vec<_>>()
        };

        for addr in remaining {
            if let Err(err) = PeerHandle::new(addr).unregister_peer(pid) {
                tracing::warn!(pid, %addr, %err, "failed to notify peer of departure");
            }
        }
    }
}

impl Default for NameService {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for NameService {
    fn dispatch(&self, method: Method) -> Result<Value, RemoteFault> {
        match method {
            Method::Register { address } => {
                let addr = address.parse().map_err(|err| RemoteFault {
                    kind: "InvalidAddress".into(),
                    detail: format!("{address}: {err}"),
                })?;
                let (pid, members) = self.register(addr);
                Ok(Value::Registered { pid, members })
            }
            Method::Unregister { pid } => {
                self.unregister(pid);
                Ok(Value::Unit)
            }
            other => Err(RemoteFault {
                kind: "UnsupportedMethod".into(),
                detail: format!("{other:?} sent to the name service"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn free_addr() -> SocketAddr {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
    }

    #[test]
    fn first_registration_gets_id_one_and_empty_snapshot() {
        let ns = NameService::new();
        let (pid, members) = ns.register(free_addr());
        assert_eq!(pid, 1);
        assert!(members.is_empty());
    }

    #[test]
    fn second_registration_sees_the_first_in_its_snapshot() {
        let ns = NameService::new();
        let addr_a = free_addr();
        let (pid_a, _) = ns.register(addr_a);

        let (pid_b, members) = ns.register(free_addr());
        assert_eq!(pid_b, pid_a + 1);
        assert_eq!(members, vec![(pid_a, addr_a.to_string())]);
    }

    #[test]
    fn unregister_removes_from_future_snapshots() {
        let ns = NameService::new();
        let (pid_a, _) = ns.register(free_addr());
        ns.unregister(pid_a);

        let (_, members) = ns.register(free_addr());
        assert!(members.is_empty());
    }
}
