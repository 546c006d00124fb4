//! `Peer`: the object each process builds around a [`Registry`],
//! implementing every operation named in `spec.md` §4.1/§6 -- the local
//! ones (`initialize`, `acquire`, `release`, `destroy`,
//! `register_peer`, `unregister_peer`, `display_status`) and, via
//! [`Dispatcher`], the ones remote peers invoke
//! (`request_token`, `obtain_token`) plus the membership-propagation
//! calls the name service drives (`register_peer`, `unregister_peer`
//! again, this time arriving over the wire -- see `SPEC_FULL.md` §6).

use std::net::SocketAddr;

use dlock_core::{Clock, PeerId, TokenState};

use crate::error::GatewayError;
use crate::gateway::{Dispatcher, PeerHandle};
use crate::registry::Registry;
use crate::wire::{Method, RemoteFault, Value};

pub struct Peer {
    own_id: PeerId,
    own_address: SocketAddr,
    registry: Registry,
}

impl Peer {
    /// Construct a peer directly, bypassing the name service. Used by
    /// tests and by [`Peer::join`] itself; real callers normally go
    /// through `join`.
    pub fn new(own_id: PeerId, own_address: SocketAddr) -> Self {
        Self {
            own_id,
            own_address,
            registry: Registry::new(own_id),
        }
    }

    /// Join the system through `name_service`: register this peer's
    /// listen address, receive back the assigned id and a snapshot of
    /// the current membership, and initialize the lock state from it.
    ///
    /// The real name service (see `apps/nameserverd`) is responsible
    /// for telling the *other* peers about this newcomer via
    /// `register_peer` wire calls; this call only needs to bootstrap
    /// the joining peer itself.
    pub fn join(own_address: SocketAddr, name_service: SocketAddr) -> Result<Self, GatewayError> {
        let (own_id, members) = PeerHandle::new(name_service).register(own_address.to_string())?;

        let peer = Self::new(own_id, own_address);

        let parsed: Vec<(PeerId, SocketAddr)> = members
            .into_iter()
            .filter_map(|(pid, addr)| match addr.parse() {
                Ok(addr) => Some((pid, addr)),
                Err(err) => {
                    tracing::warn!(pid, %addr, %err, "dropping unparsable peer address from registration snapshot");
                    None
                }
            })
            .collect();

        peer.initialize(parsed);
        Ok(peer)
    }

    pub fn own_id(&self) -> PeerId {
        self.own_id
    }

    pub fn own_address(&self) -> SocketAddr {
        self.own_address
    }

    /// The current value of this peer's Lamport clock.
    pub fn clock(&self) -> Clock {
        self.registry.lock().lock.clock()
    }

    /// `initialize()`: populate membership and the lock state. Must be
    /// called once, before any other operation.
    pub fn initialize(&self, members: Vec<(PeerId, SocketAddr)>) {
        let mut guard = self.registry.lock();
        let ids: Vec<PeerId> = members.iter().map(|&(pid, _)| pid).collect();
        guard.members = members.into_iter().collect();
        guard.lock.initialize(&ids);
    }

    /// `register_peer(pid)`.
    pub fn register_peer(&self, pid: PeerId, address: SocketAddr) {
        let mut guard = self.registry.lock();
        guard.members.insert(pid, address);
        guard.lock.register_peer(pid);
    }

    /// `unregister_peer(pid)`.
    pub fn unregister_peer(&self, pid: PeerId) {
        let mut guard = self.registry.lock();
        guard.members.remove(&pid);
        guard.lock.unregister_peer(pid);
    }

    /// `acquire()`: block until `state = TokenHeld`.
    pub fn acquire(&self) {
        let mut guard = self.registry.lock();
        let time = guard.lock.begin_acquire();

        if guard.lock.needs_token_request() {
            let targets: Vec<(PeerId, SocketAddr)> = guard
                .members
                .iter()
                .map(|(&pid, &addr)| (pid, addr))
                .collect();
            drop(guard);

            for (pid, addr) in targets {
                if let Err(err) = PeerHandle::new(addr).request_token(time, self.own_id) {
                    if err.is_transport() {
                        tracing::warn!(pid, %err, "request_token failed, evicting peer");
                        let mut guard = self.registry.lock();
                        guard.members.remove(&pid);
                        guard.lock.evict_peer(pid);
                    }
                }
            }

            guard = self.registry.lock();
        }

        while !guard.lock.has_token() {
            tracing::debug!("acquire: waiting for the token");
            guard = self.registry.wait(guard);
        }

        guard.lock.finish_acquire();
        tracing::info!("acquire: entering the critical section");
    }

    /// `release()`: give up the token, forwarding it if another peer is
    /// owed one.
    pub fn release(&self) {
        let mut guard = self.registry.lock();
        guard.lock.begin_release();

        if !guard.lock.should_forward() {
            return;
        }

        let order = guard.lock.priority_order(&guard.member_ids());

        for pid in order {
            if !guard.lock.should_forward() {
                break;
            }
            if !guard.lock.has_outstanding_request(pid) {
                continue;
            }
            let addr = match guard.members.get(&pid).copied() {
                Some(addr) => addr,
                None => continue,
            };
            let token = guard.lock.token_pairs();

            drop(guard);
            let outcome = PeerHandle::new(addr).obtain_token(token);
            guard = self.registry.lock();

            match outcome {
                Ok(()) => {
                    guard.lock.token_forwarded();
                    tracing::info!(pid, "release: token forwarded");
                    break;
                }
                Err(err) if err.is_transport() => {
                    tracing::warn!(pid, %err, "obtain_token failed, evicting peer");
                    guard.members.remove(&pid);
                    guard.lock.evict_peer(pid);
                }
                Err(err) => {
                    tracing::error!(pid, %err, "obtain_token rejected by peer");
                }
            }
        }
    }

    /// `destroy()`: leave cleanly, handing off the token unconditionally
    /// if still held or present. Reports the departure to `name_service`
    /// last, once the token is off this peer's hands.
    pub fn destroy(&self, name_service: SocketAddr) {
        self.registry.lock().lock.begin_destroy();

        if self.registry.lock().lock.state() == TokenState::TokenHeld {
            self.release();
        }

        let mut guard = self.registry.lock();
        if guard.lock.should_forward() {
            let order = guard.lock.priority_order(&guard.member_ids());

            for pid in order {
                if !guard.lock.should_forward() {
                    break;
                }
                let addr = match guard.members.get(&pid).copied() {
                    Some(addr) => addr,
                    None => continue,
                };
                let token = guard.lock.token_pairs();

                drop(guard);
                let outcome = PeerHandle::new(addr).obtain_token(token);
                guard = self.registry.lock();

                if outcome.is_ok() {
                    guard.lock.token_forwarded();
                    tracing::info!(pid, "destroy: token handed off");
                    break;
                }
                // Unreachable peers are ignored: membership is about to
                // be torn down anyway, per `spec.md` §4.4.
            }
        }
        drop(guard);

        if let Err(err) = PeerHandle::new(name_service).unregister(self.own_id) {
            tracing::warn!(%err, "failed to unregister from the name service");
        }
    }

    pub fn display_status(&self) -> String {
        self.registry.lock().lock.display_status()
    }

    fn handle_request_token(&self, time: Clock, pid: PeerId) {
        let should_forward = {
            let mut guard = self.registry.lock();
            guard.lock.request_token(time, pid)
        };
        if should_forward {
            self.release();
        }
    }

    fn handle_obtain_token(&self, token: &[(PeerId, Clock)]) {
        let mut guard = self.registry.lock();
        guard.lock.obtain_token(token);
        self.registry.notify_all();
    }
}

impl Dispatcher for Peer {
    fn dispatch(&self, method: Method) -> Result<Value, RemoteFault> {
        match method {
            Method::RequestToken { time, pid } => {
                self.handle_request_token(time, pid);
                Ok(Value::Unit)
            }
            Method::ObtainToken { token } => {
                self.handle_obtain_token(&token);
                Ok(Value::Unit)
            }
            Method::RegisterPeer { pid, address } => {
                let addr = address.parse().map_err(|err| RemoteFault {
                    kind: "InvalidAddress".into(),
                    detail: format!("{address}: {err}"),
                })?;
                self.register_peer(pid, addr);
                Ok(Value::Unit)
            }
            Method::UnregisterPeer { pid } => {
                self.unregister_peer(pid);
                Ok(Value::Unit)
            }
            Method::Register { .. } | Method::Unregister { .. } => Err(RemoteFault {
                kind: "UnsupportedMethod".into(),
                detail: "name-service-only method sent to a peer".into(),
            }),
        }
    }
}
