use std::collections::BTreeMap;

use crate::{Clock, PeerId};

/// The three states of a peer's view of the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// This peer does not hold the token and has no outstanding grant.
    NoToken,
    /// This peer holds the token but is not using it.
    TokenPresent,
    /// This peer holds the token and is inside the critical section.
    TokenHeld,
}

/// The token state machine described in invariants 1-5: `state`, `clock`,
/// `request` and `token` vectors for a single peer.
///
/// `BTreeMap` is used (rather than `HashMap`) purely so `display_status`
/// and tests get a deterministic iteration order; it carries no
/// semantic weight.
#[derive(Debug)]
pub struct LockState {
    own_id: PeerId,
    state: TokenState,
    clock: Clock,
    request: BTreeMap<PeerId, Clock>,
    token: Option<BTreeMap<PeerId, Clock>>,
}

impl LockState {
    /// Construct an empty lock state for `own_id`. Must be followed by
    /// `initialize` once the peer registry membership is known.
    pub fn new(own_id: PeerId) -> Self {
        Self {
            own_id,
            state: TokenState::NoToken,
            clock: 0,
            request: BTreeMap::new(),
            token: None,
        }
    }

    pub fn own_id(&self) -> PeerId {
        self.own_id
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Populate `request`/`token` from the current membership. The peer
    /// that is first to register (no other members yet) receives the
    /// token implicitly.
    pub fn initialize(&mut self, members: &[PeerId]) {
        self.request.insert(self.own_id, 0);

        if members.is_empty() {
            self.state = TokenState::TokenPresent;
            let mut token = BTreeMap::new();
            token.insert(self.own_id, 0);
            self.token = Some(token);
        } else {
            self.state = TokenState::NoToken;
            for &pid in members {
                self.request.insert(pid, 0);
            }
        }
    }

    /// A peer joined the system.
    pub fn register_peer(&mut self, pid: PeerId) {
        self.clock += 1;
        self.request.insert(pid, 0);
        if let Some(token) = &mut self.token {
            token.insert(pid, 0);
        }
    }

    /// A peer left the system cleanly, or was evicted by the failure
    /// reaper.
    pub fn unregister_peer(&mut self, pid: PeerId) {
        self.clock += 1;
        self.evict_peer(pid);
    }

    /// Drop `pid` from the request/token vectors without touching the
    /// clock. Used by the failure reaper, which advances the clock
    /// itself as part of the operation that discovered the failure.
    pub fn evict_peer(&mut self, pid: PeerId) {
        self.request.remove(&pid);
        if let Some(token) = &mut self.token {
            token.remove(&pid);
        }
    }

    /// Step 1 of `acquire`: increment the clock. Returns the new clock
    /// value, used as the timestamp for any outbound `request_token`
    /// calls.
    pub fn begin_acquire(&mut self) -> Clock {
        self.clock += 1;
        self.clock
    }

    /// True once `begin_acquire` must be followed by broadcasting
    /// `request_token` to the current membership.
    pub fn needs_token_request(&self) -> bool {
        self.state == TokenState::NoToken
    }

    /// The predicate for the `acquire` condition-wait loop: keep waiting
    /// while this is false.
    pub fn has_token(&self) -> bool {
        self.state == TokenState::TokenPresent
    }

    /// Step 4 of `acquire`: transition to `TokenHeld` once the token has
    /// been observed present.
    pub fn finish_acquire(&mut self) {
        debug_assert_eq!(self.state, TokenState::TokenPresent);
        self.state = TokenState::TokenHeld;
        let clock = self.clock;
        self.token_mut().insert(self.own_id, clock);
    }

    /// Step 1 of `release`: increment the clock, and if this peer was
    /// holding the token, record the release time and fall back to
    /// `TokenPresent`.
    pub fn begin_release(&mut self) {
        self.clock += 1;
        if self.state == TokenState::TokenHeld {
            let clock = self.clock;
            self.token_mut().insert(self.own_id, clock);
            self.state = TokenState::TokenPresent;
        }
    }

    /// Step 1 of `destroy`: increment the clock unconditionally, before
    /// looking at `state` at all. Mirrors `distributedLock.py`'s
    /// `destroy()`, which does `self.time += 1` as its first statement
    /// regardless of whether the peer is holding, presenting, or
    /// without the token.
    pub fn begin_destroy(&mut self) {
        self.clock += 1;
    }

    /// True while this peer still has an un-forwarded token and should
    /// attempt to hand it off.
    pub fn should_forward(&self) -> bool {
        self.state == TokenState::TokenPresent
    }

    /// Priority order for token hand-off: higher ids ascending, then
    /// lower ids ascending. `members` excludes `own_id`.
    pub fn priority_order(&self, members: &[PeerId]) -> Vec<PeerId> {
        let mut higher: Vec<PeerId> = members.iter().copied().filter(|&p| p > self.own_id).collect();
        let mut lower: Vec<PeerId> = members.iter().copied().filter(|&p| p < self.own_id).collect();
        higher.sort_unstable();
        lower.sort_unstable();
        higher.extend(lower);
        higher
    }

    /// Whether `pid` has an outstanding request not yet satisfied by the
    /// current token vector, i.e. a candidate for `release`'s
    /// conditional hand-off.
    pub fn has_outstanding_request(&self, pid: PeerId) -> bool {
        let token = match &self.token {
            Some(token) => token,
            None => return false,
        };
        let requested = self.request.get(&pid).copied().unwrap_or(0);
        let granted = token.get(&pid).copied().unwrap_or(0);
        requested > granted
    }

    /// Serialize the token vector to the wire form: an ordered sequence
    /// of `(peer_id, timestamp)` pairs.
    pub fn token_pairs(&self) -> Vec<(PeerId, Clock)> {
        self.token
            .as_ref()
            .map(|token| token.iter().map(|(&p, &t)| (p, t)).collect())
            .unwrap_or_default()
    }

    /// Hand the token off: clear local possession. Called once an
    /// outbound `obtain_token` has been accepted by `pid`.
    pub fn token_forwarded(&mut self) {
        self.state = TokenState::NoToken;
    }

    /// Inbound `request_token(time, pid)`. Returns true if this peer
    /// should now attempt `release` to forward the token (mirrors the
    /// Python original's `if self.state == TOKEN_PRESENT: self.release()`).
    pub fn request_token(&mut self, req_time: Clock, pid: PeerId) -> bool {
        self.clock = (self.clock + 1).max(req_time + 1);
        let clock = self.clock;
        let entry = self.request.entry(pid).or_insert(0);
        *entry = (*entry).max(clock);

        self.state == TokenState::TokenPresent
    }

    /// Inbound `obtain_token`. Merges the wire-form token vector into
    /// local state and transitions to `TokenPresent`. Entries for peers
    /// this lock no longer has a request slot for are dropped silently
    /// (the sender's view may be stale), but every entry still advances
    /// the clock so invariant 5 in `spec.md` ("clock > max received
    /// timestamp") holds regardless.
    pub fn obtain_token(&mut self, incoming: &[(PeerId, Clock)]) {
        self.clock += 1;
        let token = self.token.get_or_insert_with(BTreeMap::new);

        for &(pid, time) in incoming {
            self.clock = self.clock.max(time + 1);
            if self.request.contains_key(&pid) {
                token.insert(pid, time);
            }
        }

        self.state = TokenState::TokenPresent;
    }

    pub fn display_status(&self) -> String {
        format!(
            "peer {} :: state={:?} clock={} request={:?} token={:?}",
            self.own_id, self.state, self.clock, self.request, self.token
        )
    }

    fn token_mut(&mut self) -> &mut BTreeMap<PeerId, Clock> {
        self.token.get_or_insert_with(BTreeMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_peer_gets_the_token() {
        let mut lock = LockState::new(1);
        lock.initialize(&[]);

        assert_eq!(lock.state(), TokenState::TokenPresent);
        assert_eq!(lock.token_pairs(), vec![(1, 0)]);
    }

    #[test]
    fn later_peer_starts_without_token() {
        let mut lock = LockState::new(2);
        lock.initialize(&[1]);

        assert_eq!(lock.state(), TokenState::NoToken);
        assert!(lock.needs_token_request());
    }

    #[test]
    fn priority_order_is_higher_then_lower() {
        let lock = LockState::new(2);
        let order = lock.priority_order(&[1, 3, 4]);
        assert_eq!(order, vec![3, 4, 1]);
    }

    #[test]
    fn s3_priority_prefers_requester_over_lower_id() {
        // Peers {1,2,3,4}; holder = 2. 4 then 1 have requested.
        let mut lock = LockState::new(2);
        lock.initialize(&[1, 3, 4]);
        lock.begin_acquire(); // own clock tick, irrelevant to the scenario
        lock.request_token(5, 4);
        lock.request_token(6, 1);

        let order = lock.priority_order(&[1, 3, 4]);
        assert_eq!(order, vec![3, 4, 1]);

        let mut picked = None;
        for candidate in order {
            if lock.has_outstanding_request(candidate) {
                picked = Some(candidate);
                break;
            }
        }
        assert_eq!(picked, Some(4));
    }

    #[test]
    fn request_token_is_idempotent() {
        let mut lock = LockState::new(2);
        lock.initialize(&[1]);

        lock.request_token(3, 1);
        let after_first = lock.has_outstanding_request(1);
        let clock_after_first = lock.clock();

        lock.request_token(3, 1);
        assert_eq!(after_first, lock.has_outstanding_request(1));
        assert!(lock.clock() >= clock_after_first);
    }

    #[test]
    fn obtain_token_round_trips_and_advances_clock() {
        let mut a = LockState::new(1);
        a.initialize(&[]);
        a.begin_acquire();
        let pairs = a.token_pairs();

        let mut b = LockState::new(2);
        b.initialize(&[1]);
        b.obtain_token(&pairs);

        assert_eq!(b.state(), TokenState::TokenPresent);
        assert!(b.clock() > pairs.iter().map(|&(_, t)| t).max().unwrap_or(0));
    }

    #[test]
    fn obtain_token_ignores_unknown_peers_but_still_advances_clock() {
        let mut lock = LockState::new(1);
        lock.initialize(&[2]);

        lock.obtain_token(&[(2, 0), (99, 7)]);

        assert_eq!(lock.state(), TokenState::TokenPresent);
        assert!(lock.clock() > 7);
        assert!(!lock.has_outstanding_request(99));
    }

    #[test]
    fn full_acquire_release_cycle() {
        let mut lock = LockState::new(1);
        lock.initialize(&[]);

        lock.begin_acquire();
        assert!(lock.has_token());
        lock.finish_acquire();
        assert_eq!(lock.state(), TokenState::TokenHeld);

        lock.begin_release();
        assert_eq!(lock.state(), TokenState::TokenPresent);
        assert!(lock.should_forward());
    }

    #[test]
    fn begin_destroy_bumps_clock_regardless_of_state() {
        let mut lock = LockState::new(2);
        lock.initialize(&[1]);
        assert_eq!(lock.state(), TokenState::NoToken);

        let before = lock.clock();
        lock.begin_destroy();
        assert_eq!(lock.clock(), before + 1);
    }
}
