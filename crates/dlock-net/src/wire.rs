//! Wire framing for the remote-invocation transport.
//!
//! Every call is a single newline-terminated JSON frame in both
//! directions over a fresh connection. Unlike the Python original
//! (`orb.py`'s `Stub.__getattr__`, which forwards *any* attribute name
//! over the wire and synthesizes an exception class from the response's
//! error name), dispatch here is a closed, statically-typed `Method`
//! enum decoded centrally by the skeleton.

use dlock_core::{Clock, PeerId};
use serde::{Deserialize, Serialize};

/// One of the remote operations a peer (or the name service) may invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args")]
pub enum Method {
    /// Peer-to-peer: requester is asking for the token.
    RequestToken { time: Clock, pid: PeerId },
    /// Peer-to-peer: the token is being handed to the receiver.
    ObtainToken { token: Vec<(PeerId, Clock)> },
    /// Name-service-to-peer: a new peer joined the membership.
    RegisterPeer { pid: PeerId, address: String },
    /// Name-service-to-peer: a peer left (or was evicted).
    UnregisterPeer { pid: PeerId },
    /// Peer-to-name-service: register this peer's listen address.
    Register { address: String },
    /// Peer-to-name-service: unregister a previously-assigned id.
    Unregister { pid: PeerId },
}

/// The value a successful call returns, wire-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Unit,
    /// Reply to `Register`: the assigned id plus a snapshot of the
    /// membership known at registration time, so the joining peer can
    /// call `initialize` without a separate round-trip.
    Registered {
        pid: PeerId,
        members: Vec<(PeerId, String)>,
    },
}

/// A structured error returned at the call boundary. Transport failures
/// never produce this type; they are raised as `Error::Transport` by the
/// stub before a response frame is even read. This type is reserved for
/// faults the remote peer's operation itself reported.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("remote fault: {kind}: {detail}")]
pub struct RemoteFault {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Response {
    #[serde(rename = "result")]
    Ok { result: Value },
    #[serde(rename = "error")]
    Err { error: RemoteFault },
}

/// Encode a request as a single newline-terminated frame.
pub fn encode_request(method: &Method) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(method)?;
    line.push('\n');
    Ok(line)
}

/// Decode a single request frame (the trailing newline already stripped
/// by the reader).
pub fn decode_request(line: &str) -> serde_json::Result<Method> {
    serde_json::from_str(line)
}

/// Encode a response as a single newline-terminated frame.
pub fn encode_response(response: &Response) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    Ok(line)
}

/// Decode a single response frame.
pub fn decode_response(line: &str) -> serde_json::Result<Response> {
    serde_json::from_str(line)
}
