use thiserror::Error;

use crate::wire::RemoteFault;

/// Everything that can go wrong invoking a remote operation through the
/// gateway. Per `spec.md` §7, every variant except `Remote` collapses to
/// a single "transport error" for the failure reaper's purposes: an I/O
/// failure, a connection that closed before responding, or a frame that
/// didn't parse are all indistinguishable from the caller's point of
/// view -- the peer is unreachable.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("response did not match the call that was made")]
    UnexpectedResponse,

    #[error(transparent)]
    Remote(#[from] RemoteFault),
}

impl GatewayError {
    /// True for anything the failure reaper should treat as "this peer
    /// is dead": everything but a structured remote-side fault.
    pub fn is_transport(&self) -> bool {
        !matches!(self, GatewayError::Remote(_))
    }
}
