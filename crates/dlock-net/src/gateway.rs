//! The Remote Gateway: a thin adapter translating inbound calls into
//! local operations, and outbound calls into a single newline-delimited
//! JSON frame over a fresh `TcpStream`, per `spec.md` §4.3/§6.
//!
//! This mirrors the split of the Python original's `orb.py` into a
//! `Stub` (outbound) and a `Skeleton` (inbound), but replaces its
//! dynamic `__getattr__`-based dispatch with the closed [`Method`] enum
//! decoded centrally by [`Dispatcher::dispatch`].

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use dlock_core::{Clock, PeerId};

use crate::error::GatewayError;
use crate::wire::{self, Method, RemoteFault, Response, Value};

/// Outbound handle to a single remote peer (or the name service). One
/// connection per call; nothing is pooled, per `spec.md` §5.
#[derive(Debug, Clone, Copy)]
pub struct PeerHandle {
    address: SocketAddr,
}

impl PeerHandle {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn call(&self, method: &Method) -> Result<Value, GatewayError> {
        let mut stream = TcpStream::connect(self.address)?;
        let request = wire::encode_request(method)?;
        stream.write_all(request.as_bytes())?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;

        if line.is_empty() {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection before responding",
            )));
        }

        match wire::decode_response(line.trim_end())? {
            Response::Ok { result } => Ok(result),
            Response::Err { error } => Err(GatewayError::Remote(error)),
        }
    }

    /// `request_token(time, pid)`, called by the requester on every
    /// member of its current membership view.
    pub fn request_token(&self, time: Clock, pid: PeerId) -> Result<(), GatewayError> {
        self.call(&Method::RequestToken { time, pid }).map(|_| ())
    }

    /// `obtain_token(token)`, the token hand-off.
    pub fn obtain_token(&self, token: Vec<(PeerId, Clock)>) -> Result<(), GatewayError> {
        self.call(&Method::ObtainToken { token }).map(|_| ())
    }

    /// Name-service-to-peer membership notification: a peer joined.
    pub fn register_peer(&self, pid: PeerId, address: String) -> Result<(), GatewayError> {
        self.call(&Method::RegisterPeer { pid, address }).map(|_| ())
    }

    /// Name-service-to-peer membership notification: a peer left.
    pub fn unregister_peer(&self, pid: PeerId) -> Result<(), GatewayError> {
        self.call(&Method::UnregisterPeer { pid }).map(|_| ())
    }

    /// Peer-to-name-service: register this peer's listen address.
    pub fn register(&self, address: String) -> Result<(PeerId, Vec<(PeerId, String)>), GatewayError> {
        match self.call(&Method::Register { address })? {
            Value::Registered { pid, members } => Ok((pid, members)),
            Value::Unit => Err(GatewayError::UnexpectedResponse),
        }
    }

    /// Peer-to-name-service: unregister on clean departure.
    pub fn unregister(&self, pid: PeerId) -> Result<(), GatewayError> {
        self.call(&Method::Unregister { pid }).map(|_| ())
    }
}

/// Anything that can serve as the inbound side of the gateway: the
/// `Peer`'s lock operations, or the name service's registrar.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, method: Method) -> Result<Value, RemoteFault>;
}

/// Listens for inbound connections and runs each one on its own thread,
/// per `spec.md` §5 ("one worker thread per inbound connection").
pub struct Listener {
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `addr` and start serving `dispatcher` in the background.
    /// `addr`'s port may be `0` to let the OS choose one; read back the
    /// chosen address with [`Listener::local_addr`].
    pub fn bind(addr: SocketAddr, dispatcher: Arc<dyn Dispatcher>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        thread::Builder::new()
            .name(format!("dlock-listener-{local_addr}"))
            .spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let dispatcher = Arc::clone(&dispatcher);
                            thread::spawn(move || handle_connection(stream, dispatcher.as_ref()));
                        }
                        Err(err) => {
                            tracing::error!(%err, "failed to accept inbound connection");
                        }
                    }
                }
            })?;

        Ok(Self { local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn handle_connection(stream: TcpStream, dispatcher: &dyn Dispatcher) {
    if let Err(err) = serve_one_request(stream, dispatcher) {
        tracing::debug!(%err, "connection to caller died");
    }
}

fn serve_one_request(mut stream: TcpStream, dispatcher: &dyn Dispatcher) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let response = match wire::decode_request(line.trim_end()) {
        Ok(method) => match dispatcher.dispatch(method) {
            Ok(result) => Response::Ok { result },
            Err(error) => Response::Err { error },
        },
        Err(err) => Response::Err {
            error: RemoteFault {
                kind: "ProtocolError".into(),
                detail: err.to_string(),
            },
        },
    };

    let frame = wire::encode_response(&response)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    stream.write_all(frame.as_bytes())?;
    stream.flush()
}
