//! A registered connection and its transport task.
//!
//! Callers never touch the socket: they submit requests to the transport task through a queue and
//! the task serializes round trips over a single persistent channel. When a round trip fails the
//! task drops the broken stream and performs a fresh handshake on the next call, which is how the
//! fabric recovers from transient network failure without ever re-registering a connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::Health;
use crate::channel::{Channel, Receiver, Sender};
use crate::id::Id;
use crate::protocol::{Request, Response};
use crate::stopper::Stopper;
use crate::tls::upgrader::Upgrader;
use crate::{Error, Result};

pub(crate) struct RpcCall {
    pub request: Request,
    pub reply: oneshot::Sender<Result<Response>>,
}

/// A live connection to one peer, registered under its address for the process lifetime.
pub struct Connection {
    addr: String,
    peer_id: Id,
    calls: mpsc::Sender<RpcCall>,
    health: Mutex<Health>,
}

impl Connection {
    pub(crate) fn new(addr: String, peer_id: Id, calls: mpsc::Sender<RpcCall>) -> Connection {
        Connection { addr, peer_id, calls, health: Mutex::new(Health::NotYetHeartbeated) }
    }

    /// The address this connection is registered under.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The peer identity observed during the dial-time handshake.
    pub fn peer_id(&self) -> Id {
        self.peer_id
    }

    pub fn health(&self) -> Health {
        self.health.lock().unwrap().clone()
    }

    pub(crate) fn set_health(&self, health: Health) {
        *self.health.lock().unwrap() = health;
    }

    /// Perform one request/response round trip over the shared transport.
    pub async fn call(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.calls.send(RpcCall { request, reply }).await.map_err(|_| Error::Cancelled)?;
        response.await.map_err(|_| Error::Cancelled)?
    }
}

type ChannelHalves = (Sender<Request, Response>, Receiver<Request, Response>);

/// The task owning a connection's stream. One per connection.
pub(crate) struct Transport {
    peer_addr: SocketAddr,
    upgrader: Arc<Upgrader>,
    compression: bool,
    /// Identity pinned at dial time; reconnects must present the same certificate.
    expected_peer: Id,
    stream: Option<ChannelHalves>,
    calls: mpsc::Receiver<RpcCall>,
    stopper: Stopper,
}

impl Transport {
    /// Spawn the transport task over an already-established stream and return its queue.
    pub(crate) fn start(
        peer_addr: SocketAddr,
        upgrader: Arc<Upgrader>,
        compression: bool,
        expected_peer: Id,
        stream: ChannelHalves,
        stopper: Stopper,
    ) -> mpsc::Sender<RpcCall> {
        let (tx, rx) = mpsc::channel(8);
        let transport = Transport {
            peer_addr,
            upgrader,
            compression,
            expected_peer,
            stream: Some(stream),
            calls: rx,
            stopper,
        };
        tokio::spawn(transport.run());
        tx
    }

    async fn run(mut self) {
        loop {
            let call = tokio::select! {
                _ = self.stopper.on_quiesce() => {
                    // Quiesce stops the traffic; the stream itself is held until the stop phase.
                    self.stopper.on_stop().await;
                    return;
                }
                call = self.calls.recv() => match call {
                    Some(call) => call,
                    None => return,
                },
            };
            let result = self.roundtrip(call.request).await;
            if result.is_err() {
                // Next call gets a fresh handshake.
                self.stream = None;
            }
            let _ = call.reply.send(result);
        }
    }

    async fn roundtrip(&mut self, request: Request) -> Result<Response> {
        if self.stream.is_none() {
            self.stream = Some(self.reconnect().await?);
        }
        let (sender, receiver) = self.stream.as_mut().ok_or(Error::EmptyConnection)?;
        sender.send(request).await.map_err(|err| Error::ChannelError(format!("{:?}", err)))?;
        match receiver.recv().await.map_err(|err| Error::ChannelError(format!("{:?}", err)))? {
            Some(response) => Ok(response),
            None => Err(Error::EmptyResponse),
        }
    }

    async fn reconnect(&self) -> Result<ChannelHalves> {
        debug!(peer = %self.peer_addr, "re-establishing transport");
        let socket = TcpStream::connect(&self.peer_addr).await.map_err(Error::IO)?;
        let stream = self.upgrader.upgrade(socket).await.map_err(Error::IO)?;
        if stream.is_tls() && stream.peer_id()? != self.expected_peer {
            warn!(peer = %self.peer_addr, "peer certificate changed across reconnect");
            return Err(Error::UnexpectedPeer);
        }
        let channel: Channel<Request, Response> = Channel::wrap(stream, self.compression);
        Ok(channel.split())
    }
}
