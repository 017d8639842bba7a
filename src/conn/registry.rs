//! The connection registry and the per-connection heartbeat loop.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{Future, FutureExt, Shared};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::connection::{Connection, Transport};
use super::{Health, HeartbeatFailure};
use crate::channel::Channel;
use crate::clock::Clock;
use crate::constants::*;
use crate::monitor::{RemoteClockMonitor, RemoteOffset};
use crate::protocol::{PingRequest, PingResponse, Request, Response, ServiceError};
use crate::stopper::Stopper;
use crate::tls::upgrader::Upgrader;
use crate::{Error, Result};

/// The knobs of the connection fabric.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Address this node advertises in its pings, keying the passive offset samples peers keep
    /// about it.
    pub node_addr: String,
    /// Opaque cluster token; peers outside the cluster refuse our pings.
    pub cluster_id: String,
    /// Base period between pings.
    pub heartbeat_interval: Duration,
    /// Per-ping deadline; zero means no deadline (tests only).
    pub heartbeat_timeout: Duration,
    /// Lifetime of a clock-offset sample.
    pub offset_ttl: Duration,
    /// A round trip above `maximum_ping_duration_mult * max_offset` disqualifies its sample.
    pub maximum_ping_duration_mult: u32,
    /// Quorum floor of the clock-offset check.
    pub min_offset_samples: usize,
    /// Snappy-compress RPC frames on connections dialled by this node.
    pub rpc_compression: bool,
}

impl Default for FabricConfig {
    fn default() -> FabricConfig {
        FabricConfig {
            node_addr: String::new(),
            cluster_id: String::new(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            offset_ttl: OFFSET_TTL,
            maximum_ping_duration_mult: MAXIMUM_PING_DURATION_MULT,
            min_offset_samples: MIN_OFFSET_SAMPLES,
            rpc_compression: false,
        }
    }
}

/// A failed dial, in cloneable form so every waiter on a shared dial future sees it.
#[derive(Debug, Clone)]
struct DialFailure(String);

type DialFuture =
    Shared<Pin<Box<dyn Future<Output = std::result::Result<Arc<Connection>, DialFailure>> + Send>>>;

enum ConnEntry {
    /// The first dial for this address is still in flight; later callers await the same future.
    Dialing(DialFuture),
    Ready(Arc<Connection>),
}

type HeartbeatCallback = Arc<dyn Fn() + Send + Sync>;

/// Hands out connections, one per peer address, for the lifetime of the process.
///
/// The registry dials lazily, re-uses aggressively and never tears a connection down before the
/// process quiesces. Transient failures after a successful dial are the transport's business and
/// show up in [ConnRegistry::conn_health], never as dial errors.
pub struct ConnRegistry {
    config: FabricConfig,
    clock: Arc<dyn Clock>,
    remote_clocks: Arc<RemoteClockMonitor>,
    upgrader: Arc<Upgrader>,
    stopper: Stopper,
    heartbeat_cb: Mutex<Option<HeartbeatCallback>>,
    conns: Mutex<HashMap<String, ConnEntry>>,
}

impl ConnRegistry {
    pub fn new(
        config: FabricConfig,
        clock: Arc<dyn Clock>,
        upgrader: Arc<Upgrader>,
        stopper: Stopper,
    ) -> Arc<ConnRegistry> {
        let remote_clocks = Arc::new(RemoteClockMonitor::new(
            clock.clone(),
            config.offset_ttl,
            config.min_offset_samples,
        ));
        Arc::new(ConnRegistry {
            config,
            clock,
            remote_clocks,
            upgrader,
            stopper,
            heartbeat_cb: Mutex::new(None),
            conns: Mutex::new(HashMap::new()),
        })
    }

    /// The monitor fed by this registry's heartbeat loops. The node's heartbeat *service* shares
    /// it, so active and passive samples land in one place.
    pub fn remote_clocks(&self) -> Arc<RemoteClockMonitor> {
        self.remote_clocks.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Register a callback fired once per connection, on its first successful heartbeat. Callers
    /// use it to await a connection becoming actually usable rather than merely dialled.
    pub fn set_heartbeat_cb<F: Fn() + Send + Sync + 'static>(&self, cb: F) {
        *self.heartbeat_cb.lock().unwrap() = Some(Arc::new(cb));
    }

    /// Return the connection registered under `addr`, dialling it first if necessary.
    ///
    /// The first caller performs the TCP connect and TLS handshake; concurrent callers for the
    /// same address join the in-flight attempt and see its outcome. A failed handshake vacates
    /// the slot, so a later `dial` may retry. Cancellation only abandons the caller's await: the
    /// dial itself runs to completion for the benefit of the other waiters.
    pub async fn dial(self: &Arc<Self>, addr: &str) -> Result<Arc<Connection>> {
        let dialing = {
            let mut conns = self.conns.lock().unwrap();
            match conns.get(addr) {
                Some(ConnEntry::Ready(conn)) => return Ok(conn.clone()),
                Some(ConnEntry::Dialing(fut)) => fut.clone(),
                None => {
                    let fut = self.clone().spawn_dial(addr.to_owned());
                    conns.insert(addr.to_owned(), ConnEntry::Dialing(fut.clone()));
                    fut
                }
            }
        };
        dialing.await.map_err(|DialFailure(cause)| Error::Dial(cause))
    }

    /// The current health verdict for `addr`. Never blocks.
    pub fn conn_health(&self, addr: &str) -> Health {
        match self.conns.lock().unwrap().get(addr) {
            None => Health::NotConnected,
            Some(ConnEntry::Dialing(_)) => Health::NotYetHeartbeated,
            Some(ConnEntry::Ready(conn)) => conn.health(),
        }
    }

    fn spawn_dial(self: Arc<Self>, addr: String) -> DialFuture {
        let handle = tokio::spawn(async move {
            let result = self.establish(&addr).await;
            let mut conns = self.conns.lock().unwrap();
            match &result {
                Ok(conn) => {
                    conns.insert(addr.clone(), ConnEntry::Ready(conn.clone()));
                }
                Err(err) => {
                    warn!(peer = %addr, error = %err, "dial failed");
                    conns.remove(&addr);
                }
            }
            result.map_err(|err| DialFailure(err.to_string()))
        });
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(DialFailure(format!("dial task failed: {}", err))),
            }
        }
        .boxed()
        .shared()
    }

    async fn establish(self: &Arc<Self>, addr: &str) -> Result<Arc<Connection>> {
        let peer_addr: SocketAddr = addr
            .to_socket_addrs()
            .map_err(|_| Error::PeerParseError)?
            .next()
            .ok_or(Error::PeerParseError)?;
        let socket = TcpStream::connect(&peer_addr).await.map_err(Error::IO)?;
        let stream = self.upgrader.upgrade(socket).await.map_err(Error::IO)?;
        let peer_id = stream.peer_id()?;
        let channel: Channel<Request, Response> =
            Channel::wrap(stream, self.config.rpc_compression);

        let calls = Transport::start(
            peer_addr,
            self.upgrader.clone(),
            self.config.rpc_compression,
            peer_id,
            channel.split(),
            self.stopper.clone(),
        );
        let conn = Arc::new(Connection::new(addr.to_owned(), peer_id, calls));

        // Exactly one heartbeat loop per connection, alive until quiesce.
        let registry = self.clone();
        let heartbeat_conn = conn.clone();
        tokio::spawn(async move { registry.run_heartbeat(heartbeat_conn).await });

        info!(peer = %addr, id = %peer_id, "connection established");
        Ok(conn)
    }

    /// Drive one connection's heartbeats until quiesce.
    async fn run_heartbeat(self: Arc<Self>, conn: Arc<Connection>) {
        let max_ping_nanos = self.config.maximum_ping_duration_mult as i64
            * self.clock.max_offset().as_nanos() as i64;
        let mut latest = RemoteOffset::default();
        let mut heartbeated = false;

        loop {
            if self.stopper.is_quiescing() {
                return;
            }

            let send_time = self.clock.now_nanos();
            let request = Request::Ping(PingRequest {
                ping: PING_PAYLOAD.to_owned(),
                offset_nanos: latest.offset,
                cluster_id: self.config.cluster_id.clone(),
                node_addr: self.config.node_addr.clone(),
            });

            match self.ping_once(&conn, request).await {
                Ok(response) => {
                    let recv_time = self.clock.now_nanos();
                    let round_trip = recv_time - send_time;
                    if round_trip > max_ping_nanos {
                        // Too noisy to bound the remote clock; report the empty sample so a
                        // stale predecessor can be evicted, and count the tick as a failure.
                        debug!(peer = conn.addr(), round_trip, "ping too slow for a usable sample");
                        latest = RemoteOffset::default();
                        self.remote_clocks.update_offset(conn.addr(), latest);
                        conn.set_health(Health::Unhealthy(HeartbeatFailure::PingTooSlow));
                    } else {
                        let remote_time_now = response.server_time + round_trip / 2;
                        latest = RemoteOffset::new(
                            remote_time_now - recv_time,
                            round_trip / 2,
                            recv_time,
                        );
                        self.remote_clocks.update_offset(conn.addr(), latest);
                        conn.set_health(Health::Healthy);
                        if !heartbeated {
                            heartbeated = true;
                            let cb = self.heartbeat_cb.lock().unwrap().clone();
                            if let Some(cb) = cb {
                                cb();
                            }
                        }
                    }
                }
                Err(failure) => {
                    debug!(peer = conn.addr(), cause = %failure, "heartbeat failed");
                    conn.set_health(Health::Unhealthy(failure));
                }
            }

            tokio::select! {
                _ = self.stopper.on_quiesce() => return,
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
            }
        }
    }

    async fn ping_once(
        &self,
        conn: &Connection,
        request: Request,
    ) -> std::result::Result<PingResponse, HeartbeatFailure> {
        let call = conn.call(request);
        let outcome = if self.config.heartbeat_timeout.is_zero() {
            call.await
        } else {
            match tokio::time::timeout(self.config.heartbeat_timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(HeartbeatFailure::Timeout),
            }
        };
        match outcome {
            Ok(Response::Pong(response)) => Ok(response),
            Ok(Response::Error(ServiceError::ClusterIdMismatch { expected, got })) => {
                Err(HeartbeatFailure::ClusterMismatch { expected, got })
            }
            Ok(Response::Error(err)) => Err(HeartbeatFailure::Service(err.to_string())),
            Err(Error::Cancelled) => Err(HeartbeatFailure::Stopped),
            Err(err) => Err(HeartbeatFailure::Unavailable(err.to_string())),
        }
    }
}
