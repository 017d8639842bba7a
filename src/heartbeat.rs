//! The server side of the heartbeat protocol.
//!
//! [HeartbeatService] answers pings with the local timestamp; it also feeds the *server-side*
//! remote-clock monitor from the offset the caller reports, so every node passively learns about
//! every peer that pings it, not only about the peers it dials.

use std::sync::Arc;

use actix::{Actor, Context, Handler, ResponseFuture};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::monitor::{RemoteClockMonitor, RemoteOffset};
use crate::protocol::{PingRequest, PingResponse, ServiceError, ServiceResult};
use crate::stopper::Stopper;

pub struct HeartbeatService {
    clock: Arc<dyn Clock>,
    remote_clocks: Arc<RemoteClockMonitor>,
    cluster_id: String,
}

impl HeartbeatService {
    pub fn new(
        clock: Arc<dyn Clock>,
        remote_clocks: Arc<RemoteClockMonitor>,
        cluster_id: String,
    ) -> HeartbeatService {
        HeartbeatService { clock, remote_clocks, cluster_id }
    }
}

impl Actor for HeartbeatService {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("started heartbeat service");
    }
}

impl Handler<PingRequest> for HeartbeatService {
    type Result = ServiceResult;

    fn handle(&mut self, msg: PingRequest, _ctx: &mut Context<Self>) -> Self::Result {
        handle_ping(&*self.clock, &self.remote_clocks, &self.cluster_id, msg)
    }
}

pub(crate) fn handle_ping(
    clock: &dyn Clock,
    remote_clocks: &RemoteClockMonitor,
    cluster_id: &str,
    request: PingRequest,
) -> ServiceResult {
    if request.cluster_id != cluster_id {
        warn!(peer = %request.node_addr, got = %request.cluster_id, "ping from a foreign cluster");
        return Err(ServiceError::ClusterIdMismatch {
            expected: cluster_id.to_owned(),
            got: request.cluster_id,
        });
    }
    if request.offset_nanos != 0 {
        // The caller reports how far it measured our clock to be from its own; reversed, that is
        // the caller's offset from this node.
        let offset = RemoteOffset::new(-request.offset_nanos, 0, clock.now_nanos());
        remote_clocks.update_offset(&request.node_addr, offset);
    }
    // Read the clock as late as possible: everything the server does after this read inflates
    // the caller's round trip without moving the timestamp.
    let server_time = clock.now_nanos();
    Ok(PingResponse { pong: request.ping, server_time })
}

/// A [HeartbeatService] whose replies are released one at a time through an external channel.
///
/// Each incoming ping waits for one value on the `ready` channel: `Ok(())` lets it through,
/// `Err(cause)` fails it. A ping that never gets a value stays parked until the stopper
/// quiesces. This is the seam tests use to simulate lost pings, slow networks and server pauses.
pub struct ManualHeartbeatService {
    clock: Arc<dyn Clock>,
    remote_clocks: Arc<RemoteClockMonitor>,
    cluster_id: String,
    ready: Arc<AsyncMutex<mpsc::Receiver<std::result::Result<(), String>>>>,
    stopper: Stopper,
}

impl ManualHeartbeatService {
    pub fn new(
        clock: Arc<dyn Clock>,
        remote_clocks: Arc<RemoteClockMonitor>,
        cluster_id: String,
        stopper: Stopper,
    ) -> (ManualHeartbeatService, mpsc::Sender<std::result::Result<(), String>>) {
        // Rendezvous-like: a feeder awaits the service consuming each value.
        let (tx, rx) = mpsc::channel(1);
        let service = ManualHeartbeatService {
            clock,
            remote_clocks,
            cluster_id,
            ready: Arc::new(AsyncMutex::new(rx)),
            stopper,
        };
        (service, tx)
    }
}

impl Actor for ManualHeartbeatService {
    type Context = Context<Self>;
}

impl Handler<PingRequest> for ManualHeartbeatService {
    type Result = ResponseFuture<ServiceResult>;

    fn handle(&mut self, msg: PingRequest, _ctx: &mut Context<Self>) -> Self::Result {
        let clock = self.clock.clone();
        let remote_clocks = self.remote_clocks.clone();
        let cluster_id = self.cluster_id.clone();
        let ready = self.ready.clone();
        let stopper = self.stopper.clone();
        Box::pin(async move {
            let released = tokio::select! {
                _ = stopper.on_quiesce() => {
                    return Err(ServiceError::Unavailable("node is draining".to_owned()));
                }
                released = async { ready.lock().await.recv().await } => released,
            };
            match released {
                Some(Ok(())) => handle_ping(&*clock, &remote_clocks, &cluster_id, msg),
                Some(Err(cause)) => Err(ServiceError::ManualFailure(cause)),
                None => Err(ServiceError::Unavailable("heartbeat gate closed".to_owned())),
            }
        })
    }
}
