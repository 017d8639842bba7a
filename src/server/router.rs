use crate::id::Id;
use crate::protocol::{PingRequest, Request, Response, ServiceError};

use tracing::debug;

use actix::{Actor, Context, Handler, Recipient, ResponseFuture};
use actix_derive::Message;

/// Dispatches incoming requests to the registered service recipients.
///
/// Services register as recipients, so the router neither knows nor cares which implementation
/// answers a request; in particular either heartbeat service (the real one or the manual test
/// seam) plugs in here.
pub struct Router {
    heartbeat: Recipient<PingRequest>,
}

impl Router {
    pub fn new(heartbeat: Recipient<PingRequest>) -> Self {
        Router { heartbeat }
    }
}

impl Actor for Router {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("router> started");
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "Response")]
pub struct RouterRequest {
    /// Who sent the request, as proven by the TLS handshake.
    pub peer_id: Id,
    /// Whether `peer_id` is actually trustworthy (false on plain TCP).
    pub check_peer: bool,
    pub request: Request,
}

impl Handler<RouterRequest> for Router {
    type Result = ResponseFuture<Response>;

    fn handle(&mut self, msg: RouterRequest, _ctx: &mut Context<Self>) -> Self::Result {
        match msg.request {
            Request::Ping(ping) => {
                debug!(peer = %msg.peer_id, trusted = msg.check_peer, "routing Ping -> Heartbeat");
                let heartbeat = self.heartbeat.clone();
                Box::pin(async move {
                    match heartbeat.send(ping).await {
                        Ok(Ok(response)) => Response::Pong(response),
                        Ok(Err(err)) => Response::Error(err),
                        Err(err) => {
                            Response::Error(ServiceError::Unavailable(err.to_string()))
                        }
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::heartbeat::HeartbeatService;
    use crate::monitor::RemoteClockMonitor;
    use crate::protocol::{PingRequest, PingResponse};
    use actix::Actor;
    use std::sync::Arc;
    use std::time::Duration;

    #[actix_rt::test]
    async fn routes_pings_to_the_heartbeat_recipient() {
        let clock = ManualClock::new(7, Duration::from_millis(100));
        let monitor =
            Arc::new(RemoteClockMonitor::new(clock.clone(), Duration::from_secs(10), 3));
        let service = HeartbeatService::new(clock, monitor, "local".to_owned()).start();
        let router = Router::new(service.recipient()).start();

        let request = RouterRequest {
            peer_id: Id::new(b"peer"),
            check_peer: false,
            request: Request::Ping(PingRequest {
                ping: "PING".to_owned(),
                offset_nanos: 0,
                cluster_id: "local".to_owned(),
                node_addr: "127.0.0.1:1".to_owned(),
            }),
        };
        match router.send(request).await.unwrap() {
            Response::Pong(PingResponse { pong, server_time }) => {
                assert_eq!(pong, "PING");
                assert_eq!(server_time, 7);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn foreign_cluster_pings_come_back_as_errors() {
        let clock = ManualClock::new(7, Duration::from_millis(100));
        let monitor =
            Arc::new(RemoteClockMonitor::new(clock.clone(), Duration::from_secs(10), 3));
        let service = HeartbeatService::new(clock, monitor, "local".to_owned()).start();
        let router = Router::new(service.recipient()).start();

        let request = RouterRequest {
            peer_id: Id::new(b"peer"),
            check_peer: false,
            request: Request::Ping(PingRequest {
                ping: "PING".to_owned(),
                offset_nanos: 0,
                cluster_id: "foreign".to_owned(),
                node_addr: "127.0.0.1:1".to_owned(),
            }),
        };
        match router.send(request).await.unwrap() {
            Response::Error(ServiceError::ClusterIdMismatch { expected, got }) => {
                assert_eq!(expected, "local");
                assert_eq!(got, "foreign");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
