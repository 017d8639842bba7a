//! Shared pieces of the fabric testsuite: an interceptable heartbeat server and polling helpers.

use std::sync::Arc;

use actix::Recipient;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

use crate::channel::Channel;
use crate::protocol::{PingRequest, Request, Response};
use crate::tls::upgrader::Upgrader;

/// A heartbeat server whose sockets and listener the test can kill at will, mimicking transport
/// failure underneath a live registry.
pub struct TestServer {
    pub addr: String,
    kill_conns: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    /// Bind an ephemeral port and serve heartbeats on it.
    pub async fn spawn(
        heartbeat: Recipient<PingRequest>,
        upgrader: Arc<Upgrader>,
        compression: bool,
    ) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        TestServer::serve(listener, heartbeat, upgrader, compression)
    }

    /// Serve heartbeats on an already-bound listener (for tests that need to know the address
    /// before the service exists).
    pub fn serve(
        listener: TcpListener,
        heartbeat: Recipient<PingRequest>,
        upgrader: Arc<Upgrader>,
        compression: bool,
    ) -> TestServer {
        let addr = listener.local_addr().unwrap().to_string();
        let (kill_conns, _) = broadcast::channel(4);
        let kill = kill_conns.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let upgrader = upgrader.clone();
                let heartbeat = heartbeat.clone();
                let kill_rx = kill.subscribe();
                tokio::spawn(async move {
                    if let Ok(stream) = upgrader.upgrade(socket).await {
                        serve_conn(stream, heartbeat, compression, kill_rx).await;
                    }
                });
            }
        });
        TestServer { addr, kill_conns, accept_task }
    }

    /// Abruptly drop every connection currently served; the listener keeps accepting, so the
    /// dialling side can silently reconnect.
    pub fn close_conns(&self) {
        let _ = self.kill_conns.send(());
    }

    /// Stop accepting new connections. Combined with [TestServer::close_conns] this takes the
    /// server off the network for good.
    pub fn close_listener(&self) {
        self.accept_task.abort();
    }
}

async fn serve_conn(
    stream: crate::tls::connection_stream::ConnectionStream,
    heartbeat: Recipient<PingRequest>,
    compression: bool,
    mut kill: broadcast::Receiver<()>,
) {
    let channel: Channel<Response, Request> = Channel::wrap(stream, compression);
    let (mut sender, mut receiver) = channel.split();
    loop {
        let request = tokio::select! {
            _ = kill.recv() => return,
            request = receiver.recv() => match request {
                Ok(Some(request)) => request,
                _ => return,
            },
        };
        let Request::Ping(ping) = request;
        // Stay killable while the service holds the ping (the manual service parks them).
        let response = tokio::select! {
            _ = kill.recv() => return,
            outcome = heartbeat.send(ping) => match outcome {
                Ok(Ok(response)) => Response::Pong(response),
                Ok(Err(err)) => Response::Error(err),
                Err(_) => return,
            },
        };
        if sender.send(response).await.is_err() {
            return;
        }
    }
}

/// Poll `check` until it holds, panicking after five seconds.
pub async fn succeeds_soon<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if check() {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(5)).await;
    }
}
