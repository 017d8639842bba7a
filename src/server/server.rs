use super::router::{Router, RouterRequest};
use crate::channel::Channel;
use crate::protocol::{Request, Response};
use crate::tls::upgrader::Upgrader;
use crate::{Error, Result};

use tracing::{debug, info};

use std::net::SocketAddr;
use std::sync::Arc;

use actix::Addr;
use actix_rt::net::TcpStream;
use actix_service::fn_service;

/// Accepts peer connections and feeds their requests to the router.
pub struct Server {
    /// The ip address which this server binds to.
    ip: SocketAddr,
    router: Addr<Router>,
    upgrader: Arc<Upgrader>,
    compression: bool,
}

impl Server {
    pub fn new(
        ip: SocketAddr,
        router: Addr<Router>,
        upgrader: Arc<Upgrader>,
        compression: bool,
    ) -> Server {
        Server { ip, router, upgrader, compression }
    }

    // Starts an actix server that listens for incoming connections.
    // Default thread count is the number of logical cpus
    pub async fn listen(&self) -> Result<()> {
        let ip = self.ip;
        let router = self.router.clone();
        let upgrader = self.upgrader.clone();
        let compression = self.compression;
        info!("listening on {:?}", ip);

        actix_server::Server::build()
            .bind("listener", ip, move || {
                let router = router.clone();
                let upgrader = upgrader.clone();

                // one service task per incoming connection
                fn_service(move |stream: TcpStream| {
                    let router = router.clone();
                    let upgrader = upgrader.clone();
                    async move {
                        Server::process_stream(stream, router, upgrader, compression).await
                    }
                })
            })?
            .run()
            .await
            .map_err(Error::IO)
    }

    // Serves one peer connection until the peer goes away. Connections are long-lived by
    // contract: the dialling side keeps a single connection per address and multiplexes all its
    // traffic over it.
    async fn process_stream(
        stream: TcpStream,
        router: Addr<Router>,
        upgrader: Arc<Upgrader>,
        compression: bool,
    ) -> Result<()> {
        let connection = upgrader.upgrade(stream).await?;
        // The ID derived from a TCP connection is next to useless, however for TLS it safely
        // identifies the peer
        let check_peer = upgrader.is_tls();
        let peer_id = connection.peer_id()?;
        let channel: Channel<Response, Request> = Channel::wrap(connection, compression);
        let (mut sender, mut receiver) = channel.split();

        loop {
            let request = match receiver.recv().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!(peer = %peer_id, "peer closed the connection");
                    return Ok(());
                }
                Err(err) => {
                    debug!(peer = %peer_id, "read failed: {:?}", err);
                    return Ok(());
                }
            };
            let response =
                router.send(RouterRequest { peer_id, check_peer, request }).await?;
            sender
                .send(response)
                .await
                .map_err(|err| Error::ChannelError(format!("{:?}", err)))?;
        }
    }
}
