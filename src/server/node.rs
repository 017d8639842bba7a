//! Node bootstrap: wires the listener, the heartbeat service and the connection registry
//! together from a [Settings] value.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

use actix::{Actor, Arbiter};
use tracing::{error, info, warn};

use crate::clock::SystemClock;
use crate::conn::ConnRegistry;
use crate::heartbeat::HeartbeatService;
use crate::server::settings::Settings;
use crate::server::{Router, Server};
use crate::stopper::Stopper;
use crate::tls;
use crate::{Error, Result};

/// Everything a running node hands back to its caller.
pub struct NodeHandle {
    pub registry: Arc<ConnRegistry>,
    pub stopper: Stopper,
}

/// Start a node: listen for peers, dial the bootstrap set and keep verifying the clock quorum.
///
/// A fatal quorum verdict stops the node; continuing to serve with a clock the majority of peers
/// disagrees with would break the ordering guarantees built on top of `max_offset`.
pub fn run(settings: Settings) -> Result<NodeHandle> {
    let listener_ip: SocketAddr = settings
        .listener_ip
        .to_socket_addrs()
        .map_err(|_| Error::PeerParseError)?
        .next()
        .ok_or(Error::PeerParseError)?;

    let upgraders = if settings.use_tls {
        let cert_path =
            settings.certificate_file.clone().expect("certificate_file is required with TLS");
        let key_path =
            settings.private_key_file.clone().expect("private_key_file is required with TLS");
        let identity = tls::certificate::NodeCertificate::load_or_generate(
            Path::new(&cert_path),
            Path::new(&key_path),
        )?;
        tls::upgrader::Upgraders::from_certificate(&identity, settings.rpc_compression)
    } else {
        warn!("TLS is disabled; peer identities are unauthenticated");
        tls::upgrader::Upgraders::insecure()
    };

    let stopper = Stopper::new();
    let clock = SystemClock::new(settings.max_offset());
    let config = settings.fabric_config();
    let registry =
        ConnRegistry::new(config.clone(), clock.clone(), upgraders.client.clone(), stopper.clone());

    info!(listener = %listener_ip, cluster = %config.cluster_id, "node is starting");

    let heartbeat =
        HeartbeatService::new(clock, registry.remote_clocks(), config.cluster_id.clone()).start();
    let router = Router::new(heartbeat.recipient()).start();
    let server = Server::new(listener_ip, router, upgraders.server, settings.rpc_compression);

    let arbiter = Arbiter::new();

    let listener_execution = async move {
        if let Err(err) = server.listen().await {
            error!("listener failed: {}", err);
        }
    };

    for peer in settings.bootstrap_peers.clone() {
        let registry = registry.clone();
        arbiter.spawn(async move {
            match registry.dial(&peer).await {
                Ok(_) => info!(peer = %peer, "bootstrap peer dialled"),
                Err(err) => warn!(peer = %peer, "bootstrap dial failed: {}", err),
            }
        });
    }

    let quorum_execution = {
        let registry = registry.clone();
        let stopper = stopper.clone();
        let interval = config.heartbeat_interval;
        async move {
            loop {
                tokio::select! {
                    _ = stopper.on_quiesce() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = registry.remote_clocks().verify_clock_offset() {
                    error!("{}; stopping the node", err);
                    stopper.stop();
                    actix::System::current().stop();
                    return;
                }
            }
        }
    };

    arbiter.spawn(listener_execution);
    arbiter.spawn(quorum_execution);

    Ok(NodeHandle { registry, stopper })
}
