//! Probe a peer: dial it, wait until the heartbeat loop reports it healthy, print the measured
//! clock offset.

use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;
use tracing_subscriber;

use clap::{value_t, App, Arg};

use zfx_permafrost::clock::SystemClock;
use zfx_permafrost::conn::{ConnRegistry, FabricConfig};
use zfx_permafrost::stopper::Stopper;
use zfx_permafrost::tls;
use zfx_permafrost::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt().compact().with_max_level(tracing::Level::INFO).init();

    let matches = App::new("permafrost-ping")
        .version("0.1")
        .author("zero.fx labs ltd.")
        .about("Dials a peer and reports its health and clock offset")
        .arg(
            Arg::with_name("peer")
                .short("b")
                .long("peer")
                .value_name("PEER_IP")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("cluster-id")
                .short("i")
                .long("cluster-id")
                .value_name("CLUSTER_ID")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("use-tls").short("t").long("use-tls").required(false).takes_value(false),
        )
        .arg(
            Arg::with_name("cert-path")
                .short("c")
                .long("cert-path")
                .value_name("CERT_PATH")
                .requires("use-tls")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("pk-path")
                .short("p")
                .long("priv-key-path")
                .value_name("PK_PATH")
                .requires("use-tls")
                .takes_value(true),
        )
        .get_matches();

    let peer = value_t!(matches.value_of("peer"), String).unwrap_or_else(|e| e.exit());
    let cluster_id = value_t!(matches.value_of("cluster-id"), String).unwrap_or_else(|e| e.exit());

    let upgraders = if matches.is_present("use-tls") {
        let cert_path =
            value_t!(matches.value_of("cert-path"), String).unwrap_or_else(|e| e.exit());
        let pk_path = value_t!(matches.value_of("pk-path"), String).unwrap_or_else(|e| e.exit());
        let identity = tls::certificate::NodeCertificate::load_or_generate(
            Path::new(&cert_path),
            Path::new(&pk_path),
        )?;
        tls::upgrader::Upgraders::from_certificate(&identity, false)
    } else {
        tls::upgrader::Upgraders::insecure()
    };

    let sys = actix::System::new();
    sys.block_on(async move {
        let stopper = Stopper::new();
        let clock = SystemClock::new(Duration::from_millis(250));
        let config = FabricConfig {
            cluster_id,
            heartbeat_interval: Duration::from_millis(250),
            ..FabricConfig::default()
        };
        let registry = ConnRegistry::new(config, clock, upgraders.client, stopper.clone());

        registry.dial(&peer).await?;
        for _ in 0..40 {
            let health = registry.conn_health(&peer);
            if health.is_healthy() {
                let offset = registry.remote_clocks().offset(&peer);
                info!("{} is healthy, offset: {:?}", peer, offset);
                stopper.stop();
                return Ok(());
            }
            sleep(Duration::from_millis(250)).await;
        }
        let health = registry.conn_health(&peer);
        stopper.stop();
        match health.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })?;

    Ok(())
}
