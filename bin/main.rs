use tracing::info;
use tracing::trace;
use tracing_subscriber;

use clap::{value_t, values_t, App, Arg};

use zfx_permafrost::server::node;
use zfx_permafrost::server::settings::Settings;
use zfx_permafrost::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_target(true)
        .compact()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = App::new("zfx-permafrost")
        .version("0.1")
        .author("zero.fx labs ltd.")
        .about("Runs a permafrost node")
        .arg(
            Arg::with_name("listener-ip")
                .short("a")
                .long("listener-ip")
                .value_name("LISTENER_IP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bootstrap-peer")
                .short("b")
                .long("bootstrap-peer")
                .value_name("BOOTSTRAP_PEER")
                .multiple(true),
        )
        .arg(
            Arg::with_name("cluster-id")
                .short("i")
                .long("cluster-id")
                .value_name("CLUSTER_ID")
                .takes_value(true),
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
        .arg(
            Arg::with_name("compress")
                .short("z")
                .long("compress")
                .required(false)
                .takes_value(false),
        )
        .get_matches();

    let mut settings = Settings::new().expect("failed to load configuration.");

    if let Some(ip) = matches.value_of("listener-ip") {
        trace!("CLI arg for listener-ip provided: {}", ip);
        settings.listener_ip = ip.to_owned();
    }

    if let Some(peers) = matches.values_of("bootstrap-peer") {
        trace!("CLI arg for bootstrap-peer provided: {:?}", peers);
        settings.bootstrap_peers =
            values_t!(matches.values_of("bootstrap-peer"), String).unwrap_or_else(|e| e.exit());
    }

    if let Some(cluster_id) = matches.value_of("cluster-id") {
        trace!("CLI arg for cluster-id provided: {}", cluster_id);
        settings.cluster_id = cluster_id.to_owned();
    }

    if matches.is_present("use-tls") {
        trace!("CLI arg for use-tls provided");
        settings.use_tls = true;

        settings.certificate_file =
            Some(value_t!(matches.value_of("cert-path"), String).unwrap_or_else(|e| e.exit()));
        settings.private_key_file =
            Some(value_t!(matches.value_of("pk-path"), String).unwrap_or_else(|e| e.exit()));
    };

    if matches.is_present("compress") {
        settings.rpc_compression = true;
    }

    let sys = actix::System::new();
    sys.block_on(async move {
        let handle = node::run(settings).unwrap();

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt()).unwrap();
            let mut sigterm = signal(SignalKind::terminate()).unwrap();

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await.unwrap();
            "Ctrl+C"
        };
        info!(target: "permafrost", "Got {}, stopping...", sig);

        handle.stopper.stop();
        actix::System::current().stop();
    });
    sys.run().unwrap();

    Ok(())
}
