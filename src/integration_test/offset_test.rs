//! Offset-measurement and quorum-gate tests with fully controlled clocks.

use std::sync::Arc;

use actix::Actor;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

use crate::clock::{Clock, ManualClock};
use crate::conn::{ConnRegistry, FabricConfig};
use crate::constants::MAXIMUM_PING_DURATION_MULT;
use crate::heartbeat::{HeartbeatService, ManualHeartbeatService};
use crate::integration_test::test_utils::{succeeds_soon, TestServer};
use crate::monitor::{RemoteClockMonitor, RemoteOffset};
use crate::stopper::Stopper;
use crate::tls::upgrader::Upgrader;
use crate::Error;

const CLUSTER: &str = "test-cluster";

#[actix_rt::test]
async fn offset_measurement() {
    let stopper = Stopper::new();

    // Server clock pinned at t=20.
    let server_clock = ManualClock::new(20, Duration::from_nanos(50));
    let server_monitor =
        Arc::new(RemoteClockMonitor::new(server_clock.clone(), Duration::from_secs(10), 3));
    let service =
        HeartbeatService::new(server_clock.clone(), server_monitor, CLUSTER.to_owned()).start();
    let server = TestServer::spawn(service.recipient(), Arc::new(Upgrader::Tcp), false).await;

    // Client clock starts behind the server, at t=10, and stands still for now.
    let client_clock = ManualClock::new(10, Duration::from_nanos(50));
    let config = FabricConfig {
        node_addr: "127.0.0.1:7101".to_owned(),
        cluster_id: CLUSTER.to_owned(),
        heartbeat_interval: Duration::from_millis(1),
        // Staleness is measured on the frozen client clock, so a zero TTL only bites once the
        // clock starts moving.
        offset_ttl: Duration::from_nanos(0),
        ..FabricConfig::default()
    };
    let registry =
        ConnRegistry::new(config, client_clock.clone(), Arc::new(Upgrader::Tcp), stopper.clone());
    registry.dial(&server.addr).await.unwrap();

    // A standing-still client sees a zero round trip: the offset is exact.
    let expected = RemoteOffset::new(10, 0, 10);
    succeeds_soon("exact offset sample", || {
        registry.remote_clocks().offset(&server.addr) == Some(expected)
    })
    .await;

    // Now every clock read jumps past the maximum usable ping duration: round trips become too
    // noisy to bound the remote clock and the stored sample must be cleared.
    let max_offset_nanos = client_clock.max_offset().as_nanos() as u64;
    client_clock.set_advance_interval(Duration::from_nanos(
        u64::from(MAXIMUM_PING_DURATION_MULT) * max_offset_nanos + 1,
    ));
    succeeds_soon("cleared offset sample", || {
        registry.remote_clocks().offset(&server.addr).is_none()
    })
    .await;

    stopper.stop();
}

#[actix_rt::test]
async fn failed_offset_measurement() {
    let stopper = Stopper::new();

    // Can't be zero because that'd be an empty offset.
    let clock = ManualClock::new(1, Duration::from_millis(100));
    let server_monitor =
        Arc::new(RemoteClockMonitor::new(clock.clone(), Duration::from_secs(10), 3));
    let (service, ready) = ManualHeartbeatService::new(
        clock.clone(),
        server_monitor.clone(),
        CLUSTER.to_owned(),
        stopper.clone(),
    );
    let service = service.start();
    let server = TestServer::spawn(service.recipient(), Arc::new(Upgrader::Tcp), false).await;

    // A client that never receives a heartbeat after the first. The deadline is removed so that
    // failure arises from the withheld responses, not from a ping timeout.
    let config = FabricConfig {
        node_addr: "127.0.0.1:7102".to_owned(),
        cluster_id: CLUSTER.to_owned(),
        heartbeat_interval: Duration::from_millis(1),
        heartbeat_timeout: Duration::from_nanos(0),
        ..FabricConfig::default()
    };
    let registry = ConnRegistry::new(config, clock.clone(), Arc::new(Upgrader::Tcp), stopper.clone());
    registry.dial(&server.addr).await.unwrap();

    // Allow one heartbeat for initialization.
    ready.send(Ok(())).await.unwrap();

    succeeds_soon("client-side sample", || {
        registry.remote_clocks().offset(&server.addr).is_some()
    })
    .await;

    // Every later ping parks at the gate, so the server never learns about the client.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(server_monitor.sample_count(), 0);
    assert!(registry.remote_clocks().offset(&server.addr).is_some());

    stopper.stop();
}

#[actix_rt::test]
async fn quorum_gate_kills_only_the_outlier() {
    let stopper = Stopper::new();
    let max_offset = Duration::from_millis(100);
    let max_offset_nanos = max_offset.as_nanos() as i64;
    let base_nanos = 1_354_838_400_000_000_000i64;

    // Three nodes with agreeing clocks and one whose clock sits just past the tolerated bound,
    // the minimum displacement that triggers node death.
    let displacements = [0i64, 0, 0, max_offset_nanos + 1];

    let mut registries: Vec<Arc<ConnRegistry>> = vec![];
    let mut servers: Vec<TestServer> = vec![];
    for displacement in displacements {
        let clock = ManualClock::new(base_nanos + displacement, max_offset);
        // Bind before building the config: a node advertises its own listen address.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let node_addr = listener.local_addr().unwrap().to_string();
        let config = FabricConfig {
            node_addr,
            cluster_id: CLUSTER.to_owned(),
            heartbeat_interval: Duration::from_millis(5),
            ..FabricConfig::default()
        };
        let registry =
            ConnRegistry::new(config, clock.clone(), Arc::new(Upgrader::Tcp), stopper.clone());
        let service =
            HeartbeatService::new(clock, registry.remote_clocks(), CLUSTER.to_owned()).start();
        servers.push(TestServer::serve(listener, service.recipient(), Arc::new(Upgrader::Tcp), false));
        registries.push(registry);
    }

    // Fully connect the nodes.
    for (i, registry) in registries.iter().enumerate() {
        for (j, server) in servers.iter().enumerate() {
            if i == j {
                continue;
            }
            registry.dial(&server.addr).await.unwrap();
        }
    }

    // Wait until every node has a live sample for every other node.
    for registry in registries.iter() {
        let registry = registry.clone();
        succeeds_soon("full connectivity", move || {
            registry.remote_clocks().sample_count() == displacements.len() - 1
        })
        .await;
    }

    for (i, registry) in registries.iter().enumerate() {
        let verdict = registry.remote_clocks().verify_clock_offset();
        if displacements[i] > max_offset_nanos {
            assert!(
                matches!(&verdict, Err(Error::OffsetGreaterThanMaxOffset { .. })),
                "node {} should have failed the quorum check, got {:?}",
                i,
                verdict
            );
        } else {
            assert!(verdict.is_ok(), "node {} unexpectedly failed: {:?}", i, verdict);
        }
    }

    stopper.stop();
}
