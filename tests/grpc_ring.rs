use bytes::Bytes;
use chordring::chord::node::ReceiveCallback;
use chordring::chord::peer::RingPeer;
use chordring::config::{BootstrapPeer, MaintenanceConfig, NodeConfig};
use chordring::error::ChordError;
use chordring::network::node::ChordPeer;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn config(name: &str) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        ring_bits: 16,
        rpc_timeout_ms: 1000,
        maintenance: MaintenanceConfig {
            stabilize_interval_ms: 50,
            fix_fingers_interval_ms: 20,
            ping_interval_ms: 100,
            ..MaintenanceConfig::default()
        },
        ..NodeConfig::default()
    }
}

fn bootstrap_of(peer: &ChordPeer) -> BootstrapPeer {
    let me = peer.descriptor();
    BootstrapPeer {
        name: me.name().to_string(),
        host: me.host().to_string(),
        port: me.port(),
    }
}

fn collector() -> (ReceiveCallback, Arc<Mutex<Vec<Bytes>>>) {
    let inbox = Arc::new(Mutex::new(Vec::new()));
    let sink = inbox.clone();
    let callback: ReceiveCallback =
        Arc::new(move |message: Bytes| sink.lock().unwrap().push(message));
    (callback, inbox)
}

#[tokio::test]
async fn two_nodes_form_a_ring_over_grpc() {
    let a = ChordPeer::start(config("grpc-a"), None).await.unwrap();
    let (callback, inbox) = collector();
    let b = ChordPeer::start(config("grpc-b"), Some(callback)).await.unwrap();
    assert_ne!(a.descriptor().port(), 0);

    b.join(&bootstrap_of(&a)).await.unwrap();
    assert_eq!(b.node().successor().await, *a.descriptor());

    for _ in 0..3 {
        b.node().stabilize().await.unwrap();
        a.node().stabilize().await.unwrap();
    }
    assert_eq!(a.node().successor().await, *b.descriptor());
    assert_eq!(a.node().predecessor().await.as_ref(), Some(b.descriptor()));
    assert_eq!(b.node().predecessor().await.as_ref(), Some(a.descriptor()));

    // A key equal to b's name hashes to b's identifier, so b owns it.
    let owner = a.send("grpc-b", Bytes::from_static(b"over the wire")).await.unwrap();
    assert_eq!(owner, *b.descriptor());
    assert_eq!(inbox.lock().unwrap().as_slice(), &[Bytes::from_static(b"over the wire")]);

    assert!(a.node().peer(b.descriptor()).ping().await);
    assert_eq!(a.node().peer(b.descriptor()).get_id().await.unwrap(), b.descriptor().id());

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn join_rejects_a_bootstrap_with_the_wrong_identity() {
    let a = ChordPeer::start(config("grpc-real"), None).await.unwrap();
    let b = ChordPeer::start(config("grpc-newcomer"), None).await.unwrap();

    let mut bootstrap = bootstrap_of(&a);
    bootstrap.name = "grpc-imposter".to_string();
    let err = b.join(&bootstrap).await.unwrap_err();
    assert!(matches!(err, ChordError::JoinFailed(_)));
    assert_eq!(b.node().successor().await, *b.descriptor());

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}

#[tokio::test]
async fn maintenance_converges_and_survives_a_departure() {
    let mut a = ChordPeer::start(config("grpc-m1"), None).await.unwrap();
    let mut b = ChordPeer::start(config("grpc-m2"), None).await.unwrap();
    let mut c = ChordPeer::start(config("grpc-m3"), None).await.unwrap();
    b.join(&bootstrap_of(&a)).await.unwrap();
    c.join(&bootstrap_of(&a)).await.unwrap();
    a.start_maintenance();
    b.start_maintenance();
    c.start_maintenance();

    let nodes = [a.node().clone(), b.node().clone(), c.node().clone()];
    let ring_closed = |nodes: [std::sync::Arc<chordring::chord::node::RingNode>; 3]| async move {
        loop {
            let mut ok = true;
            for node in &nodes {
                let successor = node.successor().await;
                if successor == *node.descriptor() {
                    ok = false;
                    break;
                }
                match node.peer(&successor).get_predecessor().await {
                    Ok(Some(p)) if p == *node.descriptor() => {}
                    _ => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), ring_closed(nodes.clone()))
        .await
        .unwrap();

    // Stopping c leaves a and b pointing at each other once eviction kicks in.
    let c_desc = c.descriptor().clone();
    c.shutdown().await.unwrap();
    let healed = async {
        loop {
            let a_succ = nodes[0].successor().await;
            let b_succ = nodes[1].successor().await;
            if a_succ != c_desc && b_succ != c_desc && a_succ != b_succ {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), healed).await.unwrap();

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}
