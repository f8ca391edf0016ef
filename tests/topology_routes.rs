mod common;

use chrono::Utc;
use meshgate::db::{MessageRecord, NodeUpsert};
use meshgate::directory::NodeDirectory;
use meshgate::topology::TopologyReconstructor;

fn message(from: &str, to: &str, hops: i64, snr: Option<f64>) -> MessageRecord {
    MessageRecord {
        from_node_id: Some(from.to_string()),
        to_node_id: Some(to.to_string()),
        message_text: Some("observed".to_string()),
        port_num: "TEXT_MESSAGE_APP".to_string(),
        payload: None,
        hops_away: hops,
        snr,
        rssi: Some(-90.0),
    }
}

#[tokio::test]
async fn topology_orders_pairs_by_message_count() {
    let (_dir, db) = common::open_db().await;

    let mut router = NodeUpsert::named("!0000cccc", "Ridge Router");
    router.is_router = true;
    router.last_heard = Some(Utc::now());
    db.upsert_node(&router).await;
    let mut alpha = NodeUpsert::named("!0000aaaa", "Alpha");
    alpha.last_heard = Some(Utc::now());
    db.upsert_node(&alpha).await;
    db.upsert_node(&NodeUpsert::named("!0000bbbb", "Beta")).await;

    for _ in 0..3 {
        db.add_message(&message("!0000aaaa", "!0000bbbb", 1, Some(6.0))).await;
    }
    db.add_message(&message("!0000cccc", "!0000bbbb", 2, Some(4.0))).await;

    let reconstructor = TopologyReconstructor::new(db.clone(), NodeDirectory::new(db.clone()));
    let topology = reconstructor.network_topology().await;
    assert_eq!(topology.connections.len(), 2);
    assert_eq!(topology.connections[0].from_node.as_deref(), Some("!0000aaaa"));
    assert_eq!(topology.connections[0].message_count, 3);
    assert_eq!(topology.connections[0].avg_hops, Some(1.0));
    assert_eq!(topology.connections[0].avg_snr, Some(6.0));
    assert!(topology.connections[0].last_communication.is_some());

    assert_eq!(topology.total_nodes, 3);
    assert_eq!(topology.active_nodes, 2);
    assert_eq!(topology.router_nodes, 1);
    assert!(topology.avg_hops.is_some());
}

#[tokio::test]
async fn topology_over_empty_store_is_zeroed() {
    let (_dir, db) = common::open_db().await;

    let topology = db.get_network_topology().await;
    assert!(topology.connections.is_empty());
    assert_eq!(topology.total_nodes, 0);
    assert_eq!(topology.router_nodes, 0);
}

#[tokio::test]
async fn route_estimate_threads_hop_counts_to_target() {
    let (_dir, db) = common::open_db().await;
    let directory = NodeDirectory::new(db.clone());
    let topology = TopologyReconstructor::new(db.clone(), directory);

    db.upsert_node(&NodeUpsert::named("!00000001", "Near Relay")).await;
    db.upsert_node(&NodeUpsert::named("!00000002", "Far Relay")).await;
    db.upsert_node(&NodeUpsert::named("!0000bbbb", "Target")).await;

    db.add_message(&message("!00000001", "!0000bbbb", 1, Some(9.0))).await;
    db.add_message(&message("!00000002", "!0000bbbb", 2, Some(5.0))).await;
    // A second hops=1 witness; the most recent one wins.
    db.add_message(&message("!00000001", "!0000bbbb", 1, Some(11.0))).await;

    let estimate = topology.route_to_node("!0000bbbb").await;
    assert_eq!(estimate.hops.len(), 3);

    assert_eq!(estimate.hops[0].node_id, "!00000001");
    assert_eq!(estimate.hops[0].hops_away, 1);
    assert_eq!(estimate.hops[0].snr, Some(11.0), "latest witness per hop count");

    assert_eq!(estimate.hops[1].node_id, "!00000002");
    assert_eq!(estimate.hops[1].hops_away, 2);

    let target = estimate.hops.last().unwrap();
    assert_eq!(target.node_id, "!0000bbbb");
    assert_eq!(target.node_name, "Target");
    assert_eq!(target.hops_away, 0);
    assert!(target.snr.is_none());
}

#[tokio::test]
async fn route_estimate_without_history_is_empty() {
    let (_dir, db) = common::open_db().await;
    let directory = NodeDirectory::new(db.clone());
    let topology = TopologyReconstructor::new(db, directory);

    let estimate = topology.route_to_node("!deadbeef").await;
    assert!(estimate.hops.is_empty());
    assert_eq!(estimate.quality, "unknown");
}
