//! Bounded-staleness guard on a lone node's R=1 read path, exercising the
//! spec's S5 scenario. R=1 takes the local fast path with no RPC
//! fan-out, so a solitary node (no reachable peers) is enough to drive
//! it; write acknowledgement is orthogonal to the staleness check, since
//! `Store::put` always lands locally before fan-out is even attempted.

mod common;

use common::{settle, spawn_node, test_client, test_config};

#[tokio::test]
async fn stale_read_is_flagged_but_still_returns_the_value() {
    let port = 19201u16;
    // N=3, R=1, W=3 satisfies R+W>N (4>3) with no configured peers: the
    // write's replication fan-out will fall short of W, but the local
    // put still lands, which is all this scenario needs.
    let (mut cfg, dir) = test_config("node-solo", port, &[], 3, 1, 3);
    cfg.max_staleness_ms = 50;

    let node = spawn_node(cfg, dir).await;
    let client = test_client().await;

    client.put(node.addr, "k".to_string(), b"v1".to_vec()).await.expect("put rpc");

    // R==1 reads never perform RPCs; staleness is judged at read time
    // against the reader's own wall clock, not the writer's.
    settle(200).await;

    let get_resp = client.get(node.addr, "k".to_string()).await.expect("get rpc");
    assert!(get_resp.found, "stale values are still returned, only flagged");
    assert_eq!(get_resp.value, Some(b"v1".to_vec()));
    assert!(get_resp.is_stale, "value older than max_staleness_ms should be flagged stale");
    assert!(get_resp.error.is_some());

    node.stop();
}

#[tokio::test]
async fn fresh_read_is_not_flagged_stale() {
    let port = 19202u16;
    let (mut cfg, dir) = test_config("node-solo-fresh", port, &[], 3, 1, 3);
    cfg.max_staleness_ms = 3000;

    let node = spawn_node(cfg, dir).await;
    let client = test_client().await;

    client.put(node.addr, "k".to_string(), b"v1".to_vec()).await.expect("put rpc");

    let get_resp = client.get(node.addr, "k".to_string()).await.expect("get rpc");
    assert!(get_resp.found);
    assert!(!get_resp.is_stale);
    assert!(get_resp.error.is_none());

    node.stop();
}
