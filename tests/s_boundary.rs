//! Boundary behaviours from the spec's testable-properties section: an
//! isolated node (no configured peers) with W=1 acks on self alone, and
//! the same node with W>1 fails with insufficient acks.

mod common;

use common::{spawn_node, test_client, test_config};

#[tokio::test]
async fn zero_peers_and_w_one_put_succeeds_on_self() {
    let port = 19301u16;
    // N=3, R=3, W=1: satisfies R+W>N (4>3) with no configured peers.
    let (cfg, dir) = test_config("node-lone-w1", port, &[], 3, 3, 1);
    let node = spawn_node(cfg, dir).await;
    let client = test_client().await;

    let put_resp = client.put(node.addr, "k".to_string(), b"v1".to_vec()).await.expect("put rpc");
    assert!(put_resp.success, "self ack alone should satisfy W=1");

    node.stop();
}

#[tokio::test]
async fn zero_peers_and_w_greater_than_one_put_fails() {
    let port = 19302u16;
    // N=3, R=1, W=3: satisfies R+W>N (4>3) with no configured peers.
    let (cfg, dir) = test_config("node-lone-w3", port, &[], 3, 1, 3);
    let node = spawn_node(cfg, dir).await;
    let client = test_client().await;

    let put_resp = client.put(node.addr, "k".to_string(), b"v1".to_vec()).await.expect("put rpc");
    assert!(!put_resp.success, "a single ack cannot satisfy W=3 with no reachable peers");
    assert!(put_resp.error.is_some());

    node.stop();
}
