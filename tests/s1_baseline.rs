//! Baseline write/read against a healthy three-node cluster (N=3, R=2, W=2).

mod common;

use common::{settle, spawn_node, test_client, test_config};

#[tokio::test]
async fn put_then_get_roundtrips_through_quorum() {
    let ports = [19101u16, 19102, 19103];

    let (cfg_a, dir_a) = test_config("node-a", ports[0], &ports[1..], 3, 2, 2);
    let (cfg_b, dir_b) = test_config("node-b", ports[1], &[ports[0], ports[2]], 3, 2, 2);
    let (cfg_c, dir_c) = test_config("node-c", ports[2], &[ports[0], ports[1]], 3, 2, 2);

    let a = spawn_node(cfg_a, dir_a).await;
    let b = spawn_node(cfg_b, dir_b).await;
    let c = spawn_node(cfg_c, dir_c).await;
    settle(300).await;

    let client = test_client().await;

    let put_resp = client.put(a.addr, "k".to_string(), b"v1".to_vec()).await.expect("put rpc");
    assert!(put_resp.success, "put should reach the required 2 acks");
    assert_eq!(put_resp.hlc.logical, 0);
    assert!(put_resp.version > 0);

    let get_resp = client.get(a.addr, "k".to_string()).await.expect("get rpc");
    assert!(get_resp.found);
    assert_eq!(get_resp.value, Some(b"v1".to_vec()));

    a.stop();
    b.stop();
    c.stop();
}
