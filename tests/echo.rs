// SPDX-License-Identifier: AGPL-3.0-or-later

mod common;

#[tokio::test]
async fn client_invokes_echo_server_round_trip() {
    let (server, addr) = common::spawn_server(100, 0, common::echo_dispatcher()).await;
    let client = common::client_for(&addr, 3_000);

    let payload = serde_json::json!({"hello": "world", "n": 42});
    let reply = client.invoke(None, None, "Echo", &payload, None).await.expect("invoke succeeds");

    assert_eq!(reply, payload);
    server.stop();
}

#[tokio::test]
async fn invoke_with_extra_meta_succeeds() {
    use rapidrpc::Meta;

    let (server, addr) = common::spawn_server(100, 0, common::echo_dispatcher()).await;
    let client = common::client_for(&addr, 3_000);

    let mut meta = Meta::new();
    meta.set("trace-id", "abc123");
    let reply = client
        .invoke(None, None, "Echo", &serde_json::json!({"x": 1}), Some(meta))
        .await
        .expect("invoke succeeds");

    assert_eq!(reply, serde_json::json!({"x": 1}));
    server.stop();
}
