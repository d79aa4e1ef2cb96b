// SPDX-License-Identifier: AGPL-3.0-or-later

mod common;

use rapidrpc::error::CODE_REQUEST_TIMEOUT;

/// A client-side timeout shorter than the handler's delay must surface as
/// 405 ("request timeout"), distinct from server-side admission failures.
#[tokio::test]
async fn slow_handler_trips_client_timeout() {
    let (server, addr) = common::spawn_server(100, 0, common::slow_echo_dispatcher(200)).await;
    let client = common::client_for(&addr, 50);

    let err = client
        .invoke(None, None, "Echo", &serde_json::json!({"x": 1}), None)
        .await
        .expect_err("client should time out before the handler responds");

    assert_eq!(err.code, CODE_REQUEST_TIMEOUT);
    server.stop();
}

#[tokio::test]
async fn fast_handler_beats_generous_client_timeout() {
    let (server, addr) = common::spawn_server(100, 0, common::slow_echo_dispatcher(5)).await;
    let client = common::client_for(&addr, 2_000);

    let reply = client
        .invoke(None, None, "Echo", &serde_json::json!({"x": 2}), None)
        .await
        .expect("invoke succeeds well within the timeout");

    assert_eq!(reply, serde_json::json!({"x": 2}));
    server.stop();
}
