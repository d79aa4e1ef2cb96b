// SPDX-License-Identifier: AGPL-3.0-or-later

mod common;

use std::sync::Arc;

use rapidrpc::{encoder::EncoderRegistry, protocol, server::{ServerOptions, TcpServer}};

/// When a server goes away and comes back on the same address, the pool's
/// "reconnect-on-send" path must transparently redial rather than leaving
/// the client permanently broken.
#[tokio::test]
async fn client_reconnects_after_server_restart() {
    let (server, addr) = common::spawn_server(100, 0, common::echo_dispatcher()).await;
    let client = common::client_for(&addr, 3_000);

    let first = client
        .invoke(None, None, "Echo", &serde_json::json!({"round": 1}), None)
        .await
        .expect("first round succeeds against the original server");
    assert_eq!(first, serde_json::json!({"round": 1}));

    server.stop();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let restarted = TcpServer::new(
        ServerOptions {
            addr: addr.clone(),
            max_invoke: 100,
            invoke_timeout: None,
            read_buffer_size: 8192,
        },
        protocol::default_protocol(),
        Arc::new(EncoderRegistry::with_defaults()),
        common::echo_dispatcher(),
        Arc::new(()),
    );
    let listener = restarted.bind().await.expect("rebind the same address");
    let running = Arc::clone(&restarted);
    tokio::spawn(async move {
        let _ = running.serve_on(listener).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = client
        .invoke(None, None, "Echo", &serde_json::json!({"round": 2}), None)
        .await
        .expect("second round transparently reconnects to the restarted server");
    assert_eq!(second, serde_json::json!({"round": 2}));

    restarted.stop();
}
