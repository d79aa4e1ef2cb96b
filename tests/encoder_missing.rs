// SPDX-License-Identifier: AGPL-3.0-or-later

mod common;

use std::sync::Arc;

use rapidrpc::{encoder::EncoderRegistry, error::CODE_ENCODER_NOT_FOUND, protocol, server::{ServerOptions, TcpServer}};

/// A request naming an `encode-type` the server has no encoder registered
/// for must come back as 404 ("encoder not found"), not a generic failure.
#[tokio::test]
async fn unknown_encode_type_returns_encoder_not_found() {
    let server = TcpServer::new(
        ServerOptions {
            addr: "127.0.0.1:0".to_string(),
            max_invoke: 100,
            invoke_timeout: None,
            read_buffer_size: 8192,
        },
        protocol::default_protocol(),
        Arc::new(EncoderRegistry::new()), // deliberately no encoders registered
        common::echo_dispatcher(),
        Arc::new(()),
    );
    let listener = server.bind().await.expect("bind test listener");
    let addr = listener.local_addr().expect("local_addr").to_string();
    let running = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = running.serve_on(listener).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let client = common::client_for(&addr, 3_000);
    let err = client
        .invoke(None, None, "Echo", &serde_json::json!({"x": 1}), None)
        .await
        .expect_err("server has no encoder for the default json encode-type");

    assert_eq!(err.code, CODE_ENCODER_NOT_FOUND);
    server.stop();
}
