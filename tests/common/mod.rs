// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared harness for integration tests: spins up a real `TcpServer` on an
//! OS-assigned port and a real `Client` pointed at it, end to end, instead of
//! mocking any layer.

use std::sync::Arc;

use rapidrpc::{
    Client,
    cfg::config::ClientConfig,
    encoder::EncoderRegistry,
    error::RpcError,
    protocol,
    server::{Dispatcher, InvokeCtx, ServerOptions, TcpServer},
};

/// Starts a server bound to `127.0.0.1:0` running `dispatcher`, returning the
/// running server (call `.stop()` to shut it down) and its actual address.
pub async fn spawn_server(max_invoke: u32, invoke_timeout_ms: u64, dispatcher: Dispatcher) -> (Arc<TcpServer>, String) {
    let options = ServerOptions {
        addr: "127.0.0.1:0".to_string(),
        max_invoke,
        invoke_timeout: (invoke_timeout_ms > 0).then(|| std::time::Duration::from_millis(invoke_timeout_ms)),
        read_buffer_size: 8192,
    };

    let server = TcpServer::new(
        options,
        protocol::default_protocol(),
        Arc::new(EncoderRegistry::with_defaults()),
        dispatcher,
        Arc::new(()),
    );

    let listener = server.bind().await.expect("bind test listener");
    let addr = listener.local_addr().expect("local_addr").to_string();

    let running = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = running.serve_on(listener).await;
    });

    // Give the accept loop a moment to start polling the listener.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    (server, addr)
}

/// A dispatcher that echoes the decoded request body back, unmodified.
pub fn echo_dispatcher() -> Dispatcher {
    Arc::new(move |_ctx: InvokeCtx, _state, request, encoder| {
        Box::pin(async move {
            let value = encoder.decode(&request.body).map_err(|e| RpcError::wrap(e.into()))?;
            encoder.encode(&value).map_err(|e| RpcError::wrap(e.into()))
        })
    })
}

/// A dispatcher that sleeps for `delay_ms` before echoing, to exercise
/// timeout and admission-control paths.
pub fn slow_echo_dispatcher(delay_ms: u64) -> Dispatcher {
    Arc::new(move |_ctx: InvokeCtx, _state, request, encoder| {
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            let value = encoder.decode(&request.body).map_err(|e| RpcError::wrap(e.into()))?;
            encoder.encode(&value).map_err(|e| RpcError::wrap(e.into()))
        })
    })
}

/// A dispatcher that records the peer-visible call count for the server
/// instance it is attached to, via the shared counter.
pub fn counting_dispatcher(counter: Arc<std::sync::atomic::AtomicUsize>) -> Dispatcher {
    Arc::new(move |_ctx: InvokeCtx, _state, request, encoder| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let value = encoder.decode(&request.body).map_err(|e| RpcError::wrap(e.into()))?;
            encoder.encode(&value).map_err(|e| RpcError::wrap(e.into()))
        })
    })
}

pub fn client_for(addr: &str, request_timeout_ms: u64) -> Arc<Client> {
    let cfg = ClientConfig {
        request_timeout_ms,
        ..ClientConfig::default()
    };
    Client::with_defaults(cfg, "test-service", vec![addr.to_string()])
}

/// Like `client_for`, but with an explicit `max_idle_time_ms` for tests
/// exercising reconnect-on-expiry.
pub fn client_for_with_idle(addr: &str, request_timeout_ms: u64, max_idle_time_ms: u64) -> Arc<Client> {
    let cfg = ClientConfig {
        request_timeout_ms,
        max_idle_time_ms,
        ..ClientConfig::default()
    };
    Client::with_defaults(cfg, "test-service", vec![addr.to_string()])
}
