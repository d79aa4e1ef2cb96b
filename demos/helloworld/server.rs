// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use rapidrpc::{
    app::App,
    encoder::EncoderRegistry,
    error::RpcError,
    protocol,
    register::Target,
    server::{Dispatcher, ServerOptions, TcpServer},
};
use tracing::info;

fn echo_dispatcher() -> Dispatcher {
    Arc::new(move |ctx, _state, request, encoder| {
        Box::pin(async move {
            let value = encoder.decode(&request.body).map_err(|e| RpcError::wrap(e.into()))?;
            info!(method = %ctx.method, peer = %ctx.peer_addr, "Echo invoked");
            encoder.encode(&value).map_err(|e| RpcError::wrap(e.into()))
        })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = rapidrpc::cfg::logger::init_default_logger();

    let options = ServerOptions {
        addr: "127.0.0.1:9090".to_string(),
        max_invoke: 10_000,
        invoke_timeout: None,
        read_buffer_size: 8192,
    };

    let server = TcpServer::new(
        options,
        protocol::default_protocol(),
        Arc::new(EncoderRegistry::global()),
        echo_dispatcher(),
        Arc::new(()),
    );

    let app = Arc::new(App::new(None).with_server(Target::new("echo", "127.0.0.1", "9090"), server));

    let stopper = Arc::clone(&app);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stopper.stop();
    });

    app.run().await
}
