// SPDX-License-Identifier: AGPL-3.0-or-later

//! The RPC client: connection pool (C7), router (C8), and request engine
//! (C9) wired together behind a single `Client::invoke` entry point.

pub mod conn;
pub mod engine;
pub mod pool;
pub mod router;

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::config::ClientConfig,
    discovery::Discover,
    encoder::EncoderRegistry,
    error::RpcError,
    meta::Meta,
    protocol::{self, Protocol},
};

use engine::RequestEngine;
use pool::Pool;
use router::Router;

/// A ready-to-use RPC client bound to one logical service. Discovery
/// polling (if configured) runs for as long as the returned `Arc<Client>`
/// is alive; call `shutdown()` to stop it deterministically.
pub struct Client {
    engine: RequestEngine,
    encoders: Arc<EncoderRegistry>,
    cfg: ClientConfig,
    discovery_cancel: CancellationToken,
}

impl Client {
    /// `fixed_addrs` are always present and never evicted by discovery
    /// updates (spec §3 "fixed endpoint"). `service_name` is the key
    /// passed to `discover.find`/`discover.watch`.
    pub fn new(
        cfg: ClientConfig,
        service_name: impl Into<String>,
        fixed_addrs: Vec<String>,
        discover: Option<Arc<dyn Discover>>,
        protocol: Arc<dyn Protocol>,
    ) -> Arc<Self> {
        let pending = Arc::new(DashMap::new());
        let pool = Arc::new(Pool::new(
            cfg.max_conn(),
            cfg.max_idle_time(),
            cfg.read_buffer_size,
            Arc::clone(&protocol),
            Arc::clone(&pending),
        ));
        let router = Router::new(service_name, fixed_addrs, discover, Arc::clone(&pool));

        let discovery_cancel = CancellationToken::new();
        router.spawn_discovery(discovery_cancel.clone());

        let engine = RequestEngine::new(
            pending,
            pool,
            router,
            protocol,
            cfg.encode_type.clone(),
            cfg.retry(),
        );

        Arc::new(Self {
            engine,
            encoders: Arc::new(EncoderRegistry::global()),
            cfg,
            discovery_cancel,
        })
    }

    /// Convenience constructor using the default JSON protocol.
    pub fn with_defaults(
        cfg: ClientConfig,
        service_name: impl Into<String>,
        fixed_addrs: Vec<String>,
    ) -> Arc<Self> {
        Self::new(cfg, service_name, fixed_addrs, None, protocol::default_protocol())
    }

    pub fn stop_discovery(&self) {
        self.discovery_cancel.cancel();
    }

    /// Invokes `method` against `addr` (direct routing) or a routed
    /// endpoint (round-robin / consistent-hash, depending on `meta`),
    /// encoding `value` and decoding the reply with `encoding_name` or the
    /// client's configured default (spec §4.8 `Invoke(ctx, encoding_name?,
    /// addr?, method, body, meta?)`).
    pub async fn invoke(
        &self,
        encoding_name: Option<&str>,
        addr: Option<&str>,
        method: &str,
        value: &serde_json::Value,
        meta: Option<Meta>,
    ) -> Result<serde_json::Value, RpcError> {
        let encode_type = encoding_name.unwrap_or(&self.cfg.encode_type);
        let encoder = self.encoders.get(encode_type).ok_or_else(RpcError::encoder_not_found)?;
        let body = encoder.encode(value).map_err(|e| RpcError::wrap(e.into()))?;

        let timeout = (self.cfg.request_timeout_ms > 0).then(|| self.cfg.request_timeout());

        let reply_body = self
            .engine
            .invoke(timeout, Some(encode_type), addr, method, body, meta)
            .await?;

        encoder.decode(&reply_body).map_err(|e| RpcError::wrap(e.into()))
    }
}
