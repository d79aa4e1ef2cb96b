// SPDX-License-Identifier: AGPL-3.0-or-later

//! Async TCP server engine (component C6).
//!
//! Mirrors the connection-handling shape of `client::conn::Connection`'s
//! read loop (length-prefixed frames drained into a scratch buffer, one
//! task per connection) but runs the inverse role: accept, decode a
//! `Request`, dispatch it, and write back a `Response`. Admission control
//! uses a `tokio::sync::Semaphore` sized to `max_invoke`; a permit is held
//! for the lifetime of one in-flight invocation. Handler panics are
//! contained by `tokio::spawn` + `JoinError`, never taking down the
//! connection or the listener.

use std::{
    any::Any,
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::{Mutex, Semaphore},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cfg::config::ServerConfig,
    encoder::EncoderRegistry,
    error::RpcError,
    frame::{self, MAX_FRAME_LEN},
    meta::Meta,
    protocol::{Protocol, Request, Response},
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Per-invocation context handed to a `Dispatcher`. Carries everything a
/// handler needs besides the decoded request body: who is calling, what
/// method was named, and the call metadata (spec §4.4).
#[derive(Debug, Clone)]
pub struct InvokeCtx {
    pub request_id: i32,
    pub method: String,
    pub meta: Meta,
    pub peer_addr: SocketAddr,
}

/// A user-supplied handler, matching the original's function-value
/// `Dispatcher` type. Generated per-service stubs are out of scope; callers
/// hand-write a closure (see `demos/helloworld`) that downcasts `state` to
/// whatever service struct it expects and calls into it.
pub type Dispatcher = Arc<
    dyn Fn(
            InvokeCtx,
            Arc<dyn Any + Send + Sync>,
            Request,
            Arc<dyn crate::encoder::Encoder>,
        ) -> BoxFuture<'static, Result<Vec<u8>, RpcError>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: String,
    pub max_invoke: u32,
    pub invoke_timeout: Option<Duration>,
    pub read_buffer_size: u32,
}

impl From<&ServerConfig> for ServerOptions {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            addr: cfg.addr(),
            max_invoke: cfg.max_invoke(),
            invoke_timeout: cfg.invoke_timeout(),
            read_buffer_size: cfg.read_buffer_size(),
        }
    }
}

/// One TCP listener dispatching decoded requests to a single `Dispatcher`.
pub struct TcpServer {
    options: ServerOptions,
    protocol: Arc<dyn Protocol>,
    encoders: Arc<EncoderRegistry>,
    dispatcher: Dispatcher,
    state: Arc<dyn Any + Send + Sync>,
    admission: Arc<Semaphore>,
    cancel: CancellationToken,
    /// Every currently-accepted connection's write half, keyed by a
    /// monotonically allocated identity. Registered on accept, deregistered
    /// on exit from the connection's read loop — by either path, not just
    /// shutdown — so `stop()` can close whatever is still open (spec §4.4
    /// "server connection set").
    conns: Mutex<HashMap<u64, Arc<Mutex<OwnedWriteHalf>>>>,
    next_conn_id: AtomicU64,
}

impl TcpServer {
    pub fn new(
        options: ServerOptions,
        protocol: Arc<dyn Protocol>,
        encoders: Arc<EncoderRegistry>,
        dispatcher: Dispatcher,
        state: Arc<dyn Any + Send + Sync>,
    ) -> Arc<Self> {
        let admission = Arc::new(Semaphore::new(options.max_invoke as usize));
        Arc::new(Self {
            options,
            protocol,
            encoders,
            dispatcher,
            state,
            admission,
            cancel: CancellationToken::new(),
            conns: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(0),
        })
    }

    pub fn addr(&self) -> &str {
        &self.options.addr
    }

    /// Total number of TCP connections accepted over this server's
    /// lifetime (monotonic, never decremented on disconnect) — lets tests
    /// observe a fresh dial landing without inspecting socket state
    /// directly (spec §8 Scenario 5: "observable via server accept count
    /// increasing by 1").
    pub fn connection_count(&self) -> u64 {
        self.next_conn_id.load(Ordering::Relaxed)
    }

    /// Signals the accept loop to stop, then copies and clears the
    /// connection set and closes each one (spec §4.4 shutdown sequence).
    /// Does not wait for the accept loop or handler tasks to actually
    /// finish; callers that need that should track the `serve()` join
    /// handle themselves (see `app::App`).
    pub fn stop(self: &Arc<Self>) {
        self.cancel.cancel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let drained: Vec<_> = {
                let mut conns = this.conns.lock().await;
                std::mem::take(&mut *conns).into_values().collect()
            };
            for writer in drained {
                let mut w = writer.lock().await;
                let _ = w.shutdown().await;
            }
        });
    }

    /// Binds the listening socket without running the accept loop yet.
    /// Split out from `serve()` so callers (tests, `addr=...:0`) can learn
    /// the actual bound address before the loop starts.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.options.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.options.addr))
    }

    /// Runs the accept loop until `stop()` is called or the listener
    /// errors unrecoverably. Transient accept errors are retried with
    /// exponential backoff (5ms, doubling, capped at 1s), matching the
    /// original's `acceptLoop`.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener).await
    }

    /// Runs the accept loop on an already-bound listener.
    pub async fn serve_on(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %self.options.addr, "listening");

        let mut backoff = INITIAL_BACKOFF;
        loop {
            select! {
                _ = self.cancel.cancelled() => {
                    info!(addr = %self.options.addr, "accept loop stopping");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            backoff = INITIAL_BACKOFF;
                            let _ = stream.set_nodelay(true);
                            let this = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = this.handle_connection(stream, peer).await {
                                    debug!(%peer, error = %e, "connection closed");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, backoff_ms = backoff.as_millis(), "accept failed, backing off");
                            select! {
                                _ = self.cancel.cancelled() => return Ok(()),
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.conns.lock().await.insert(conn_id, Arc::clone(&writer));

        let result = self.read_loop(&mut reader, peer, Arc::clone(&writer)).await;

        self.conns.lock().await.remove(&conn_id);
        result
    }

    async fn read_loop(
        self: &Arc<Self>,
        reader: &mut OwnedReadHalf,
        peer: SocketAddr,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) -> Result<()> {
        let mut acc = BytesMut::with_capacity(self.options.read_buffer_size as usize);
        let mut chunk = vec![0u8; self.options.read_buffer_size as usize];

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let n = select! {
                _ = self.cancel.cancelled() => return Ok(()),
                res = reader.read(&mut chunk) => res.context("read from socket")?,
            };
            if n == 0 {
                return Ok(());
            }
            acc.extend_from_slice(&chunk[..n]);

            let mut frames = Vec::new();
            frame::drain_frames(&mut acc, |payload| frames.push(payload))
                .map_err(|_| anyhow::anyhow!("frame exceeds {MAX_FRAME_LEN} bytes or is malformed"))?;

            for payload in frames {
                let this = Arc::clone(self);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    this.handle_frame(payload, peer, writer).await;
                });
            }
        }
    }

    async fn handle_frame(
        self: Arc<Self>,
        payload: Bytes,
        peer: SocketAddr,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) {
        let request = match self.protocol.decode_request(&payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(%peer, error = %e, "failed to decode request");
                return;
            },
        };

        let response = self.invoke(request.clone(), peer).await;
        let encoded = match self.protocol.encode_response(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%peer, error = %e, "failed to encode response");
                return;
            },
        };

        let framed = frame::write_frame(&encoded);
        let mut w = writer.lock().await;
        if let Err(e) = w.write_all(&framed).await {
            warn!(%peer, error = %e, "failed to write response");
        }
    }

    /// Runs admission control, handler invocation (with optional timeout
    /// and panic containment), and builds the `Response` envelope. Never
    /// returns `Err`: every failure mode is folded into a `Response`
    /// carrying the corresponding `RpcError`.
    ///
    /// Both the admission wait and the handler dispatch race against the
    /// same `invoke_timeout` deadline; either one losing the race yields
    /// `ErrRequestFull` (502), matching the original: a timed-out
    /// invocation is reported as capacity exhaustion, not as a distinct
    /// client-style timeout code.
    async fn invoke(&self, request: Request, peer: SocketAddr) -> Response {
        let work = self.invoke_inner(request.clone(), peer);

        let result = match self.options.invoke_timeout {
            Some(dur) => match timeout(dur, work).await {
                Ok(inner) => inner,
                Err(_) => Err(RpcError::request_full()),
            },
            None => work.await,
        };

        Response::from_result(&request, result)
    }

    async fn invoke_inner(&self, request: Request, peer: SocketAddr) -> Result<Vec<u8>, RpcError> {
        let permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RpcError::request_full())?;

        let encode_type = request
            .meta
            .get(crate::meta::ENCODE_TYPE)
            .unwrap_or(crate::encoder::JSON)
            .to_string();
        let encoder = self
            .encoders
            .get(&encode_type)
            .ok_or_else(RpcError::encoder_not_found)?;

        let ctx = InvokeCtx {
            request_id: request.request_id,
            method: request.method.clone(),
            meta: request.meta.clone(),
            peer_addr: peer,
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(dispatcher(ctx, state, request, encoder));

        let result = match handle.await {
            Ok(res) => res,
            Err(join_err) => {
                error!(%peer, error = %join_err, "handler panicked");
                Err(RpcError::new(crate::error::CODE_REQUEST_FULL, "handler panicked"))
            },
        };
        drop(permit);
        result
    }
}
