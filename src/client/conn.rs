// SPDX-License-Identifier: AGPL-3.0-or-later

//! A single pooled client connection (half of component C7).
//!
//! Generalizes the teacher's `ClientConnection`: a TCP socket split into a
//! mutex-guarded write half and a spawned read-loop task, except replies are
//! demultiplexed by `request_id` into a process-wide pending-reply table
//! (owned by `client::engine`) instead of per-ITT channels, since RPC
//! replies are correlated by request id rather than by connection.

use std::{sync::Arc, time::Duration, time::Instant};

use anyhow::{Context, Result};
use bytes::BytesMut;
use dashmap::DashMap;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf},
    sync::{Mutex, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{frame, protocol::Protocol};

pub(super) type PendingTable = DashMap<i32, oneshot::Sender<crate::protocol::Response>>;

struct ConnState {
    writer: OwnedWriteHalf,
    created_at: Instant,
    running: bool,
    cancel: CancellationToken,
}

/// One pooled TCP connection to a single endpoint. Write access and the
/// redial decision are guarded by the same lock so that "reconnect on
/// send" is atomic with respect to concurrent callers writing on the same
/// connection (spec §4.6).
pub struct PooledConn {
    pub id: u64,
    pub addr: String,
    state: Mutex<ConnState>,
    max_idle_time: Duration,
    protocol: Arc<dyn Protocol>,
    pending: Arc<PendingTable>,
    read_buffer_size: u32,
}

impl PooledConn {
    pub async fn connect(
        addr: &str,
        id: u64,
        protocol: Arc<dyn Protocol>,
        pending: Arc<PendingTable>,
        read_buffer_size: u32,
        max_idle_time: Duration,
    ) -> Result<Arc<Self>> {
        let (writer, reader, cancel) = Self::dial(addr).await?;

        let conn = Arc::new(Self {
            id,
            addr: addr.to_string(),
            state: Mutex::new(ConnState {
                writer,
                created_at: Instant::now(),
                running: true,
                cancel: cancel.clone(),
            }),
            max_idle_time,
            protocol: Arc::clone(&protocol),
            pending: Arc::clone(&pending),
            read_buffer_size,
        });

        let weak = Arc::downgrade(&conn);
        tokio::spawn(Self::read_loop(weak, reader, cancel, protocol, pending, read_buffer_size));
        Ok(conn)
    }

    async fn dial(addr: &str) -> Result<(OwnedWriteHalf, OwnedReadHalf, CancellationToken)> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to dial {addr}"))?;
        stream.set_nodelay(true).context("set_nodelay")?;
        let (r, w) = stream.into_split();
        Ok((w, r, CancellationToken::new()))
    }

    pub fn is_running(&self) -> bool {
        // Best-effort snapshot; the authoritative check happens under the
        // lock inside `send_frame`.
        self.state.try_lock().map(|s| s.running).unwrap_or(true)
    }

    /// Writes one already-framed request to the socket, redialing first if
    /// the connection is dead or has exceeded `max_idle_time` (spec §4.6
    /// "reconnect-on-send").
    pub async fn send_frame(self: &Arc<Self>, bytes: &[u8]) -> Result<()> {
        let mut st = self.state.lock().await;

        if !st.running || st.created_at.elapsed() >= self.max_idle_time {
            st.cancel.cancel();
            let (writer, reader, cancel) = Self::dial(&self.addr).await?;
            st.writer = writer;
            st.created_at = Instant::now();
            st.running = true;
            st.cancel = cancel.clone();

            let weak = Arc::downgrade(self);
            tokio::spawn(Self::read_loop(
                weak,
                reader,
                cancel,
                Arc::clone(&self.protocol),
                Arc::clone(&self.pending),
                self.read_buffer_size,
            ));
        }

        let result = st.writer.write_all(bytes).await;
        if result.is_err() {
            st.running = false;
        }
        result.context("write request frame")
    }

    pub fn close(&self) {
        if let Ok(mut st) = self.state.try_lock() {
            st.running = false;
            st.cancel.cancel();
        }
    }

    async fn read_loop(
        weak: std::sync::Weak<Self>,
        mut reader: OwnedReadHalf,
        cancel: CancellationToken,
        protocol: Arc<dyn Protocol>,
        pending: Arc<PendingTable>,
        read_buffer_size: u32,
    ) {
        let mut acc = BytesMut::with_capacity(read_buffer_size as usize);
        let mut chunk = vec![0u8; read_buffer_size as usize];

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let n = tokio::select! {
                _ = cancel.cancelled() => break,
                res = reader.read(&mut chunk) => match res {
                    Ok(n) => n,
                    Err(e) => {
                        debug!(error = %e, "pooled connection read error");
                        break;
                    }
                },
            };
            if n == 0 {
                break;
            }
            acc.extend_from_slice(&chunk[..n]);

            let mut frames = Vec::new();
            if frame::drain_frames(&mut acc, |p| frames.push(p)).is_err() {
                warn!("malformed frame from server, closing connection");
                break;
            }

            for payload in frames {
                match protocol.decode_response(&payload) {
                    Ok(resp) => {
                        // Unknown request_id (e.g. arrived after the caller
                        // timed out): drop silently per spec §4.8.
                        if let Some((_, tx)) = pending.remove(&resp.request_id) {
                            let _ = tx.send(resp);
                        }
                    },
                    Err(e) => warn!(error = %e, "failed to decode response"),
                }
            }
        }

        if let Some(conn) = weak.upgrade()
            && let Ok(mut st) = conn.state.try_lock()
        {
            st.running = false;
        }
    }
}
