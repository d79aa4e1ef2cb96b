// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client request engine (component C9): request-ID allocation, the
//! pending-reply table, send-with-retry, and correlated await. Generalizes
//! the teacher's per-connection `sending`/`reciver` `DashMap`s
//! (`ClientConnection`) to a single process-wide table keyed by
//! `request_id` instead of per-connection ITT, since RPC replies are
//! correlated across the whole client, not per socket.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    client::{
        conn::PendingTable,
        pool::Pool,
        router::{FindType, Router},
    },
    error::RpcError,
    meta::{self, Meta},
    protocol::{Protocol, Request},
};

const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

pub struct RequestEngine {
    next_id: AtomicI32,
    pending: Arc<PendingTable>,
    pool: Arc<Pool>,
    router: Arc<Router>,
    protocol: Arc<dyn Protocol>,
    default_encode_type: String,
    retry: u32,
}

impl RequestEngine {
    /// `pending` must be the same table handed to the `Pool`'s connections,
    /// since the read loop delivers replies by `request_id` into it.
    pub fn new(
        pending: Arc<PendingTable>,
        pool: Arc<Pool>,
        router: Arc<Router>,
        protocol: Arc<dyn Protocol>,
        default_encode_type: impl Into<String>,
        retry: u32,
    ) -> Self {
        Self {
            next_id: AtomicI32::new(0),
            pending,
            pool,
            router,
            protocol,
            default_encode_type: default_encode_type.into(),
            retry: retry.max(1),
        }
    }

    fn next_request_id(&self) -> i32 {
        loop {
            let cur = self.next_id.load(Ordering::Relaxed);
            let next = if cur >= i32::MAX { 1 } else { cur + 1 };
            if self
                .next_id
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Invokes `method` on `addr` (or a routed endpoint if `addr` is
    /// `None`), returning the raw reply body or a structured `RpcError`
    /// (spec §4.8). `timeout` bounds the whole call, including retries.
    pub async fn invoke(
        &self,
        timeout: Option<std::time::Duration>,
        encoding_name: Option<&str>,
        addr: Option<&str>,
        method: &str,
        body: Vec<u8>,
        extra_meta: Option<Meta>,
    ) -> Result<Vec<u8>, RpcError> {
        let mut call_meta = extra_meta.unwrap_or_default();
        let encode_type = encoding_name.unwrap_or(&self.default_encode_type);
        call_meta.set(meta::ENCODE_TYPE, encode_type);

        let request_id = self.next_request_id();
        let request = Request {
            request_id,
            method: method.to_string(),
            body,
            meta: call_meta,
        };

        match timeout {
            Some(dur) => match tokio::time::timeout(dur, self.invoke_inner(addr, request)).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending.remove(&request_id);
                    Err(RpcError::request_timeout())
                },
            },
            None => self.invoke_inner(addr, request).await,
        }
    }

    async fn invoke_inner(&self, addr: Option<&str>, request: Request) -> Result<Vec<u8>, RpcError> {
        let request_id = request.request_id;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);

        let initial_find = match addr {
            Some(a) => FindType::Addr(a.to_string()),
            None => match request.meta.get(meta::CONSISTENT_HASH_KEY) {
                Some(key) => FindType::ConsistentHash(key.to_string()),
                None => FindType::Next,
            },
        };

        let encoded = self.protocol.encode_request(&request).map_err(|e| RpcError::wrap(e.into()))?;
        let framed = crate::frame::write_frame(&encoded);

        if let Err(err) = self.send_with_retry(&initial_find, &framed).await {
            self.pending.remove(&request_id);
            return Err(err);
        }

        match rx.await {
            Ok(response) => {
                if response.code != 0 && response.code != crate::error::CODE_OK {
                    Err(RpcError::new(response.code, response.code_status))
                } else {
                    Ok(response.body)
                }
            },
            Err(_) => {
                self.pending.remove(&request_id);
                Err(RpcError::wrap(anyhow::anyhow!("connection closed before reply arrived")))
            },
        }
    }

    async fn send_with_retry(&self, initial_find: &FindType, framed: &[u8]) -> Result<(), RpcError> {
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..self.retry {
            let find = if attempt == 0 {
                initial_find.clone()
            } else {
                // Downgrade any non-ADDR mode to NEXT so a retry rotates
                // across endpoints (spec §4.8 step 6).
                match initial_find {
                    FindType::Addr(addr) => FindType::Addr(addr.clone()),
                    _ => FindType::Next,
                }
            };

            let Some(selected_addr) = self.router.select(find) else {
                return Err(RpcError::connect_not_found());
            };

            let conn = match self.pool.get_conn(&selected_addr).await {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(addr = %selected_addr, attempt, error = %e, "dial failed, retrying");
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                },
            };

            match conn.send_frame(framed).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    // Bug fix vs. the original: record the actual write
                    // error here, not the previous dial error.
                    debug!(addr = %selected_addr, attempt, error = %e, "write failed, retrying");
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                },
            }
        }

        Err(RpcError::wrap(last_err.unwrap_or_else(|| {
            anyhow::anyhow!("send failed with no recorded error")
        })))
    }
}
