// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-endpoint connection bundle (other half of component C7), generalizing
//! the teacher's `Pool` (`pool_sessions.rs`) from per-session iSCSI state to
//! round-robin pooled RPC connections keyed by `addr`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    client::conn::{PendingTable, PooledConn},
    protocol::Protocol,
};

struct Bundle {
    conns: Vec<Arc<PooledConn>>,
    cursor: usize,
    next_id: u64,
}

impl Bundle {
    fn new() -> Self {
        Self {
            conns: Vec::new(),
            cursor: 0,
            next_id: 0,
        }
    }
}

/// Owns one `Bundle` per endpoint address. Bundles are created lazily on
/// first acquisition and grown up to `max_conn` connections.
pub struct Pool {
    bundles: Mutex<HashMap<String, Bundle>>,
    max_conn: usize,
    max_idle_time: Duration,
    read_buffer_size: u32,
    protocol: Arc<dyn Protocol>,
    pending: Arc<PendingTable>,
}

impl Pool {
    pub fn new(
        max_conn: usize,
        max_idle_time: Duration,
        read_buffer_size: u32,
        protocol: Arc<dyn Protocol>,
        pending: Arc<PendingTable>,
    ) -> Self {
        Self {
            bundles: Mutex::new(HashMap::new()),
            max_conn: max_conn.max(1),
            max_idle_time,
            read_buffer_size,
            protocol,
            pending,
        }
    }

    /// Returns a round-robin connection for `addr`, dialing lazily and
    /// growing the bundle up to `max_conn` (spec §4.6 `get_conn`).
    pub async fn get_conn(&self, addr: &str) -> Result<Arc<PooledConn>> {
        let mut bundles = self.bundles.lock().await;
        let bundle = bundles.entry(addr.to_string()).or_insert_with(Bundle::new);

        if bundle.conns.is_empty() {
            let conn = self.dial(addr, bundle.next_id).await?;
            bundle.next_id += 1;
            bundle.conns.push(conn);
        }

        // Mirrors the original's check-then-index-then-increment order:
        // grow only once the *current* cursor has run off the end of the
        // bundle, index with that same cursor, then advance it for the
        // next call.
        if bundle.cursor >= bundle.conns.len() && bundle.conns.len() < self.max_conn && bundle.cursor < self.max_conn {
            match self.dial(addr, bundle.next_id).await {
                Ok(conn) => {
                    bundle.next_id += 1;
                    bundle.conns.push(conn);
                },
                // Dial failure does not fail acquisition when the
                // bundle already has connections — fall through to
                // round-robin over the existing ones.
                Err(e) => debug!(%addr, error = %e, "bundle growth dial failed"),
            }
        }
        if bundle.cursor >= bundle.conns.len() {
            bundle.cursor = 0;
        }

        let idx = bundle.cursor;
        bundle.cursor += 1;
        Ok(Arc::clone(&bundle.conns[idx]))
    }

    async fn dial(&self, addr: &str, id: u64) -> Result<Arc<PooledConn>> {
        PooledConn::connect(
            addr,
            id,
            Arc::clone(&self.protocol),
            Arc::clone(&self.pending),
            self.read_buffer_size,
            self.max_idle_time,
        )
        .await
    }

    /// Closes and drops the bundle for `addr`, if present (used when the
    /// router evicts a non-fixed endpoint, spec §4.7 step 5).
    pub async fn close_bundle(&self, addr: &str) {
        let mut bundles = self.bundles.lock().await;
        if let Some(bundle) = bundles.remove(addr) {
            for conn in bundle.conns {
                conn.close();
            }
        }
    }
}
