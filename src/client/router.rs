// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-side endpoint set and selection (component C8): tracks the
//! service's current endpoints (direct config plus `Discover` polling),
//! keeps a consistent-hash ring over them, and answers "which address for
//! this call" queries in three modes.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{client::pool::Pool, discovery::Discover};

const RING_WEIGHT: u32 = 10;
const DISCOVER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Selection strategy for one call (spec §4.7).
#[derive(Debug, Clone)]
pub enum FindType {
    Addr(String),
    ConsistentHash(String),
    Next,
}

#[derive(Debug, Clone)]
struct Endpoint {
    addr: String,
    is_fixed: bool,
}

struct HashRing {
    /// Sorted by hash; each real endpoint contributes `RING_WEIGHT` virtual
    /// nodes.
    nodes: Vec<(u64, String)>,
}

impl HashRing {
    fn build(endpoints: &[Endpoint]) -> Self {
        let mut nodes: Vec<(u64, String)> = Vec::with_capacity(endpoints.len() * RING_WEIGHT as usize);
        for ep in endpoints {
            for i in 0..RING_WEIGHT {
                nodes.push((hash_str(&format!("{}#{i}", ep.addr)), ep.addr.clone()));
            }
        }
        nodes.sort_unstable_by_key(|(h, _)| *h);
        Self { nodes }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if self.nodes.is_empty() {
            return None;
        }
        let h = hash_str(key);
        let idx = match self.nodes.binary_search_by_key(&h, |(hh, _)| *hh) {
            Ok(i) => i,
            Err(i) if i < self.nodes.len() => i,
            Err(_) => 0,
        };
        Some(self.nodes[idx].1.clone())
    }
}

fn hash_str(s: &str) -> u64 {
    let mut h = DefaultHasher::new();
    s.hash(&mut h);
    h.finish()
}

struct RouterState {
    endpoints: Vec<Endpoint>,
    ring: HashRing,
    next_cursor: usize,
}

/// Endpoint tracker + selector for one logical service. Holds a strong
/// reference to the `Pool` only to ask it to close bundles for endpoints
/// dropped by a discovery update (spec §4.7 step 5) — it does not own
/// connections itself.
pub struct Router {
    service_name: String,
    state: Mutex<RouterState>,
    discover: Option<Arc<dyn Discover>>,
    pool: Arc<Pool>,
}

impl Router {
    pub fn new(
        service_name: impl Into<String>,
        fixed_addrs: Vec<String>,
        discover: Option<Arc<dyn Discover>>,
        pool: Arc<Pool>,
    ) -> Arc<Self> {
        let endpoints: Vec<Endpoint> = fixed_addrs
            .into_iter()
            .map(|addr| Endpoint { addr, is_fixed: true })
            .collect();
        let ring = HashRing::build(&endpoints);

        Arc::new(Self {
            service_name: service_name.into(),
            state: Mutex::new(RouterState { endpoints, ring, next_cursor: 0 }),
            discover,
            pool,
        })
    }

    /// Spawns the 10s discovery poll ticker (and a watch-stream consumer,
    /// if the backend exposes one). No-op if no `Discover` was configured.
    pub fn spawn_discovery(self: &Arc<Self>, cancel: CancellationToken) {
        let Some(discover) = self.discover.clone() else {
            return;
        };

        if let Some(mut rx) = discover.watch(&self.service_name) {
            let this = Arc::clone(self);
            let cancel_watch = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel_watch.cancelled() => return,
                        update = rx.recv() => match update {
                            Ok(addrs) => this.apply_update(addrs).await,
                            Err(_) => return,
                        }
                    }
                }
            });
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(DISCOVER_POLL_INTERVAL) => {
                        let addrs = discover.find(&this.service_name);
                        this.apply_update(addrs).await;
                    }
                }
            }
        });
    }

    /// Rebuilds the endpoint set from a fresh discovery snapshot (spec
    /// §4.7 update algorithm). Fixed endpoints are always retained; dropped
    /// non-fixed bundles are closed after the lock is released.
    pub async fn apply_update(&self, discovered: Vec<String>) {
        let dropped = {
            let mut state = self.state.lock().expect("router state poisoned");

            let mut new_list: Vec<Endpoint> =
                state.endpoints.iter().filter(|e| e.is_fixed).cloned().collect();
            for addr in discovered {
                if !new_list.iter().any(|e| e.addr == addr) {
                    new_list.push(Endpoint { addr, is_fixed: false });
                }
            }

            let dropped: Vec<String> = state
                .endpoints
                .iter()
                .filter(|e| !e.is_fixed && !new_list.iter().any(|n| n.addr == e.addr))
                .map(|e| e.addr.clone())
                .collect();

            state.ring = HashRing::build(&new_list);
            state.endpoints = new_list;
            dropped
        };

        for addr in dropped {
            debug!(%addr, "endpoint removed by discovery update, closing bundle");
            self.pool.close_bundle(&addr).await;
        }
    }

    /// Resolves a selection request to one endpoint address.
    pub fn select(&self, find: FindType) -> Option<String> {
        let mut state = self.state.lock().expect("router state poisoned");
        match find {
            FindType::Addr(addr) => state.endpoints.iter().find(|e| e.addr == addr).map(|e| e.addr.clone()),
            FindType::ConsistentHash(key) => state.ring.lookup(&key),
            FindType::Next => {
                if state.endpoints.is_empty() {
                    return None;
                }
                let idx = state.next_cursor % state.endpoints.len();
                state.next_cursor = state.next_cursor.wrapping_add(1);
                Some(state.endpoints[idx].addr.clone())
            },
        }
    }
}
