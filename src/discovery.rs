// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `Discover` external collaborator contract (spec §6). Only the
//! abstract interface is in scope; real backends (etcd, Consul, ...) are
//! external collaborators left to downstream crates.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Resolves a logical service name to a list of `host:port` endpoints.
pub trait Discover: Send + Sync {
    fn find(&self, name: &str) -> Vec<String>;

    /// Optional push channel of endpoint-list updates. Default: no
    /// asynchronous updates, polling (`find`) is the only source.
    fn watch(&self, _name: &str) -> Option<broadcast::Receiver<Vec<String>>> {
        None
    }
}

/// Default discover backend: resolves nothing, matching the original's
/// `nopDiscover`. Useful when every endpoint is supplied directly.
#[derive(Debug, Default)]
pub struct NopDiscover;

impl Discover for NopDiscover {
    fn find(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// A fixed, in-process endpoint list — handy for tests and for services
/// whose topology is static.
#[derive(Debug, Default)]
pub struct StaticDiscover {
    endpoints: Vec<String>,
}

impl StaticDiscover {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }
}

impl Discover for StaticDiscover {
    fn find(&self, _name: &str) -> Vec<String> {
        self.endpoints.clone()
    }
}

pub fn nop() -> Arc<dyn Discover> {
    Arc::new(NopDiscover)
}
