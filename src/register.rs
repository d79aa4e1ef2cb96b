// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `Register` external collaborator contract (spec §6). Only the
//! abstract interface is in scope; real backends (etcd, Consul, ...) are
//! external collaborators left to downstream crates.

use std::sync::Arc;

use anyhow::Result;

/// Identifies a running server instance for registration purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub name: String,
    pub ip: String,
    pub port: String,
}

impl Target {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port: port.into(),
        }
    }
}

/// Registers/unregisters/keep-alives a `Target` against a service-discovery
/// backend. Only the interface is specified here (spec §1 Non-goals).
pub trait Register: Send + Sync {
    fn register(&self, target: &Target) -> Result<()>;
    fn unregister(&self, target: &Target) -> Result<()>;
    fn keep_alive(&self, target: &Target) -> Result<()>;
}

/// Default register backend: does nothing. Used when no external registry
/// is configured.
#[derive(Debug, Default)]
pub struct NopRegister;

impl Register for NopRegister {
    fn register(&self, _target: &Target) -> Result<()> {
        Ok(())
    }

    fn unregister(&self, _target: &Target) -> Result<()> {
        Ok(())
    }

    fn keep_alive(&self, _target: &Target) -> Result<()> {
        Ok(())
    }
}

pub fn nop() -> Arc<dyn Register> {
    Arc::new(NopRegister)
}
