// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process lifecycle (component C10): starts every configured server,
//! registers with the registration backend once binds have landed, runs a
//! periodic keep-alive, and on stop unregisters, stops every server, and
//! awaits their tasks.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, ensure};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{register::{Register, Target}, server::TcpServer};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const BIND_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Owns a set of `(Target, TcpServer)` pairs and an optional registration
/// backend. Built with `App::new` + repeated `with_server`, then driven to
/// completion with `run()`; `stop()` initiates graceful shutdown from
/// elsewhere (e.g. a signal handler).
pub struct App {
    servers: Vec<(Target, Arc<TcpServer>)>,
    register: Option<Arc<dyn Register>>,
    stop_token: CancellationToken,
}

impl App {
    pub fn new(register: Option<Arc<dyn Register>>) -> Self {
        Self {
            servers: Vec::new(),
            register,
            stop_token: CancellationToken::new(),
        }
    }

    pub fn with_server(mut self, target: Target, server: Arc<TcpServer>) -> Self {
        self.servers.push((target, server));
        self
    }

    /// Signals `run()` to begin the graceful shutdown sequence.
    pub fn stop(&self) {
        self.stop_token.cancel();
    }

    /// Runs until `stop()` is called. Fails immediately if no servers were
    /// registered (spec §4.9 "a 'no servers' configuration fails
    /// immediately").
    pub async fn run(self: Arc<Self>) -> Result<()> {
        ensure!(!self.servers.is_empty(), "app requires at least one server to run");

        let mut server_tasks: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(self.servers.len());
        for (_, server) in &self.servers {
            let server = Arc::clone(server);
            server_tasks.push(tokio::spawn(async move { server.serve().await }));
        }

        // Give the accept loops a moment to actually bind before we
        // advertise the targets to the registration backend.
        tokio::time::sleep(BIND_SETTLE_DELAY).await;

        if let Some(register) = &self.register {
            for (target, _) in &self.servers {
                register
                    .register(target)
                    .with_context(|| format!("failed to register target {}", target.name))?;
                info!(target = %target.name, "registered");
            }
        }

        let keepalive = self.spawn_keepalive();

        self.stop_token.cancelled().await;
        info!("stop signal received, shutting down");
        keepalive.abort();

        if let Some(register) = &self.register {
            for (target, _) in &self.servers {
                if let Err(e) = register.unregister(target) {
                    warn!(target = %target.name, error = %e, "failed to unregister target");
                }
            }
        }

        for (_, server) in &self.servers {
            server.stop();
        }
        for task in server_tasks {
            let _ = task.await;
        }

        Ok(())
    }

    fn spawn_keepalive(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            ticker.tick().await; // first tick fires immediately; the servers just registered
            loop {
                ticker.tick().await;
                let Some(register) = &this.register else { continue };
                for (target, _) in &this.servers {
                    if let Err(e) = register.keep_alive(target) {
                        warn!(target = %target.name, error = %e, "keep_alive failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_fails_immediately_with_no_servers() {
        let app = Arc::new(App::new(None));
        let err = app.run().await.unwrap_err();
        assert!(err.to_string().contains("at least one server"));
    }
}
