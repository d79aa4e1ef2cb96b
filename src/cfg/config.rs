// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_READ_BUF_SIZE: u32 = 8192;
pub const DEFAULT_MAX_INVOKE: u32 = 10000;

/// Top-level process configuration, loaded from a YAML file. Holds one or
/// more `ServerConfig` entries, a single `ClientConfig`, and optional
/// discovery/registration backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub discover: Option<DiscoverConfig>,
    #[serde(default)]
    pub register: Option<RegisterConfig>,
    #[serde(default, rename = "server-config")]
    pub servers: Vec<ServerConfig>,
    #[serde(default, rename = "client-config")]
    pub client: Option<ClientConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverConfig {
    pub name: String,
    pub hosts: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterConfig {
    pub name: String,
    pub hosts: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    pub port: String,
    #[serde(default, rename = "max-invoke")]
    pub max_invoke: u32,
    #[serde(default, rename = "read-buffer-size")]
    pub read_buffer_size: u32,
    #[serde(default, rename = "invoke-timeout-ms")]
    pub invoke_timeout_ms: u64,
}

impl ServerConfig {
    pub fn max_invoke(&self) -> u32 {
        if self.max_invoke == 0 {
            DEFAULT_MAX_INVOKE
        } else {
            self.max_invoke
        }
    }

    pub fn read_buffer_size(&self) -> u32 {
        if self.read_buffer_size == 0 {
            DEFAULT_READ_BUF_SIZE
        } else {
            self.read_buffer_size
        }
    }

    pub fn invoke_timeout(&self) -> Option<Duration> {
        if self.invoke_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.invoke_timeout_ms))
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default, rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
    #[serde(default, rename = "read-buffer-size")]
    pub read_buffer_size: u32,
    #[serde(default, rename = "max-idle-time-ms")]
    pub max_idle_time_ms: u64,
    #[serde(default, rename = "encode-type")]
    pub encode_type: String,
    #[serde(default)]
    pub retry: u32,
    #[serde(default, rename = "max-conn")]
    pub max_conn: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3_000,
            read_buffer_size: DEFAULT_READ_BUF_SIZE,
            max_idle_time_ms: 2 * 60 * 60 * 1000,
            encode_type: "json".to_string(),
            retry: 1,
            max_conn: 1,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    pub fn retry(&self) -> u32 {
        self.retry.max(1)
    }

    pub fn max_conn(&self) -> usize {
        self.max_conn.max(1)
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        if cfg.client.is_none() {
            cfg.client = Some(ClientConfig::default());
        }
        Ok(cfg)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn client_config(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }
}
