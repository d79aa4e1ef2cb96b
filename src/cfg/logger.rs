// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_appender::{non_blocking::WorkerGuard, rolling::RollingFileAppender};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize, Clone)]
struct LoggerFile {
    logger: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Output {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Clone)]
struct LogFileConfig {
    path: String,
}

#[derive(Debug, Deserialize, Clone)]
struct LogConfig {
    #[serde(default = "default_level")]
    level: String,
    #[serde(default = "default_output")]
    output: Output,
    #[serde(default)]
    json: bool,
    #[serde(default)]
    file: Option<LogFileConfig>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_output() -> Output {
    Output::Stdout
}

/// Initializes the global `tracing` subscriber from a YAML config file. The
/// returned `WorkerGuard` must stay alive for the process lifetime so
/// buffered log lines are flushed on drop.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read logger config: {config_path}"))?;
    let cfg: LoggerFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse logger config: {config_path}"))?;
    init_logger_from(&cfg.logger)
}

/// Initializes the global subscriber with sane defaults (stdout, info,
/// plain text) without requiring a config file. Intended for demos/tests.
pub fn init_default_logger() -> WorkerGuard {
    init_logger_from(&LogConfig {
        level: default_level(),
        output: default_output(),
        json: false,
        file: None,
    })
    .expect("default logger configuration is always valid")
}

fn init_logger_from(cfg: &LogConfig) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&cfg.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or RUST_LOG")?;

    let (writer, guard) = make_writer(cfg)?;
    let layer = fmt::layer().with_writer(writer).with_ansi(false);

    if cfg.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .context("failed to install global tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .context("failed to install global tracing subscriber")?;
    }

    Ok(guard)
}

fn make_writer(
    cfg: &LogConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    Ok(match cfg.output {
        Output::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        Output::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        Output::File => {
            let fcfg = cfg
                .file
                .clone()
                .context("logger.file is required when output = file")?;
            let path = PathBuf::from(&fcfg.path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let appender = RollingFileAppender::new(
                tracing_appender::rolling::Rotation::NEVER,
                dir,
                path.file_name().unwrap_or_default(),
            );
            tracing_appender::non_blocking(appender)
        },
    })
}
