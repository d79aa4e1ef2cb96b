//! This module handles configuration, command-line path resolution, and
//! logging.

// SPDX-License-Identifier: AGPL-3.0-or-later

/// Config file path resolution.
pub mod cli;
/// Configuration file parsing and management.
pub mod config;
/// Logger initialization.
pub mod logger;
