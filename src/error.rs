// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level error taxonomy (component C5).
//!
//! `RpcError` is the universal `{code, message}` shape that round-trips on
//! the wire via `Response::code`/`Response::code_status`. Framework-defined
//! errors use the status codes from spec §6; user handlers may return any
//! `anyhow`-compatible error, which gets wrapped as `{502, text}`.

use thiserror::Error;

pub const CODE_OK: i32 = 200;
pub const CODE_REQUEST_TIMEOUT: i32 = 405;
pub const CODE_ENCODER_NOT_FOUND: i32 = 404;
pub const CODE_REQUEST_FULL: i32 = 502;

/// A structured RPC error. Round-trips across the wire via `code`/`message`.
#[derive(Debug, Clone, Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn request_timeout() -> Self {
        Self::new(CODE_REQUEST_TIMEOUT, "request timeout")
    }

    pub fn request_full() -> Self {
        Self::new(CODE_REQUEST_FULL, "request full")
    }

    pub fn encoder_not_found() -> Self {
        Self::new(CODE_ENCODER_NOT_FOUND, "encoder not found")
    }

    /// Client-local: never put on the wire (spec §7).
    pub fn connect_not_found() -> Self {
        Self::new(0, "connect not found")
    }

    pub fn is_success(&self) -> bool {
        self.code == 0 || self.code == CODE_OK
    }

    /// Wrap an arbitrary error as a generic 502, matching the original's
    /// `ParseError` fallback for non-framework errors.
    pub fn wrap(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc_err) => rpc_err,
            Err(other) => Self::new(CODE_REQUEST_FULL, other.to_string()),
        }
    }
}
