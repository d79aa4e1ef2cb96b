//! The async TCP server engine (component C6).

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod tcp;

pub use tcp::{Dispatcher, InvokeCtx, ServerOptions, TcpServer};
