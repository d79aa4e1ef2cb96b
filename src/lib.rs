// SPDX-License-Identifier: AGPL-3.0-or-later

//! A lightweight TCP RPC framework: length-prefixed framing, a pluggable
//! protocol codec, a server dispatch pipeline with admission control, and a
//! client with connection pooling, routing, and request/reply correlation.

pub mod app;
pub mod cfg;
pub mod client;
pub mod discovery;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod meta;
pub mod protocol;
pub mod register;
pub mod server;

pub use client::Client;
pub use error::RpcError;
pub use meta::Meta;
pub use protocol::{Request, Response};
pub use server::TcpServer;
