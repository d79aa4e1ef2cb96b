// SPDX-License-Identifier: AGPL-3.0-or-later

//! Payload encoder registry (component C3).
//!
//! Maps an encoding name (the `meta["encode-type"]` value) to an `Encoder`
//! that (de)serializes the user-level `body` bytes. This is orthogonal to
//! the envelope `Protocol` in `crate::protocol`. A process-wide default
//! registry (analogous to the original's package-level `encMap`) is
//! populated at first use with `"json"` and `"bincode"`; `Client`/`TcpServer`
//! constructors still take an explicit `Arc<EncoderRegistry>` so tests can
//! build isolated, non-shared instances for parallel runs (spec §9).
//!
//! `serde_json::Value` stands in for the original's `interface{}`: it is the
//! one dynamically-typed value every `serde`-derived request/response type
//! can convert to and from, so `Encoder` stays object-safe without pulling
//! in reflection.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use once_cell::sync::Lazy;
use serde_json::Value;

pub const JSON: &str = "json";
pub const BINCODE: &str = "bincode";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode codec error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// A named payload codec for the opaque `body` bytes of a request/response.
pub trait Encoder: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, EncodeError>;
}

#[derive(Debug, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn name(&self) -> &'static str {
        JSON
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, EncodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Default)]
pub struct BincodeEncoder;

impl Encoder for BincodeEncoder {
    fn name(&self) -> &'static str {
        BINCODE
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, EncodeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Mapping from encoder name to encoder object. Registration is
/// last-write-wins, matching the original's `encMap`.
#[derive(Debug, Default, Clone)]
pub struct EncoderRegistry {
    encoders: HashMap<&'static str, Arc<dyn Encoder>>,
}

/// The process-wide default registry, lazily populated with `"json"` and
/// `"bincode"` on first use — the direct analogue of the original's
/// package-level `var encMap` initialized in `init()`.
static GLOBAL: Lazy<RwLock<EncoderRegistry>> = Lazy::new(|| RwLock::new(EncoderRegistry::with_defaults()));

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(JsonEncoder));
        reg.register(Arc::new(BincodeEncoder));
        reg
    }

    pub fn register(&mut self, encoder: Arc<dyn Encoder>) {
        self.encoders.insert(encoder.name(), encoder);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Encoder>> {
        self.encoders.get(name).cloned()
    }

    /// Registers `encoder` into the process-wide default registry, visible
    /// to every subsequent `EncoderRegistry::global()` snapshot.
    pub fn register_global(encoder: Arc<dyn Encoder>) {
        GLOBAL.write().expect("encoder registry lock poisoned").register(encoder);
    }

    /// A snapshot of the process-wide default registry. `Client` uses this
    /// unless a caller builds and passes an isolated instance directly (as
    /// `TcpServer::new` callers, including tests, do).
    pub fn global() -> EncoderRegistry {
        GLOBAL.read().expect("encoder registry lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_json_and_bincode() {
        let reg = EncoderRegistry::with_defaults();
        assert!(reg.get(JSON).is_some());
        assert!(reg.get(BINCODE).is_some());
        assert!(reg.get("cbor").is_none());
    }

    #[test]
    fn last_write_wins_on_same_name() {
        let mut reg = EncoderRegistry::new();
        reg.register(Arc::new(JsonEncoder));
        reg.register(Arc::new(JsonEncoder));
        assert_eq!(reg.encoders.len(), 1);
    }

    #[test]
    fn json_encoder_round_trips_value() {
        let enc = JsonEncoder;
        let value = serde_json::json!({"x": 1});
        let bytes = enc.encode(&value).unwrap();
        assert_eq!(enc.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn global_registry_has_defaults_and_accepts_registrations() {
        assert!(EncoderRegistry::global().get(JSON).is_some());
        assert!(EncoderRegistry::global().get(BINCODE).is_some());

        #[derive(Debug, Default)]
        struct NopEncoder;
        impl Encoder for NopEncoder {
            fn name(&self) -> &'static str {
                "nop-test-encoder"
            }

            fn encode(&self, _value: &Value) -> Result<Vec<u8>, EncodeError> {
                Ok(Vec::new())
            }

            fn decode(&self, _bytes: &[u8]) -> Result<Value, EncodeError> {
                Ok(Value::Null)
            }
        }

        EncoderRegistry::register_global(Arc::new(NopEncoder));
        assert!(EncoderRegistry::global().get("nop-test-encoder").is_some());
    }
}
