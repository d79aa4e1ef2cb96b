// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request/response envelopes and the protocol codec (component C2).
//!
//! `Protocol` serializes/deserializes envelopes to frame payloads. Two
//! implementations are interchangeable at construction time — a
//! text-structured (`serde_json`) codec and a binary schema (`bincode`)
//! codec — chosen once per process and shared by client and server; it is
//! never negotiated on the wire. This is orthogonal to the per-call payload
//! `encode-type` in `meta`, which governs the user `body` bytes only (see
//! `crate::encoder`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::meta::Meta;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub request_id: i32,
    pub method: String,
    pub body: Vec<u8>,
    pub meta: Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub request_id: i32,
    pub body: Vec<u8>,
    pub meta: Meta,
    pub code: i32,
    pub code_status: String,
}

impl Response {
    /// Build a response to `request`, mapping `result` per spec §4.5: on
    /// `Ok`, `code=200`/`code_status="ok"`; on `Err`, the framework error's
    /// own code/message.
    pub fn from_result(
        request: &Request,
        result: Result<Vec<u8>, crate::error::RpcError>,
    ) -> Self {
        match result {
            Ok(body) => Self {
                request_id: request.request_id,
                body,
                meta: request.meta.clone(),
                code: crate::error::CODE_OK,
                code_status: "ok".to_string(),
            },
            Err(err) => Self {
                request_id: request.request_id,
                body: Vec::new(),
                meta: request.meta.clone(),
                code: err.code,
                code_status: err.message,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode codec error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Serializes/deserializes envelopes to frame payloads. Implementations
/// must be interchangeable: both peers must agree on the same `Protocol`
/// impl out of band (spec §4.2).
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode_request(&self, req: &Request) -> Result<Vec<u8>, CodecError>;
    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError>;
    fn encode_response(&self, resp: &Response) -> Result<Vec<u8>, CodecError>;
    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError>;
}

/// Text-structured codec backed by `serde_json`.
#[derive(Debug, Default)]
pub struct JsonProtocol;

impl Protocol for JsonProtocol {
    fn name(&self) -> &'static str {
        "json-protocol"
    }

    fn encode_request(&self, req: &Request) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(req)?)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_response(&self, resp: &Response) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(resp)?)
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Binary schema codec backed by `bincode`.
#[derive(Debug, Default)]
pub struct BincodeProtocol;

impl Protocol for BincodeProtocol {
    fn name(&self) -> &'static str {
        "bincode-protocol"
    }

    fn encode_request(&self, req: &Request) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(req)?)
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn encode_response(&self, resp: &Response) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(resp)?)
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

pub fn default_protocol() -> Arc<dyn Protocol> {
    Arc::new(JsonProtocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        let mut meta = Meta::new();
        meta.set("encode-type", "json");
        Request {
            request_id: 7,
            method: "Echo".to_string(),
            body: b"{\"x\":1}".to_vec(),
            meta,
        }
    }

    #[test]
    fn json_request_round_trips() {
        let proto = JsonProtocol;
        let req = sample_request();
        let bytes = proto.encode_request(&req).unwrap();
        let decoded = proto.decode_request(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn bincode_response_round_trips() {
        let proto = BincodeProtocol;
        let req = sample_request();
        let resp = Response::from_result(&req, Ok(b"pong".to_vec()));
        let bytes = proto.encode_response(&resp).unwrap();
        let decoded = proto.decode_response(&bytes).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let req = sample_request();
        let resp = Response::from_result(&req, Err(crate::error::RpcError::request_full()));
        assert_eq!(resp.code, 502);
        assert_eq!(resp.code_status, "request full");
        assert_eq!(resp.request_id, req.request_id);
    }
}
