// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session wire protocol.
//!
//! Every WebSocket text frame carries a JSON envelope tagged with an
//! executor name. Inbound envelopes route a client payload to one executor;
//! outbound envelopes fan an executor payload out to every attached
//! session. Raw container bytes travel base64-encoded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stream tag on container output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Wire tag used by the container backend (1 = stdout, 2 = stderr).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }

    /// JSON key carrying this stream's bytes in an `output` payload.
    pub fn key(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Client → server envelope, routed by executor name.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub executor: String,
    pub message: Value,
}

/// Server → client envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    pub executor: String,
    pub message: Value,
}

/// `{type: "output", stdout|stderr: base64}` — one chunk of container output.
pub fn output(stream: StreamKind, data: &[u8]) -> Value {
    let mut payload = serde_json::Map::new();
    payload.insert("type".to_string(), Value::String("output".to_string()));
    payload.insert(stream.key().to_string(), Value::String(BASE64.encode(data)));
    Value::Object(payload)
}

/// Emitted when a one-shot run begins.
pub fn started() -> Value {
    json!({ "type": "started" })
}

/// Emitted when a one-shot run completes cleanly.
pub fn finished() -> Value {
    json!({ "type": "finished" })
}

/// Emitted when a one-shot run fails; the detail travels base64-encoded.
pub fn errored(detail: &str) -> Value {
    json!({ "type": "errored", "message": BASE64.encode(detail) })
}

/// Decode a base64 payload field (e.g. `stdin` bytes).
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
