//! JSON-RPC call parsing with raw-byte retention.
//!
//! An inbound body is read once into [`bytes::Bytes`] and parsed into a
//! [`serde_json::Value`]. Both live in [`RpcCall`] so later stages can pick
//! the form they need: classification and fingerprinting read the parsed
//! value, the forwarder relays the original bytes. Re-serializing the parsed
//! value would risk reordering fields or changing numeric precision, so the
//! raw bytes are the only thing that ever goes to the upstream.

use bytes::Bytes;
use serde_json::Value;

use crate::error::ProxyError;

/// The fixed response body for intercepted transaction-submission calls.
///
/// Sent for both first-seen and already-recorded submissions - the client
/// never learns about dedup state.
pub const INTERCEPT_ENVELOPE: &str = r#"{"id":1,"jsonrpc":"2.0","result":""}"#;

/// Version header attached to forwarded requests and synthesized responses.
pub const OPERATOR_VERSION_HEADER: &str = "X-Choice-Operator-Version";

/// Value of [`OPERATOR_VERSION_HEADER`].
pub const OPERATOR_VERSION: &str = "0.01";

/// Semantic view of one inbound JSON-RPC call.
///
/// Ephemeral - lives for the duration of a single HTTP request. The `id`
/// and `jsonrpc` fields are preserved in both representations but never
/// interpreted here.
#[derive(Debug, Clone)]
pub struct RpcCall {
    raw: Bytes,
    payload: Value,
}

impl RpcCall {
    /// Parses a fully buffered request body into a call.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::MalformedPayload`] if the body is not valid
    /// JSON or not a JSON object.
    pub fn parse(raw: Bytes) -> Result<Self, ProxyError> {
        let payload: Value =
            serde_json::from_slice(&raw).map_err(|e| ProxyError::MalformedPayload {
                details: e.to_string(),
            })?;

        if !payload.is_object() {
            return Err(ProxyError::MalformedPayload {
                details: "request body must be a JSON object".to_string(),
            });
        }

        Ok(Self { raw, payload })
    }

    /// The original body bytes, exactly as received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The parsed payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The `method` field, if present and a string.
    pub fn method(&self) -> Option<&str> {
        self.payload.get("method").and_then(Value::as_str)
    }

    /// The `params` field. Absent params hash and audit as JSON null,
    /// matching how an untyped payload treats a missing key.
    pub fn params(&self) -> &Value {
        self.payload.get("params").unwrap_or(&Value::Null)
    }
}
