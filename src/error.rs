//! Error handling for the proxy.
//!
//! Defines every error the request path can surface and maps each one to an
//! HTTP status plus a JSON-RPC 2.0 error body. Two propagation rules hold
//! everywhere:
//!
//! - Parse and fingerprint failures never reach the upstream.
//! - Audit storage failures fail closed for intercepted calls: the client
//!   receives an error, never the synthesized success envelope.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{header, StatusCode};
use serde_json::json;
use thiserror::Error;

/// Convenience alias for fallible proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// All error types that can occur while handling a request.
///
/// Each variant maps to a specific JSON-RPC error code and HTTP status and
/// carries enough context for manual investigation of rejected calls.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProxyError {
    /// The request body could not be read to completion.
    #[error("failed to read request body: {reason}")]
    BodyRead {
        /// Description of the underlying I/O failure
        reason: String,
    },

    /// The request body exceeds the inspection buffer limit.
    #[error("request body exceeds {limit_bytes} bytes")]
    PayloadTooLarge {
        /// The configured buffer limit
        limit_bytes: usize,
    },

    /// The request body is not a JSON object.
    #[error("malformed payload: {details}")]
    MalformedPayload {
        /// Description of the parse failure
        details: String,
    },

    /// The call's params could not be fingerprinted.
    ///
    /// A transaction-submission call that cannot be fingerprinted is
    /// rejected rather than forwarded unaudited.
    #[error("failed to fingerprint params: {details}")]
    Fingerprint {
        /// Description of the hashing failure
        details: String,
    },

    /// The audit store is unreachable or denied the write.
    #[error("audit store unavailable: {reason}")]
    AuditUnavailable {
        /// Reason reported by the storage layer
        reason: String,
    },

    /// Cannot connect to the upstream RPC provider.
    #[error("cannot connect to upstream")]
    UpstreamConnectionFailed {
        /// The upstream URL that failed
        url: String,
        /// Reason for the connection failure
        reason: String,
    },

    /// The upstream RPC provider did not respond in time.
    #[error("upstream did not respond in time")]
    UpstreamTimeout {
        /// The upstream URL that timed out
        url: String,
        /// The timeout duration in seconds
        timeout_secs: u64,
    },

    /// The forwarded request could not be completed.
    #[error("upstream request failed: {message}")]
    UpstreamError {
        /// Description of the failure
        message: String,
    },
}

impl ProxyError {
    /// Maps the error to a JSON-RPC 2.0 error code.
    ///
    /// Standard codes for protocol errors, custom -32000 range for
    /// transport and audit failures.
    pub fn to_jsonrpc_code(&self) -> i32 {
        match self {
            Self::MalformedPayload { .. } => -32700,
            Self::UpstreamConnectionFailed { .. } => -32000,
            Self::UpstreamTimeout { .. } => -32001,
            Self::UpstreamError { .. } => -32002,
            Self::Fingerprint { .. } => -32010,
            Self::AuditUnavailable { .. } => -32011,
            Self::PayloadTooLarge { .. } => -32012,
            Self::BodyRead { .. } => -32603,
        }
    }

    /// Maps the error to the HTTP status of the rejection response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Fingerprint { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuditUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamConnectionFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Builds the JSON-RPC 2.0 error response for this error.
    ///
    /// The `id` is always null: rejections happen before the request id is
    /// interpreted, and the envelope shape must stay valid either way.
    pub fn to_response(&self) -> Response<Body> {
        let body = json!({
            "id": null,
            "jsonrpc": "2.0",
            "error": {
                "code": self.to_jsonrpc_code(),
                "message": self.to_string(),
            }
        });

        Response::builder()
            .status(self.status_code())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| {
                Response::new(Body::from(
                    r#"{"id":null,"jsonrpc":"2.0","error":{"code":-32603,"message":"internal error"}}"#,
                ))
            })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}
