//! Request routing: rehydrate, classify, then record or forward.
//!
//! One handler invocation per inbound request. The handler owns the request
//! lifecycle end to end: buffer the body, parse it, classify the call, then
//! either audit it and synthesize the intercept envelope or delegate to the
//! forwarder. The forwarder and audit store are constructed once at startup
//! and injected through shared state.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::{header, HeaderValue, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::audit::{AuditRecord, AuditStore, AuditStoreError};
use crate::classify::{classify, CallKind};
use crate::error::ProxyError;
use crate::fingerprint::fingerprint;
use crate::forward::Forwarder;
use crate::jsonrpc::{RpcCall, INTERCEPT_ENVELOPE, OPERATOR_VERSION, OPERATOR_VERSION_HEADER};

/// Upper bound on buffered request bodies. Transaction submissions are
/// small; anything larger is not RPC traffic we want to inspect.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared per-process state injected into every handler invocation.
#[derive(Clone)]
pub struct AppState {
    /// Reverse-proxy client for passthrough traffic.
    pub forwarder: Arc<Forwarder>,
    /// Write-once audit store for intercepted traffic.
    pub audit_store: Arc<dyn AuditStore>,
}

/// Builds the inbound HTTP surface: `POST /` for RPC traffic, `GET /debug`
/// for a static diagnostic probe.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/debug", get(handle_debug))
        .with_state(state)
}

/// Static diagnostic endpoint; no side effects.
async fn handle_debug() -> &'static str {
    "debugging"
}

/// Handles one JSON-RPC call: rehydrate → classify → record or forward.
async fn handle_rpc(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    // Buffer the body so it can be inspected and still relayed byte-for-byte.
    let raw = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(raw) => raw,
        Err(e) if is_length_limit_error(&e) => {
            error!(limit_bytes = MAX_BODY_BYTES, "Rejected oversized request body");
            return ProxyError::PayloadTooLarge {
                limit_bytes: MAX_BODY_BYTES,
            }
            .into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return ProxyError::BodyRead {
                reason: e.to_string(),
            }
            .into_response();
        }
    };

    let call = match RpcCall::parse(raw) {
        Ok(call) => call,
        Err(e) => {
            // Malformed traffic is rejected, never forwarded.
            error!(error = %e, "Rejected unparseable request body");
            return e.into_response();
        }
    };

    match classify(call.method()) {
        CallKind::Intercept => intercept(&state, &call).await,
        CallKind::Passthrough => {
            debug!(method = call.method().unwrap_or("<missing>"), "Passthrough");
            match state.forwarder.relay(&parts.headers, call.raw().clone()).await {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        method = call.method().unwrap_or("<missing>"),
                        error = %e,
                        "Upstream relay failed"
                    );
                    e.into_response()
                }
            }
        }
    }
}

/// True if the body read failed because the length limit was hit, as
/// opposed to an I/O failure mid-transfer.
fn is_length_limit_error(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Audits an intercepted transaction-submission call and synthesizes the
/// fixed success envelope.
///
/// `AlreadyExists` from the store is idempotent success: the params were
/// audited on a previous submission and the client response is identical
/// either way. A storage failure fails closed - an unaudited submission
/// must never look accepted.
async fn intercept(state: &AppState, call: &RpcCall) -> Response {
    let method = call.method().unwrap_or("<missing>");

    let fp = match fingerprint(call.params()) {
        Ok(fp) => fp,
        Err(e) => {
            error!(method, error = %e, "Rejected unfingerprintable submission");
            return e.into_response();
        }
    };

    let record = AuditRecord::intercepted(fp.clone(), call.payload().clone());
    match state.audit_store.create(&record).await {
        Ok(()) => {
            info!(method, fingerprint = %fp, "Audit record created");
        }
        Err(AuditStoreError::AlreadyExists { .. }) => {
            debug!(method, fingerprint = %fp, "Submission already audited");
        }
        Err(AuditStoreError::Storage { reason }) => {
            error!(method, fingerprint = %fp, reason = %reason, "Audit write failed, rejecting call");
            return ProxyError::AuditUnavailable { reason }.into_response();
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(OPERATOR_VERSION_HEADER, HeaderValue::from_static(OPERATOR_VERSION))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(Bytes::from_static(INTERCEPT_ENVELOPE.as_bytes())))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
