//! Mock upstream RPC server for integration testing.
//!
//! Records every request it receives (count, raw body bytes, headers) and
//! answers with a configurable canned response, so tests can assert both
//! what reached the upstream and what was relayed back.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Mock upstream RPC server for testing.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    status: StatusCode,
    response_body: String,
}

/// Shared state for the mock server.
#[derive(Debug)]
struct MockState {
    status: StatusCode,
    response_body: String,
    request_count: RwLock<u32>,
    last_body: RwLock<Option<Bytes>>,
    last_headers: RwLock<Option<HeaderMap>>,
}

impl MockUpstream {
    /// Creates a mock that answers 200 with a fixed JSON-RPC result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            response_body: r#"{"id":1,"jsonrpc":"2.0","result":"0xupstream"}"#.to_string(),
        }
    }

    /// Overrides the canned response body.
    #[must_use]
    pub fn with_response_body(mut self, body: &str) -> Self {
        self.response_body = body.to_string();
        self
    }

    /// Overrides the response status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Starts the mock server and returns its address and handle.
    pub async fn start(self) -> (SocketAddr, MockUpstreamHandle) {
        let state = Arc::new(MockState {
            status: self.status,
            response_body: self.response_body,
            request_count: RwLock::new(0),
            last_body: RwLock::new(None),
            last_headers: RwLock::new(None),
        });

        let app = Router::new()
            .route("/", post(handle_rpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockUpstreamHandle {
                state,
                _handle: handle,
            },
        )
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running mock server.
pub struct MockUpstreamHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockUpstreamHandle {
    /// Number of requests received.
    pub async fn request_count(&self) -> u32 {
        *self.state.request_count.read().await
    }

    /// Raw body bytes of the last request received.
    pub async fn last_body(&self) -> Option<Bytes> {
        self.state.last_body.read().await.clone()
    }

    /// Headers of the last request received.
    pub async fn last_headers(&self) -> Option<HeaderMap> {
        self.state.last_headers.read().await.clone()
    }
}

async fn handle_rpc(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    {
        let mut count = state.request_count.write().await;
        *count += 1;
    }
    {
        let mut last = state.last_body.write().await;
        *last = Some(body);
    }
    {
        let mut last = state.last_headers.write().await;
        *last = Some(headers);
    }

    (
        state.status,
        [("content-type", "application/json")],
        state.response_body.clone(),
    )
}
