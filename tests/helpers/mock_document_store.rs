//! Mock audit document store for integration testing.
//!
//! Accepts conditional PUTs of audit records and answers with a
//! configurable status, recording what it received so tests can assert the
//! store client's wire behavior (path, headers, write count).

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::put,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Mock document store for testing.
#[derive(Debug, Clone)]
pub struct MockDocumentStore {
    status: StatusCode,
}

/// Shared state for the mock server.
#[derive(Debug)]
struct MockState {
    status: StatusCode,
    put_count: RwLock<u32>,
    last_path: RwLock<Option<String>>,
    last_headers: RwLock<Option<HeaderMap>>,
    last_body: RwLock<Option<Bytes>>,
}

impl MockDocumentStore {
    /// Creates a mock that answers every PUT with 201 Created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::CREATED,
        }
    }

    /// Overrides the response status (e.g. 409 for an existing document).
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Starts the mock server and returns its address and handle.
    pub async fn start(self) -> (SocketAddr, MockDocumentStoreHandle) {
        let state = Arc::new(MockState {
            status: self.status,
            put_count: RwLock::new(0),
            last_path: RwLock::new(None),
            last_headers: RwLock::new(None),
            last_body: RwLock::new(None),
        });

        let app = Router::new()
            .route("/{collection}/{id}", put(handle_put))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockDocumentStoreHandle {
                state,
                _handle: handle,
            },
        )
    }
}

impl Default for MockDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running mock server.
pub struct MockDocumentStoreHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockDocumentStoreHandle {
    /// Number of PUTs received.
    pub async fn put_count(&self) -> u32 {
        *self.state.put_count.read().await
    }

    /// Path of the last PUT received, e.g. "/txs/<fingerprint>".
    pub async fn last_path(&self) -> Option<String> {
        self.state.last_path.read().await.clone()
    }

    /// Headers of the last PUT received.
    pub async fn last_headers(&self) -> Option<HeaderMap> {
        self.state.last_headers.read().await.clone()
    }

    /// Raw body of the last PUT received.
    pub async fn last_body(&self) -> Option<Bytes> {
        self.state.last_body.read().await.clone()
    }
}

async fn handle_put(
    State(state): State<Arc<MockState>>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    {
        let mut count = state.put_count.write().await;
        *count += 1;
    }
    {
        let mut last = state.last_path.write().await;
        *last = Some(format!("/{collection}/{id}"));
    }
    {
        let mut last = state.last_headers.write().await;
        *last = Some(headers);
    }
    {
        let mut last = state.last_body.write().await;
        *last = Some(body);
    }

    state.status
}
