//! Write-once audit recording of intercepted calls.
//!
//! The audit store is the only cross-request coordination point in the
//! proxy. Uniqueness of records is enforced by the store's own conditional
//! create primitive (create-if-absent), not by in-process locks: the DashMap
//! entry API in-process, a conditional PUT against the document store over
//! HTTP. A duplicate write fails with [`AuditStoreError::AlreadyExists`] and
//! the record is never overwritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;

/// Why a call was diverted into the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Transaction-submission call matched the intercept allow-list.
    Intercepted,
}

/// One persisted audit entry.
///
/// Created exactly once per unique params fingerprint; never mutated and
/// never deleted by this system (retention is an external concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Primary key, derived from the call's `params`.
    pub fingerprint: Fingerprint,
    /// The full original structured request payload.
    pub payload: Value,
    /// Classification tag.
    pub classification: Classification,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds a record for an intercepted call, stamped with the current time.
    pub fn intercepted(fingerprint: Fingerprint, payload: Value) -> Self {
        Self {
            fingerprint,
            payload,
            classification: Classification::Intercepted,
            created_at: Utc::now(),
        }
    }
}

/// Errors reported by an audit store write.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuditStoreError {
    /// A record with this fingerprint already exists.
    ///
    /// Not an error from the router's perspective - the call was already
    /// audited and the write must not be retried.
    #[error("audit record '{fingerprint}' already exists")]
    AlreadyExists {
        /// The colliding fingerprint
        fingerprint: Fingerprint,
    },

    /// The storage layer is unreachable or denied the write.
    #[error("audit storage failure: {reason}")]
    Storage {
        /// Reason for the failure
        reason: String,
    },
}

/// Write-once persistence for audit records.
///
/// Implementations must provide atomic create-if-absent semantics: under
/// concurrent writes of the same fingerprint exactly one caller observes
/// `Ok(())` and every other observes `AlreadyExists`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persists a record, failing if its fingerprint is already present.
    async fn create(&self, record: &AuditRecord) -> Result<(), AuditStoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory audit store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: DashMap<Fingerprint, AuditRecord>,
}

impl MemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up a record by fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<AuditRecord> {
        self.records.get(fingerprint).map(|r| r.value().clone())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn create(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        // The entry API makes the existence check and insert one atomic
        // operation under DashMap's shard lock.
        match self.records.entry(record.fingerprint.clone()) {
            dashmap::Entry::Occupied(_) => Err(AuditStoreError::AlreadyExists {
                fingerprint: record.fingerprint.clone(),
            }),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }
}

// ============================================================================
// Document-store-backed store
// ============================================================================

/// Configuration for the HTTP document store client.
#[derive(Debug, Clone)]
pub struct AuditStoreConfig {
    /// Base URL of the document store (e.g. "http://audit-store:5984").
    pub base_url: String,
    /// Collection holding audit records.
    pub collection: String,
    /// Per-write request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for AuditStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            collection: "txs".to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl AuditStoreConfig {
    /// Creates a config with the given base URL and default settings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Audit store backed by an external document store over HTTP.
///
/// The client is built once at startup and injected into the router by
/// reference; writes scope-acquire a pooled connection rather than
/// reconnecting per call. Create-if-absent is expressed as a conditional
/// PUT (`If-None-Match: *`): the store answers 409/412 when the document
/// already exists.
#[derive(Clone)]
pub struct HttpAuditStore {
    client: reqwest::Client,
    config: AuditStoreConfig,
}

impl HttpAuditStore {
    /// Builds the store client.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError::Storage`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: AuditStoreConfig) -> Result<Self, AuditStoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| AuditStoreError::Storage {
                reason: format!("failed to build store client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    fn document_url(&self, fingerprint: &Fingerprint) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.collection,
            fingerprint
        )
    }
}

#[async_trait]
impl AuditStore for HttpAuditStore {
    async fn create(&self, record: &AuditRecord) -> Result<(), AuditStoreError> {
        let url = self.document_url(&record.fingerprint);

        let response = self
            .client
            .put(&url)
            .header("If-None-Match", "*")
            .json(record)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    fingerprint = %record.fingerprint,
                    error = %e,
                    "Audit store write failed"
                );
                AuditStoreError::Storage {
                    reason: e.to_string(),
                }
            })?;

        match response.status() {
            s if s.is_success() => {
                debug!(fingerprint = %record.fingerprint, "Audit record created");
                Ok(())
            }
            reqwest::StatusCode::CONFLICT | reqwest::StatusCode::PRECONDITION_FAILED => {
                Err(AuditStoreError::AlreadyExists {
                    fingerprint: record.fingerprint.clone(),
                })
            }
            s => {
                warn!(
                    fingerprint = %record.fingerprint,
                    status = %s,
                    "Audit store rejected write"
                );
                Err(AuditStoreError::Storage {
                    reason: format!("store returned HTTP {s}"),
                })
            }
        }
    }
}
