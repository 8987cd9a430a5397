//! Upstream forwarding with connection pooling.
//!
//! Passthrough traffic is relayed to a single configured upstream RPC
//! provider. The client keeps pooled persistent connections, rewrites the
//! target host/scheme to the upstream's, tags forwarded requests with the
//! operator version header, and streams the upstream response back without
//! buffering it. There is no retry anywhere: upstream failures propagate as
//! the upstream's own status or as a connection/timeout error.

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::ProxyError;
use crate::jsonrpc::{OPERATOR_VERSION, OPERATOR_VERSION_HEADER};

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the upstream RPC provider (e.g. "https://eth-mainnet.example.com/v2/key").
    pub base_url: String,
    /// Request timeout (includes connection + response headers).
    pub timeout: Duration,
    /// Connection timeout (TCP + TLS handshake).
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl UpstreamConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `UPSTREAM_URL` (required): base URL of the upstream RPC provider
    /// - `UPSTREAM_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `UPSTREAM_CONNECT_TIMEOUT_SECS` (default: 5)
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UpstreamConnectionFailed`] if `UPSTREAM_URL`
    /// is not set.
    pub fn from_env() -> Result<Self, ProxyError> {
        let base_url =
            std::env::var("UPSTREAM_URL").map_err(|_| ProxyError::UpstreamConnectionFailed {
                url: String::new(),
                reason: "UPSTREAM_URL environment variable is required".to_string(),
            })?;

        Ok(Self::from_env_with_base_url(base_url))
    }

    /// Builds a config for an already-known base URL (e.g. a CLI flag),
    /// still honoring the timeout environment knobs. The timeout knobs
    /// apply however the URL was supplied.
    pub fn from_env_with_base_url(base_url: impl Into<String>) -> Self {
        let timeout_secs: u64 = std::env::var("UPSTREAM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let connect_timeout_secs: u64 = std::env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            ..Default::default()
        }
    }

    /// Creates a config with the given base URL and default settings.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Reverse-proxy client for the single configured upstream.
///
/// `Clone` is cheap; the underlying reqwest client pools connections
/// internally and is shared across tasks.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl Forwarder {
    /// Builds the forwarder and its pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UpstreamConnectionFailed`] if the client
    /// cannot be constructed.
    pub fn new(config: UpstreamConfig) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProxyError::UpstreamConnectionFailed {
                url: config.base_url.clone(),
                reason: format!("failed to build upstream client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    /// The configured upstream base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Relays one request to the upstream and streams back its response.
    ///
    /// The original body bytes are sent untouched. Inbound headers are
    /// copied minus hop-by-hop headers and `Host` (the client rewrites the
    /// target host/scheme to the upstream's), and the operator version
    /// header is added. The upstream's status, headers, and body are
    /// relayed verbatim - an upstream error status is the caller's answer,
    /// not ours to interpret.
    pub async fn relay(
        &self,
        headers: &HeaderMap,
        raw_body: Bytes,
    ) -> Result<Response, ProxyError> {
        let mut outbound = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers {
            if is_hop_by_hop_header(name.as_str()) || *name == header::HOST {
                continue;
            }
            outbound.insert(name.clone(), value.clone());
        }
        outbound.insert(
            OPERATOR_VERSION_HEADER,
            HeaderValue::from_static(OPERATOR_VERSION),
        );

        debug!(upstream = %self.config.base_url, "Forwarding request to upstream");

        let upstream_response = self
            .client
            .post(&self.config.base_url)
            .headers(outbound)
            .body(raw_body)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = upstream_response.status();
        if !status.is_success() {
            warn!(status = %status, "Upstream returned error status, relaying verbatim");
        }

        let mut builder = Response::builder().status(status);
        if let Some(response_headers) = builder.headers_mut() {
            for (name, value) in upstream_response.headers() {
                if is_hop_by_hop_header(name.as_str()) {
                    continue;
                }
                response_headers.insert(name.clone(), value.clone());
            }
        }

        // Stream the upstream body through without buffering it.
        let body = Body::from_stream(upstream_response.bytes_stream());
        builder.body(body).map_err(|e| {
            error!(error = %e, "Failed to build relayed response");
            ProxyError::UpstreamError {
                message: format!("failed to build relayed response: {e}"),
            }
        })
    }

    /// Classifies a reqwest failure into a [`ProxyError`].
    fn classify_error(&self, error: reqwest::Error) -> ProxyError {
        if error.is_timeout() {
            warn!(
                url = %self.config.base_url,
                timeout_secs = self.config.timeout.as_secs(),
                "Upstream request timed out"
            );
            ProxyError::UpstreamTimeout {
                url: self.config.base_url.clone(),
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if error.is_connect() {
            warn!(url = %self.config.base_url, "Failed to connect to upstream");
            ProxyError::UpstreamConnectionFailed {
                url: self.config.base_url.clone(),
                reason: error.to_string(),
            }
        } else {
            error!(error = %error, "Upstream request failed");
            ProxyError::UpstreamError {
                message: error.to_string(),
            }
        }
    }
}

/// Hop-by-hop headers that must not be forwarded in either direction.
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = UpstreamConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_max_idle_per_host, 32);
        assert!(config.base_url.is_empty());
    }

    #[test]
    fn test_config_with_base_url() {
        let config = UpstreamConfig::with_base_url("http://localhost:8545");
        assert_eq!(config.base_url, "http://localhost:8545");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_forwarder_creation() {
        let config = UpstreamConfig::with_base_url("http://localhost:8545");
        assert!(Forwarder::new(config).is_ok());
    }

    #[test]
    fn test_hop_by_hop_headers_detected() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("transfer-encoding"));
        assert!(!is_hop_by_hop_header("content-type"));
        assert!(!is_hop_by_hop_header("x-choice-operator-version"));
    }

    #[test]
    #[serial]
    fn test_from_env_with_base_url_honors_timeout_knobs() {
        // A URL supplied via CLI flag must not silently reset the timeout
        // knobs back to their defaults.
        std::env::set_var("UPSTREAM_REQUEST_TIMEOUT_SECS", "45");
        std::env::set_var("UPSTREAM_CONNECT_TIMEOUT_SECS", "9");

        let config = UpstreamConfig::from_env_with_base_url("http://cli-flag:8545");
        assert_eq!(config.base_url, "http://cli-flag:8545");
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.connect_timeout, Duration::from_secs(9));

        std::env::remove_var("UPSTREAM_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("UPSTREAM_CONNECT_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn test_config_from_env_missing_upstream() {
        std::env::remove_var("UPSTREAM_URL");
        let result = UpstreamConfig::from_env();
        assert!(matches!(
            result,
            Err(ProxyError::UpstreamConnectionFailed { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_upstream() {
        std::env::set_var("UPSTREAM_URL", "http://test:8545");
        std::env::set_var("UPSTREAM_REQUEST_TIMEOUT_SECS", "60");
        std::env::set_var("UPSTREAM_CONNECT_TIMEOUT_SECS", "10");

        let config = UpstreamConfig::from_env().expect("should parse config");
        assert_eq!(config.base_url, "http://test:8545");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        std::env::remove_var("UPSTREAM_URL");
        std::env::remove_var("UPSTREAM_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("UPSTREAM_CONNECT_TIMEOUT_SECS");
    }
}
