//! Choice Operator - intercepting reverse proxy for blockchain JSON-RPC
//! traffic.
//!
//! Listens on a single port, diverts transaction-submission calls into a
//! write-once audit store, and reverse-proxies everything else to one
//! configured upstream RPC provider.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use choice_operator::audit::{
    AuditStore, AuditStoreConfig, HttpAuditStore, MemoryAuditStore,
};
use choice_operator::forward::{Forwarder, UpstreamConfig};
use choice_operator::router::{app, AppState};

/// Configuration for the proxy server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Port to listen on (default: 8080, or PORT env var)
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Bind address (default: 0.0.0.0)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Base URL of the upstream JSON-RPC provider
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Base URL of the audit document store. When unset, records are kept
    /// in an in-process store (single-process mode).
    #[arg(long, env = "AUDIT_STORE_URL")]
    audit_store_url: Option<String>,

    /// Collection name for audit records
    #[arg(long, env = "AUDIT_COLLECTION", default_value = "txs")]
    audit_collection: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    // Upstream config: the clap arg resolves the URL (flag or UPSTREAM_URL
    // env); the timeout knobs come from the environment either way.
    let upstream_config = match &config.upstream_url {
        Some(url) => UpstreamConfig::from_env_with_base_url(url.clone()),
        None => UpstreamConfig::from_env()?,
    };

    let forwarder = Arc::new(Forwarder::new(upstream_config)?);

    // The audit store client is built once here and injected by reference;
    // individual writes borrow pooled connections rather than reconnecting.
    let audit_store: Arc<dyn AuditStore> = match &config.audit_store_url {
        Some(url) => {
            let store_config = AuditStoreConfig {
                base_url: url.clone(),
                collection: config.audit_collection.clone(),
                ..Default::default()
            };
            Arc::new(HttpAuditStore::new(store_config)?)
        }
        None => {
            info!("AUDIT_STORE_URL not set, using in-process audit store");
            Arc::new(MemoryAuditStore::new())
        }
    };

    let state = AppState {
        forwarder: Arc::clone(&forwarder),
        audit_store,
    };

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(
        bind = %config.bind,
        port = config.port,
        upstream = forwarder.base_url(),
        audit_store = config.audit_store_url.as_deref().unwrap_or("<in-process>"),
        "Choice Operator starting"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
