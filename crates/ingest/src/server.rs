use std::net::SocketAddr;
use std::sync::Arc;

use tracelink_core::error::{Result, TracelinkError};
use tracelink_engine::AggregationEngine;

use crate::http;

pub async fn run_http_server(engine: Arc<AggregationEngine>, addr: SocketAddr) -> Result<()> {
    let router = http::router(engine);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TracelinkError::Ingest(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "ingest http server listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| TracelinkError::Ingest(format!("HTTP server failed: {e}")))
}
