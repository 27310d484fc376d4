use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{get, post};
use chrono::Utc;
use opentelemetry::trace::{Span, SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue, global};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracelink_engine::AggregationEngine;
use tracelink_engine::context::{descriptor_from_span_context, remote_context_from_headers};
use tracing::Level;

#[derive(Clone)]
pub struct HttpIngestState {
    pub engine: Arc<AggregationEngine>,
}

pub fn router(engine: Arc<AggregationEngine>) -> Router {
    let state = HttpIngestState { engine };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route("/incoming", post(handle_incoming))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// One validated inbound request becomes one recorded event. The caller
/// always gets a 200; nothing on the batching or persistence side may
/// surface here as a request failure.
async fn handle_incoming(
    State(state): State<HttpIngestState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    let remote = headers
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .and_then(|tp| {
            let tracestate = headers.get("tracestate").and_then(|v| v.to_str().ok());
            remote_context_from_headers(tp, tracestate)
        });

    let correlation_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let parent_cx = match &remote {
        Some(ctx) => Context::current().with_remote_span_context(ctx.clone()),
        None => Context::current(),
    };

    let tracer = global::tracer("tracelink");
    let mut span = tracer
        .span_builder("incoming-request")
        .with_kind(SpanKind::Server)
        .start_with_context(&tracer, &parent_cx);
    span.set_attribute(KeyValue::new("http.method", "POST"));
    span.set_attribute(KeyValue::new("http.route", "/incoming"));
    span.set_attribute(KeyValue::new("request.timestamp", Utc::now().to_rfc3339()));

    // Record the server span's identity; fall back to the remote context
    // when the installed tracer yields an invalid one.
    let descriptor = descriptor_from_span_context(span.span_context())
        .or_else(|| remote.as_ref().and_then(descriptor_from_span_context));

    match descriptor {
        Some(descriptor) => {
            tracing::info!(trace_id = %descriptor.trace_id, "incoming request accepted");
            state.engine.record(descriptor, correlation_id);
        }
        None => {
            tracing::warn!("no usable trace context on incoming request, event dropped");
        }
    }
    span.end();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "received",
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}
