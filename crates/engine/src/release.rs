use std::sync::Arc;

use chrono::Utc;
use opentelemetry::trace::{Link, Span, SpanKind, Tracer};
use opentelemetry::{KeyValue, global};
use tracelink_core::model::{BatchRecord, TraceLinkData, TriggerReason};
use tracelink_core::sink::BatchSink;
use tracing::{error, info};

use crate::buffer::BatchSnapshot;
use crate::context::span_context_from_descriptor;

/// Turns a completed batch into one aggregated span plus a durable record.
///
/// Failures stop here: by the time the release runs, the buffer has already
/// been reset, so a failed write ends the batch like a successful one.
pub struct ReleaseHandler {
    sink: Arc<dyn BatchSink>,
}

impl ReleaseHandler {
    pub fn new(sink: Arc<dyn BatchSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn release(&self, reason: TriggerReason, snapshot: BatchSnapshot) {
        // Links must be attached before the span starts.
        let links: Vec<Link> = snapshot
            .descriptors
            .iter()
            .map(|d| Link::with_context(span_context_from_descriptor(d)))
            .collect();

        let tracer = global::tracer("tracelink");
        let mut span = tracer
            .span_builder("aggregated-action")
            .with_kind(SpanKind::Internal)
            .with_links(links)
            .start(&tracer);

        let released_ts = Utc::now();
        span.set_attribute(KeyValue::new("trigger.reason", reason.as_str()));
        span.set_attribute(KeyValue::new(
            "trigger.count",
            snapshot.descriptors.len() as i64,
        ));
        span.set_attribute(KeyValue::new("trigger.timestamp", released_ts.to_rfc3339()));
        span.set_attribute(KeyValue::new(
            "first.request.timestamp",
            snapshot.first_event_ts.to_rfc3339(),
        ));
        span.set_attribute(KeyValue::new(
            "request.id.count",
            snapshot.correlation_ids.len() as i64,
        ));
        for (i, id) in snapshot.correlation_ids.iter().enumerate() {
            span.set_attribute(KeyValue::new(format!("request.id.{}", i + 1), id.clone()));
        }
        span.set_attribute(KeyValue::new(
            "request.id.all",
            snapshot.correlation_ids.join(","),
        ));

        // The aggregated span starts a fresh trace; that trace id is what
        // downstream consumers pick up from the persisted record.
        let master_trace_id = span.span_context().trace_id().to_string();

        let record = BatchRecord {
            trigger_reason: reason,
            master_trace_id: master_trace_id.clone(),
            correlation_ids: snapshot.correlation_ids,
            links: snapshot.descriptors.iter().map(TraceLinkData::from).collect(),
            first_event_ts: snapshot.first_event_ts,
            released_ts,
        };

        info!(
            master_trace_id = %master_trace_id,
            reason = %reason,
            linked = record.links.len(),
            correlation_ids = %record.correlation_ids.join(","),
            "batch released"
        );

        match self.sink.persist(&record) {
            Ok(id) => {
                span.set_attribute(KeyValue::new("store.write.success", true));
                info!(batch_id = id, master_trace_id = %master_trace_id, "persisted batch record");
            }
            Err(e) => {
                span.set_attribute(KeyValue::new("store.write.success", false));
                span.set_attribute(KeyValue::new("store.write.error", e.to_string()));
                error!(
                    error = %e,
                    reason = %reason,
                    linked = record.links.len(),
                    master_trace_id = %master_trace_id,
                    "failed to persist batch record"
                );
            }
        }

        // Explicit end; dropping the span would close it on any other path.
        span.end();
    }
}
