//! Conversion between tracelink descriptors and OpenTelemetry span contexts.

use std::str::FromStr;

use opentelemetry::trace::{
    SpanContext, SpanId as OtelSpanId, TraceFlags, TraceId as OtelTraceId, TraceState,
};
use tracelink_core::ids::{SpanId, TraceId};
use tracelink_core::model::TraceLinkDescriptor;

/// Captures the trace identity of a span context, or `None` when the
/// context is invalid (e.g. produced by a no-op tracer).
pub fn descriptor_from_span_context(ctx: &SpanContext) -> Option<TraceLinkDescriptor> {
    if !ctx.is_valid() {
        return None;
    }
    let trace_id = TraceId::parse(&ctx.trace_id().to_string()).ok()?;
    let span_id = SpanId::parse(&ctx.span_id().to_string()).ok()?;
    let state = ctx.trace_state().header();
    Some(TraceLinkDescriptor {
        trace_id,
        span_id,
        trace_flags: ctx.trace_flags().to_u8(),
        trace_state: (!state.is_empty()).then_some(state),
    })
}

/// Rebuilds a remote span context for link emission. Descriptor ids are
/// validated hex, so the fallbacks are unreachable in practice.
pub fn span_context_from_descriptor(d: &TraceLinkDescriptor) -> SpanContext {
    let trace_id = OtelTraceId::from_hex(d.trace_id.as_str()).unwrap_or(OtelTraceId::INVALID);
    let span_id = OtelSpanId::from_hex(d.span_id.as_str()).unwrap_or(OtelSpanId::INVALID);
    let trace_state = d
        .trace_state
        .as_deref()
        .and_then(|s| TraceState::from_str(s).ok())
        .unwrap_or_default();
    SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(d.trace_flags),
        true,
        trace_state,
    )
}

/// Parses incoming `traceparent`/`tracestate` headers into a remote parent
/// context. Returns `None` for anything malformed; the caller treats that
/// as "no parent" rather than rejecting the request.
pub fn remote_context_from_headers(
    traceparent: &str,
    tracestate: Option<&str>,
) -> Option<SpanContext> {
    let mut parts = traceparent.trim().split('-');
    let version = parts.next()?;
    if version.len() != 2 || version == "ff" || !version.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let trace_id = TraceId::parse(parts.next()?).ok()?;
    let span_id = SpanId::parse(parts.next()?).ok()?;
    let flags = u8::from_str_radix(parts.next()?, 16).ok()?;

    let trace_state = tracestate
        .and_then(|s| TraceState::from_str(s).ok())
        .unwrap_or_default();

    Some(SpanContext::new(
        OtelTraceId::from_hex(trace_id.as_str()).ok()?,
        OtelSpanId::from_hex(span_id.as_str()).ok()?,
        TraceFlags::new(flags),
        true,
        trace_state,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testkit::sample_descriptor;

    #[test]
    fn descriptor_round_trips_through_span_context() {
        let descriptor = sample_descriptor(7);
        let ctx = span_context_from_descriptor(&descriptor);
        assert!(ctx.is_valid());
        assert!(ctx.is_remote());
        assert_eq!(ctx.trace_id().to_string(), descriptor.trace_id.as_str());
        assert_eq!(ctx.span_id().to_string(), descriptor.span_id.as_str());

        let back = descriptor_from_span_context(&ctx).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn invalid_context_yields_no_descriptor() {
        assert!(descriptor_from_span_context(&SpanContext::empty_context()).is_none());
    }

    #[test]
    fn parses_traceparent_header() {
        let ctx = remote_context_from_headers(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            Some("vendor=abc"),
        )
        .unwrap();
        assert_eq!(
            ctx.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(ctx.span_id().to_string(), "00f067aa0ba902b7");
        assert!(ctx.trace_flags().is_sampled());
        assert_eq!(ctx.trace_state().header(), "vendor=abc");
    }

    #[test]
    fn rejects_malformed_traceparent() {
        assert!(remote_context_from_headers("not-a-header", None).is_none());
        assert!(
            remote_context_from_headers("ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", None)
                .is_none()
        );
        assert!(
            remote_context_from_headers("00-00000000000000000000000000000000-00f067aa0ba902b7-01", None)
                .is_none()
        );
    }
}
