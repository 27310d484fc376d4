use std::io::IsTerminal;
use std::sync::{Mutex, OnceLock};

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace as sdktrace;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init_cli_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();
}

pub fn init_run_tracing() {
    let env_filter = EnvFilter::from_default_env();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let otel_layer = build_otel_layer();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init();
}

pub fn shutdown_tracing() {
    if let Some(provider) = provider_slot()
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
    {
        let _ = provider.shutdown();
    }
}

/// Installs the tracer provider for the whole process. Without an OTLP
/// endpoint the spans stay unexported, but they still carry real contexts,
/// which the release path needs for master trace ids.
fn build_otel_layer<S>() -> OpenTelemetryLayer<S, sdktrace::Tracer>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let exporter = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        opentelemetry_otlp::SpanExporter::builder().with_tonic().build().ok()
    } else {
        None
    };

    let provider = match exporter {
        Some(exporter) => sdktrace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .build(),
        None => sdktrace::SdkTracerProvider::builder().build(),
    };

    let tracer = provider.tracer("tracelink");
    global::set_tracer_provider(provider.clone());

    if let Ok(mut slot) = provider_slot().lock() {
        *slot = Some(provider);
    }

    tracing_opentelemetry::layer().with_tracer(tracer)
}

fn provider_slot() -> &'static Mutex<Option<sdktrace::SdkTracerProvider>> {
    static SLOT: OnceLock<Mutex<Option<sdktrace::SdkTracerProvider>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}
